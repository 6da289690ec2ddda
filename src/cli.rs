// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// herald: a chat command framework, driven from the terminal.
///
/// Every line read from stdin is treated as a chat message sent by `--user`. Messages
/// addressed with a configured prefix (e.g. `!help`) run through the command pipeline and
/// the resulting actions are printed as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the settings file. Defaults to `<config dir>/herald/settings.toml`, which is
    /// created with default values if missing.
    #[arg(long, short)]
    pub settings: Option<String>,

    /// Directory of command manifests. Overrides `commands_dir` from the settings.
    #[arg(long, short)]
    pub commands: Option<String>,

    /// The user id messages are sent as.
    #[arg(long, short, default_value = "console")]
    pub user: String,

    /// Role ids of the user.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub roles: Vec<String>,

    /// Send messages in this guild instead of a direct-message channel.
    #[arg(long, short)]
    pub guild: Option<String>,

    /// Mark the guild channel as NSFW. Ignored without `--guild`.
    #[arg(long)]
    pub nsfw: bool,

    /// Permissions the user holds in the channel.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub permissions: Vec<String>,

    /// Permissions the bot holds in the channel.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub bot_permissions: Vec<String>,
}

impl Cli {
    /// The settings path to use, expanded.
    pub fn settings_path(&self) -> Result<PathBuf, crate::settings::SettingsError> {
        match &self.settings {
            Some(raw) => crate::settings::Settings::expand_path(raw),
            None => crate::settings::Settings::default_path(),
        }
    }
}
