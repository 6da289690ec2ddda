//! # Console Front-end
//!
//! Glue for driving the engine from a terminal: building the registry from built-ins and
//! manifests, turning stdin lines into messages, and printing actions.

use async_trait::async_trait;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{
    cli::Cli,
    core::{
        context::Context,
        loader::{CommandLoader, ModuleLoader},
        registry::Registry,
    },
    models::{Action, PermissionSet},
    platform::{ActionInterpreter, TextMessage},
};

/// Prints every action as one line of JSON on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleInterpreter;

#[async_trait]
impl ActionInterpreter for ConsoleInterpreter {
    async fn interpret(&self, action: Action, ctx: &Context) -> anyhow::Result<()> {
        let json = serde_json::to_string(&action)?;
        let line = match &action {
            Action::Reply { .. } | Action::Send { .. } => json.green(),
            Action::React { .. } => json.cyan(),
            Action::DeleteMessage { .. } | Action::RemoveRole { .. } => json.yellow(),
            Action::AddRole { .. } | Action::Custom { .. } => json.blue(),
        };
        println!("{} {}", format!("[{}]", ctx.invoked_name).dimmed(), line);
        Ok(())
    }
}

/// Builds a registry holding every built-in command plus the manifests under
/// `commands_dir`.
///
/// A manifest that fails to load or register is logged and skipped; the console keeps
/// running with the rest.
pub fn bootstrap(commands_dir: Option<&Path>) -> anyhow::Result<Arc<Registry>> {
    let loader = Arc::new(ModuleLoader::with_builtins());
    let mut origins: Vec<PathBuf> = loader.builtin_origins();
    if let Some(dir) = commands_dir {
        origins.extend(ModuleLoader::discover(dir)?);
    }

    let registry = Arc::new(Registry::new(loader.clone()));
    for origin in origins {
        let loaded = loader.load(&origin).map_err(anyhow::Error::from).and_then(|command| {
            registry
                .register(command, origin.clone())
                .map_err(anyhow::Error::from)
        });
        if let Err(e) = loaded {
            log::warn!(
                "{}",
                format!(t!("console.load_failed"), path = origin.display(), error = e)
            );
        }
    }
    Ok(registry)
}

/// Wraps one stdin line into a message from the identity given on the command line.
pub fn message_from_line(cli: &Cli, line: &str) -> TextMessage {
    let message = match &cli.guild {
        Some(guild) => {
            let message = TextMessage::guild(cli.user.as_str(), guild.as_str(), line);
            if cli.nsfw { message.nsfw() } else { message }
        }
        None => TextMessage::private(cli.user.as_str(), line),
    };
    message
        .with_roles(cli.roles.iter().cloned())
        .with_issuer_permissions(cli.permissions.iter().cloned().collect::<PermissionSet>())
        .with_self_permissions(cli.bot_permissions.iter().cloned().collect::<PermissionSet>())
}
