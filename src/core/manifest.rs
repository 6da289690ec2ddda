//! # Command Manifests
//!
//! Declarative commands loaded from TOML files. A manifest carries everything a
//! [`CommandDescriptor`](crate::core::command::CommandDescriptor) does except code; its body
//! is a reply template whose `{argument}` placeholders are filled with the resolved values.
//!
//! ```toml
//! name = "greet"
//! description = "Says hello."
//! aliases = ["hi"]
//! reply = "Hello, {who}!"
//!
//! [[args]]
//! name = "who"
//! kind = "user"
//! default = "everyone"
//!
//! [constraints]
//! environment = "guild"
//! cooldown = 5
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{
    core::{
        arguments::ResolvedArguments,
        command::{Command, CommandHandler},
        context::Context,
        loader::LoadError,
    },
    models::{Action, ArgumentSpec, Constraints, Environment, Outcome, PermissionSet, SpecificEntry},
};

fn default_kind() -> String {
    "string".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArgumentManifest {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
    /// Short flag that may fill this argument (`-n`).
    #[serde(default)]
    pub flag: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ConstraintsManifest {
    pub environment: Environment,
    pub self_permissions: PermissionSet,
    pub issuer_permissions: PermissionSet,
    pub cooldown: u64,
    pub specific: Vec<SpecificEntry>,
    pub enabled: bool,
}

impl Default for ConstraintsManifest {
    fn default() -> Self {
        Self {
            environment: Environment::Anywhere,
            self_permissions: PermissionSet::new(),
            issuer_permissions: PermissionSet::new(),
            cooldown: 0,
            specific: Vec::new(),
            enabled: true,
        }
    }
}

impl From<ConstraintsManifest> for Constraints {
    fn from(manifest: ConstraintsManifest) -> Self {
        Constraints {
            environment: manifest.environment,
            self_permissions: manifest.self_permissions,
            issuer_permissions: manifest.issuer_permissions,
            cooldown: manifest.cooldown,
            specific: manifest.specific,
            enabled: manifest.enabled,
            ..Constraints::default()
        }
    }
}

/// The on-disk form of a command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommandManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub single_arg: bool,
    #[serde(default)]
    pub args: Vec<ArgumentManifest>,
    #[serde(default)]
    pub constraints: ConstraintsManifest,
    pub reply: String,
}

impl CommandManifest {
    /// Validates the manifest and builds the command it describes.
    pub fn into_command(self) -> Result<Command, LoadError> {
        let mut builder = Command::builder(self.name)
            .description(self.description)
            .aliases(self.aliases)
            .single_arg(self.single_arg)
            .constraints(self.constraints.into());

        if let Some(category) = self.category {
            builder = builder.category(category);
        }
        if let Some(usage) = self.usage {
            builder = builder.usage(usage);
        }

        for arg in self.args {
            let mut spec = if arg.required {
                ArgumentSpec::required(arg.name, arg.kind)
            } else {
                ArgumentSpec::optional(arg.name, arg.kind)
            };
            if let Some(default) = arg.default {
                spec = spec.with_default(default);
            }
            if let Some(flag) = arg.flag {
                spec = spec.with_flag(flag);
            }
            builder = builder.arg(spec);
        }

        Ok(builder.build(TemplateReply::new(self.reply))?)
    }
}

/// Reads and parses the manifest at `path`.
pub fn read_manifest(path: &Path) -> Result<CommandManifest, LoadError> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads the manifest at `path` and builds its command.
pub fn load_manifest(path: &Path) -> Result<Command, LoadError> {
    log::debug!("Loading command manifest: {}", path.display());
    read_manifest(path)?.into_command()
}

/// Replies with a template, substituting `{name}` for every resolved argument and
/// `{author}` for a mention of the caller.
#[derive(Debug, Clone)]
pub struct TemplateReply {
    template: String,
}

impl TemplateReply {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, ctx: &Context, args: &ResolvedArguments) -> String {
        let mut rendered = self
            .template
            .replace("{author}", &format!("<@{}>", ctx.author_id()));
        for (name, value) in args.iter() {
            rendered = rendered.replace(&format!("{{{}}}", name), &value.to_string());
        }
        rendered
    }
}

#[async_trait]
impl CommandHandler for TemplateReply {
    async fn run(&self, ctx: &Context, args: &ResolvedArguments) -> anyhow::Result<Outcome> {
        Ok(Action::reply(self.render(ctx, args)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::command::ConfigurationError, models::ArgValue, platform::TextMessage};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    const GREET: &str = r#"
name = "greet"
description = "Says hello."
aliases = ["hi", "hello"]
reply = "Hello, {who}! ({author})"

[[args]]
name = "who"
kind = "user"
required = false
default = "0"
flag = "w"

[constraints]
environment = "guild"
cooldown = 5
issuer_permissions = ["send_messages"]
specific = ["group:friends"]
"#;

    #[test]
    fn test_manifest_builds_command() {
        // --- Setup ---
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(GREET.as_bytes()).unwrap();

        // --- Execute ---
        let command = load_manifest(file.path()).unwrap();

        // --- Assert ---
        assert_eq!(command.name(), "greet");
        assert_eq!(command.aliases(), ["hi", "hello"]);
        assert_eq!(command.args()[0].flag_short.as_deref(), Some("w"));
        assert_eq!(command.constraints().environment, Environment::Guild);
        assert_eq!(command.constraints().cooldown, 5);
        assert!(command.constraints().issuer_permissions.contains("send_messages"));
        assert_eq!(
            command.constraints().specific,
            vec![SpecificEntry::Group("friends".into())]
        );
        assert!(command.is_enabled());
    }

    #[test]
    fn test_invalid_manifests_are_load_errors() {
        let mut bad_toml = NamedTempFile::new().unwrap();
        bad_toml.write_all(b"name = ").unwrap();
        assert!(matches!(
            load_manifest(bad_toml.path()),
            Err(LoadError::Decode { .. })
        ));

        let mut bad_name = NamedTempFile::new().unwrap();
        bad_name
            .write_all(b"name = \"Not Valid\"\nreply = \"x\"\n")
            .unwrap();
        assert!(matches!(
            load_manifest(bad_name.path()),
            Err(LoadError::Configuration(_))
        ));

        assert!(matches!(
            load_manifest(Path::new("/definitely/not/here.toml")),
            Err(LoadError::Io(_))
        ));
    }

    #[test]
    fn test_single_arg_manifest_with_two_mandatory_args_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
name = "say"
single_arg = true
reply = "{text} {more}"

[[args]]
name = "text"

[[args]]
name = "more"
"#,
        )
        .unwrap();

        assert!(matches!(
            load_manifest(file.path()),
            Err(LoadError::Configuration(ConfigurationError::SingleArgSchema { .. }))
        ));
    }

    #[tokio::test]
    async fn test_template_reply_substitutes_arguments() {
        let ctx = Context::for_message(Arc::new(TextMessage::guild("7", "g", "!greet")));
        let mut args = ResolvedArguments::new();
        args.insert("who", ArgValue::User("42".into()));

        let outcome = TemplateReply::new("Hello, {who}! ({author}) {missing}")
            .run(&ctx, &args)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Action(Action::reply("Hello, <@42>! (<@7>) {missing}"))
        );
    }
}
