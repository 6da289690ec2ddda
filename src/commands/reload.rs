// src/commands/reload.rs

use async_trait::async_trait;

use crate::{
    core::{
        arguments::ResolvedArguments,
        command::{Command, CommandHandler, ConfigurationError},
        context::Context,
    },
    models::{Action, ArgumentSpec, Outcome, SpecificEntry},
};

/// Reloads one command, or every live command, from its origin. Restricted to the
/// `owners` group.
pub fn command() -> Result<Command, ConfigurationError> {
    Command::builder("reload")
        .description("Reloads a command (or all of them) from disk.")
        .category("core")
        .arg(ArgumentSpec::optional("command", "string"))
        .specific(SpecificEntry::Group("owners".to_string()))
        .internal(true)
        .build(Reload)
}

struct Reload;

#[async_trait]
impl CommandHandler for Reload {
    async fn run(&self, ctx: &Context, args: &ResolvedArguments) -> anyhow::Result<Outcome> {
        let reply = match args.text("command") {
            Some(name) if ctx.registry.reload(&name) => {
                format!(t!("reload.single"), name = ctx.registry.canonical_name(&name))
            }
            Some(name) => format!(t!("reload.failed"), name = name),
            None => format!(t!("reload.done"), count = ctx.registry.reload_all()),
        };
        Ok(Action::reply(reply).into())
    }
}
