// src/commands/help.rs

use async_trait::async_trait;

use crate::{
    core::{
        arguments::ResolvedArguments,
        command::{Command, CommandHandler, ConfigurationError},
        context::Context,
    },
    models::{Action, ArgumentSpec, Outcome},
};

pub fn command() -> Result<Command, ConfigurationError> {
    Command::builder("help")
        .description("Lists commands, or describes one.")
        .category("core")
        .alias("commands")
        .arg(ArgumentSpec::optional("command", "string"))
        .internal(true)
        .build(Help)
}

struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn run(&self, ctx: &Context, args: &ResolvedArguments) -> anyhow::Result<Outcome> {
        let reply = match args.text("command") {
            Some(name) => describe(ctx, &name),
            None => list(ctx),
        };
        Ok(Action::reply(reply).into())
    }
}

fn list(ctx: &Context) -> String {
    let mut lines = vec![t!("help.header").to_string()];
    for command in ctx.registry.commands() {
        lines.push(format!(
            "`{}{}` {}",
            ctx.prefix,
            command.usage(),
            command.meta().description
        ));
    }
    lines.join("\n")
}

fn describe(ctx: &Context, name: &str) -> String {
    // Looking a command up for help must not load it back.
    let Some(command) = ctx.registry.get_live(name) else {
        if ctx.registry.is_released(name) {
            let canonical = ctx.registry.canonical_name(name);
            return format!(t!("help.released"), name = canonical);
        }
        return format!(t!("help.unknown"), name = name);
    };

    let aliases = ctx.registry.aliases_of(command.name());
    let aliases = if aliases.is_empty() {
        "-".to_string()
    } else {
        aliases.join(", ")
    };
    format!(
        t!("help.detail"),
        usage = format!("{}{}", ctx.prefix, command.usage()),
        description = command.meta().description,
        aliases = aliases,
        cooldown = command.constraints().cooldown
    )
}
