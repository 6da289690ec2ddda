// src/commands/ping.rs

use async_trait::async_trait;

use crate::{
    core::{
        arguments::ResolvedArguments,
        command::{Command, CommandHandler, ConfigurationError},
        context::Context,
    },
    models::{Action, Outcome},
};

pub fn command() -> Result<Command, ConfigurationError> {
    Command::builder("ping")
        .description("Checks that the bot is responsive.")
        .category("utility")
        .alias("latency")
        .cooldown(5)
        .build(Ping)
}

struct Ping;

#[async_trait]
impl CommandHandler for Ping {
    async fn run(&self, ctx: &Context, _args: &ResolvedArguments) -> anyhow::Result<Outcome> {
        let elapsed = ctx.registry.now_ms().saturating_sub(ctx.received_at);
        Ok(Action::reply(format!(t!("ping.reply"), ms = elapsed)).into())
    }
}
