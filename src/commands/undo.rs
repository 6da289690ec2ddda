// src/commands/undo.rs

use async_trait::async_trait;

use crate::{
    core::{
        arguments::ResolvedArguments,
        command::{Command, CommandHandler, ConfigurationError},
        context::Context,
        undo::undo_last,
    },
    models::{Action, Outcome},
};

pub fn command() -> Result<Command, ConfigurationError> {
    Command::builder("undo")
        .description("Reverts your last undoable command.")
        .category("core")
        .internal(true)
        .build(Undo)
}

struct Undo;

#[async_trait]
impl CommandHandler for Undo {
    async fn run(&self, ctx: &Context, _args: &ResolvedArguments) -> anyhow::Result<Outcome> {
        let Some(memory) = ctx.undo_memory() else {
            return Ok(Action::reply(t!("undo.nothing")).into());
        };
        let Some((name, outcome)) = undo_last(&memory, ctx).await? else {
            return Ok(Action::reply(t!("undo.nothing")).into());
        };

        let mut actions = outcome.into_actions();
        actions.push(Action::reply(format!(t!("undo.done"), command = name)));
        Ok(actions.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::TextMessage;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_without_engine_there_is_nothing_to_undo() {
        let ctx = Context::for_message(Arc::new(TextMessage::private("1", "!undo")));
        let outcome = Undo.run(&ctx, &ResolvedArguments::new()).await.unwrap();
        assert_eq!(outcome, Outcome::Action(Action::reply(t!("undo.nothing"))));
    }
}
