//! # Execution Engine
//!
//! Drives one inbound message through the pipeline:
//!
//! `Parsed -> Located -> ConstraintsChecked -> ArgumentsResolved -> GuardsPassed -> Run -> PostProcessed`
//!
//! Every message ends in exactly one [`Dispatch`]. Nothing raised by a command body, a
//! panic included, escapes [`Engine::handle`].

use anyhow::anyhow;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::{
    core::{
        arguments::{self, ResolvedArguments},
        command::Command,
        constraints::{self, Rejection},
        context::Context,
        events::{EngineEvent, EventBus},
        registry::Registry,
        resolvers::ResolverTable,
        tokenizer,
        undo::{self, UndoEntry, UndoMemory},
    },
    models::{Action, Outcome},
    platform::{ActionInterpreter, Message},
    settings::{CooldownPolicy, Settings},
};

/// The terminal state of one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Not addressed to the bot, or no such command.
    Ignored,
    Executed { command: String },
    /// `rejection` is `None` when a guard stopped the invocation.
    Rejected {
        command: String,
        rejection: Option<Rejection>,
    },
    Errored { command: String, error: String },
}

pub struct Engine {
    registry: Arc<Registry>,
    resolvers: Arc<ResolverTable>,
    interpreter: Arc<dyn ActionInterpreter>,
    settings: Arc<Settings>,
    undo: Arc<UndoMemory>,
    events: EventBus,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        registry: Arc<Registry>,
        interpreter: Arc<dyn ActionInterpreter>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            resolvers: Arc::new(ResolverTable::with_builtins()),
            interpreter,
            settings,
            undo: Arc::new(UndoMemory::new()),
            events: EventBus::default(),
        }
    }

    pub fn with_resolvers(mut self, resolvers: ResolverTable) -> Self {
        self.resolvers = Arc::new(resolvers);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn undo_memory(&self) -> &Arc<UndoMemory> {
        &self.undo
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// A context for `message` bound to this engine, without invocation details.
    pub fn context_for(&self, message: Arc<dyn Message>) -> Context {
        Context::new(
            message,
            Arc::clone(&self.registry),
            Arc::clone(&self.settings),
            &self.undo,
        )
    }

    /// Splits `content` into `(prefix, command name, rest)`. The longest matching prefix wins.
    fn parse<'a>(&self, content: &'a str) -> Option<(&'a str, String, &'a str)> {
        let mut prefixes: Vec<&String> = self.settings.prefixes.iter().filter(|p| !p.is_empty()).collect();
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));

        let prefix = prefixes.into_iter().find(|p| content.starts_with(p.as_str()))?;
        let (used, body) = content.split_at(prefix.len());
        let body = body.trim_start();
        let (name, rest) = match body.find(char::is_whitespace) {
            Some(split) => body.split_at(split),
            None => (body, ""),
        };
        if name.is_empty() {
            return None;
        }
        Some((used, name.to_lowercase(), rest.trim_start()))
    }

    /// Runs the full pipeline for one message.
    pub async fn handle(&self, message: Arc<dyn Message>) -> Dispatch {
        let started = Instant::now();

        // --- Parsed ---
        let Some((prefix, name, rest)) = self.parse(message.content()) else {
            return Dispatch::Ignored;
        };

        // --- Located ---
        let Some(command) = self.registry.get(&name) else {
            log::debug!("No command named '{}'", name);
            return Dispatch::Ignored;
        };
        self.registry.touch(command.name());

        let mut invocation = tokenizer::tokenize(rest);
        if command.descriptor().single_arg {
            invocation = invocation.collapse();
        }
        let ctx = self
            .context_for(Arc::clone(&message))
            .with_invocation(prefix, &name, invocation.flags.clone());
        log::debug!(
            "[{}] '{}' invoked by '{}' as '{}'",
            ctx.invocation_id,
            command.name(),
            ctx.author_id(),
            name
        );

        // --- ConstraintsChecked ---
        let slots = invocation.slots(command.args());
        let clearance = match constraints::evaluate(&command, &slots, &ctx, &self.resolvers) {
            Ok(clearance) => clearance,
            Err(rejection) => return self.reject(&ctx, &command, rejection).await,
        };

        // Privileged callers are exempt from cooldowns, so nothing is reserved or recorded.
        let cooldown_ms = if clearance.is_privileged() {
            0
        } else {
            command.constraints().cooldown.saturating_mul(1000)
        };
        let reserved = cooldown_ms > 0 && self.settings.cooldown_policy == CooldownPolicy::Reserve;
        if reserved {
            let ledger = self.registry.cooldowns();
            let expiry = ledger.now_ms() + cooldown_ms;
            if !ledger.try_reserve(ctx.author_id(), command.name(), expiry) {
                let remaining_ms = ledger
                    .remaining(ctx.author_id(), command.name())
                    .map_or(0, |d| d.as_millis() as u64);
                return self
                    .reject(&ctx, &command, Rejection::Cooldown { remaining_ms })
                    .await;
            }
        }

        // --- ArgumentsResolved ---
        let raw = match arguments::apply_defaults(&slots, command.args(), &ctx) {
            Ok(raw) => raw,
            Err(e) => {
                self.unreserve(&ctx, &command, reserved);
                log::error!("[{}] Misconfigured command '{}': {}", ctx.invocation_id, command.name(), e);
                self.emit_error(&ctx, &command, e.to_string());
                self.reply(&ctx, t!("engine.failure.configuration")).await;
                return Dispatch::Errored {
                    command: command.name().to_string(),
                    error: e.to_string(),
                };
            }
        };
        let args = match arguments::resolve(&raw, command.args(), &self.resolvers, &ctx).await {
            Ok(args) => args,
            Err(rejection) => {
                self.unreserve(&ctx, &command, reserved);
                return self.reject(&ctx, &command, rejection).await;
            }
        };

        // --- GuardsPassed ---
        for guard in &command.descriptor().guards {
            if !guard.check(&ctx, &args, &command).await {
                self.unreserve(&ctx, &command, reserved);
                log::debug!("[{}] A guard stopped '{}'", ctx.invocation_id, command.name());
                self.events.emit(EngineEvent::Rejected {
                    invocation_id: ctx.invocation_id,
                    command: command.name().to_string(),
                    user_id: ctx.author_id().to_string(),
                    reason: "guard".to_string(),
                });
                return Dispatch::Rejected {
                    command: command.name().to_string(),
                    rejection: None,
                };
            }
        }

        // --- Run ---
        let outcome = match self.run(&ctx, &command, &args).await {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(&ctx, &command, e, reserved).await,
        };
        if let Err(e) = self
            .interpreter
            .interpret_many(outcome.into_actions(), &ctx)
            .await
        {
            return self.fail(&ctx, &command, e, reserved).await;
        }

        // --- PostProcessed ---
        self.post_process(&ctx, &command, args, cooldown_ms, started)
            .await;
        Dispatch::Executed {
            command: command.name().to_string(),
        }
    }

    /// Runs the body on its own task so that a panic is contained like an error.
    async fn run(
        &self,
        ctx: &Context,
        command: &Arc<Command>,
        args: &ResolvedArguments,
    ) -> anyhow::Result<Outcome> {
        let handler = Arc::clone(command.handler());
        let task_ctx = ctx.clone();
        let task_args = args.clone();
        let joined = tokio::spawn(async move { handler.run(&task_ctx, &task_args).await }).await;
        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(anyhow!("Command '{}' panicked.", command.name())),
            Err(e) => Err(anyhow!("Command '{}' was cancelled: {}", command.name(), e)),
        }
    }

    async fn post_process(
        &self,
        ctx: &Context,
        command: &Arc<Command>,
        args: ResolvedArguments,
        cooldown_ms: u64,
        started: Instant,
    ) {
        // (a) cooldown
        if cooldown_ms > 0 {
            let ledger = self.registry.cooldowns();
            ledger.set(ctx.author_id(), ledger.now_ms() + cooldown_ms, command.name());
        }

        // (b) relays
        for relay in &command.descriptor().relays {
            relay.relay(ctx, &args, command).await;
        }

        // (c) event
        self.events.emit(EngineEvent::Executed {
            invocation_id: ctx.invocation_id,
            command: command.name().to_string(),
            user_id: ctx.author_id().to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        // (d) undo slot
        if command.is_undoable() {
            self.undo.store(
                ctx.author_id(),
                UndoEntry {
                    command: Arc::clone(command),
                    context: ctx.clone(),
                    args,
                },
            );
        }

        // (e) delete / react
        let mut extra = Vec::new();
        if self.settings.delete_invocation {
            extra.push(Action::DeleteMessage {
                message_id: ctx.message.id().to_string(),
            });
        }
        if self.settings.react_on_success {
            extra.push(Action::React {
                emoji: self.settings.success_reaction.clone(),
            });
        }
        if !extra.is_empty() {
            if let Err(e) = self.interpreter.interpret_many(extra, ctx).await {
                log::warn!("[{}] Post-processing actions failed: {:#}", ctx.invocation_id, e);
            }
        }

        log::debug!("[{}] '{}' executed", ctx.invocation_id, command.name());
    }

    /// Consumes the undo slot of the caller of `ctx`.
    pub async fn undo(&self, ctx: &Context) -> anyhow::Result<Option<(String, Outcome)>> {
        undo::undo_last(&self.undo, ctx).await
    }

    // --- TERMINAL STATES ---

    async fn reject(&self, ctx: &Context, command: &Command, rejection: Rejection) -> Dispatch {
        log::debug!(
            "[{}] '{}' rejected: {}",
            ctx.invocation_id,
            command.name(),
            rejection.reason()
        );
        self.events.emit(EngineEvent::Rejected {
            invocation_id: ctx.invocation_id,
            command: command.name().to_string(),
            user_id: ctx.author_id().to_string(),
            reason: rejection.reason().to_string(),
        });
        self.reply(ctx, &rejection.to_string()).await;
        Dispatch::Rejected {
            command: command.name().to_string(),
            rejection: Some(rejection),
        }
    }

    async fn fail(&self, ctx: &Context, command: &Command, error: anyhow::Error, reserved: bool) -> Dispatch {
        self.unreserve(ctx, command, reserved);
        log::error!(
            "[{}] Command '{}' failed for '{}': {:#}",
            ctx.invocation_id,
            command.name(),
            ctx.author_id(),
            error
        );
        let error = format!("{:#}", error);
        self.emit_error(ctx, command, error.clone());
        self.reply(ctx, t!("engine.failure.generic")).await;
        Dispatch::Errored {
            command: command.name().to_string(),
            error,
        }
    }

    fn emit_error(&self, ctx: &Context, command: &Command, error: String) {
        self.events.emit(EngineEvent::Errored {
            invocation_id: ctx.invocation_id,
            command: command.name().to_string(),
            user_id: ctx.author_id().to_string(),
            error,
        });
    }

    fn unreserve(&self, ctx: &Context, command: &Command, reserved: bool) {
        if reserved {
            self.registry
                .cooldowns()
                .clear(ctx.author_id(), command.name());
        }
    }

    async fn reply(&self, ctx: &Context, content: &str) {
        if let Err(e) = self.interpreter.interpret(Action::reply(content), ctx).await {
            log::warn!("[{}] Could not deliver reply: {:#}", ctx.invocation_id, e);
        }
    }
}
