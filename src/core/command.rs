//! # Commands
//!
//! A [`Command`] pairs an immutable [`CommandDescriptor`] (name, aliases, argument schema,
//! constraints, guards, relays and flags) with the [`CommandHandler`] that runs it.
//! Descriptors are validated once, when [`CommandBuilder::build`] is called; every optional
//! field has a default by then, so nothing downstream re-checks them.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    constants::COMMAND_NAME_PATTERN,
    core::{arguments::ResolvedArguments, context::Context},
    models::{ArgumentSpec, CanExecute, Constraints, Environment, Outcome, PermissionSet, SpecificEntry},
};

lazy_static! {
    static ref COMMAND_NAME_RE: Regex = Regex::new(COMMAND_NAME_PATTERN).unwrap();
}

/// Returns `true` if `name` is a valid canonical command name.
pub fn is_valid_name(name: &str) -> bool {
    COMMAND_NAME_RE.is_match(name)
}

/// Errors in a command's declaration. These are load-time failures and never reach users.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Command name '{name}' must match {pattern}.", pattern = COMMAND_NAME_PATTERN)]
    InvalidName { name: String },
    #[error("Command '{command}' declares an invalid alias '{alias}'.")]
    InvalidAlias { command: String, alias: String },
    #[error("Command '{command}' declares alias '{alias}' more than once.")]
    DuplicateAlias { command: String, alias: String },
    #[error(
        "Command '{command}': required argument '{argument}' follows an optional one; only trailing arguments may be optional."
    )]
    RequiredAfterOptional { command: String, argument: String },
    #[error("Command '{command}' declares argument '{argument}' more than once.")]
    DuplicateArgument { command: String, argument: String },
    #[error("Command '{command}' has no value for required argument '{argument}'.")]
    MissingRequiredValue { command: String, argument: String },
    #[error(
        "Command '{command}' is single-argument but declares {mandatory} mandatory arguments; at most one is allowed."
    )]
    SingleArgSchema { command: String, mandatory: usize },
}

/// The body of a command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, ctx: &Context, args: &ResolvedArguments) -> anyhow::Result<Outcome>;

    /// Reverts a previous run. Only called for commands declared `undoable`.
    async fn undo(&self, _ctx: &Context, _args: &ResolvedArguments) -> anyhow::Result<Outcome> {
        Err(anyhow::anyhow!("This command cannot be undone."))
    }

    /// Called when the command instance is unloaded (released, reloaded or removed).
    fn dispose(&self) {}
}

/// Middleware predicate run right before a command executes.
///
/// A guard that returns `false` aborts the invocation silently; any user-facing message is
/// the guard's own responsibility.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn check(&self, ctx: &Context, args: &ResolvedArguments, command: &Command) -> bool;
}

/// Hook invoked after a command executed successfully.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn relay(&self, ctx: &Context, args: &ResolvedArguments, command: &Command);
}

#[derive(Debug, Clone, Default)]
pub struct CommandMeta {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub usage: Option<String>,
}

/// The immutable definition of a command.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub meta: CommandMeta,
    pub aliases: Vec<String>,
    pub args: Vec<ArgumentSpec>,
    pub constraints: Constraints,
    pub guards: Vec<Arc<dyn Guard>>,
    pub relays: Vec<Arc<dyn Relay>>,
    pub undoable: bool,
    pub single_arg: bool,
    /// Always-on commands cannot be released by the optimizer.
    pub internal: bool,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("meta", &self.meta)
            .field("aliases", &self.aliases)
            .field("args", &self.args)
            .field("constraints", &self.constraints)
            .field("guards", &self.guards.len())
            .field("relays", &self.relays.len())
            .field("undoable", &self.undoable)
            .field("single_arg", &self.single_arg)
            .field("internal", &self.internal)
            .finish()
    }
}

/// A loaded command: descriptor plus handler.
#[derive(Clone)]
pub struct Command {
    descriptor: CommandDescriptor,
    handler: Arc<dyn CommandHandler>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Command {
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.descriptor.meta.name
    }

    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    pub fn meta(&self) -> &CommandMeta {
        &self.descriptor.meta
    }

    pub fn aliases(&self) -> &[String] {
        &self.descriptor.aliases
    }

    pub fn args(&self) -> &[ArgumentSpec] {
        &self.descriptor.args
    }

    pub fn constraints(&self) -> &Constraints {
        &self.descriptor.constraints
    }

    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }

    pub fn is_enabled(&self) -> bool {
        self.descriptor.constraints.enabled
    }

    pub fn is_internal(&self) -> bool {
        self.descriptor.internal
    }

    pub fn is_undoable(&self) -> bool {
        self.descriptor.undoable
    }

    /// Number of leading arguments the caller must supply.
    pub fn min_arguments(&self) -> usize {
        self.descriptor.args.iter().filter(|a| a.is_mandatory()).count()
    }

    pub fn max_arguments(&self) -> usize {
        self.descriptor.args.len()
    }

    /// A one-line usage string, e.g. `ban <user> [days]`.
    pub fn usage(&self) -> String {
        if let Some(usage) = &self.descriptor.meta.usage {
            return usage.clone();
        }
        let mut parts = vec![self.name().to_string()];
        for spec in &self.descriptor.args {
            if spec.is_mandatory() {
                parts.push(format!("<{}>", spec.name));
            } else {
                parts.push(format!("[{}]", spec.name));
            }
        }
        parts.join(" ")
    }
}

/// Builds and validates a [`Command`].
#[derive(Debug)]
pub struct CommandBuilder {
    descriptor: CommandDescriptor,
}

impl CommandBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: CommandDescriptor {
                meta: CommandMeta {
                    name: name.into(),
                    ..Default::default()
                },
                aliases: Vec::new(),
                args: Vec::new(),
                constraints: Constraints::default(),
                guards: Vec::new(),
                relays: Vec::new(),
                undoable: false,
                single_arg: false,
                internal: false,
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.meta.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.descriptor.meta.category = Some(category.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.descriptor.meta.usage = Some(usage.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.descriptor.aliases.push(alias.into());
        self
    }

    pub fn aliases<S: Into<String>>(mut self, aliases: impl IntoIterator<Item = S>) -> Self {
        self.descriptor
            .aliases
            .extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn arg(mut self, spec: ArgumentSpec) -> Self {
        self.descriptor.args.push(spec);
        self
    }

    pub fn constraints(mut self, constraints: Constraints) -> Self {
        self.descriptor.constraints = constraints;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.descriptor.constraints.environment = environment;
        self
    }

    pub fn cooldown(mut self, seconds: u64) -> Self {
        self.descriptor.constraints.cooldown = seconds;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.descriptor.constraints.enabled = enabled;
        self
    }

    pub fn self_permissions(mut self, permissions: PermissionSet) -> Self {
        self.descriptor.constraints.self_permissions = permissions;
        self
    }

    pub fn issuer_permissions(mut self, permissions: PermissionSet) -> Self {
        self.descriptor.constraints.issuer_permissions = permissions;
        self
    }

    pub fn specific(mut self, entry: SpecificEntry) -> Self {
        self.descriptor.constraints.specific.push(entry);
        self
    }

    pub fn can_execute(mut self, predicate: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        self.descriptor.constraints.can_execute = CanExecute::Dynamic(Arc::new(predicate));
        self
    }

    pub fn guard(mut self, guard: impl Guard + 'static) -> Self {
        self.descriptor.guards.push(Arc::new(guard));
        self
    }

    pub fn relay(mut self, relay: impl Relay + 'static) -> Self {
        self.descriptor.relays.push(Arc::new(relay));
        self
    }

    pub fn undoable(mut self, undoable: bool) -> Self {
        self.descriptor.undoable = undoable;
        self
    }

    pub fn single_arg(mut self, single_arg: bool) -> Self {
        self.descriptor.single_arg = single_arg;
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.descriptor.internal = internal;
        self
    }

    /// Validates the declaration and attaches the handler.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` if the name does not match the name pattern, an alias
    /// is empty, repeated or equal to the name, an argument name is repeated, a mandatory
    /// argument follows an optional one, or a single-argument command has more than one
    /// mandatory argument.
    pub fn build(self, handler: impl CommandHandler + 'static) -> Result<Command, ConfigurationError> {
        self.build_shared(Arc::new(handler))
    }

    pub fn build_shared(
        self,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Command, ConfigurationError> {
        let descriptor = self.descriptor;
        let name = descriptor.meta.name.clone();

        if !is_valid_name(&name) {
            return Err(ConfigurationError::InvalidName { name });
        }

        let mut seen_aliases = HashSet::new();
        for alias in &descriptor.aliases {
            if alias.is_empty() || alias.contains(char::is_whitespace) || *alias == name {
                return Err(ConfigurationError::InvalidAlias {
                    command: name,
                    alias: alias.clone(),
                });
            }
            if !seen_aliases.insert(alias.as_str()) {
                return Err(ConfigurationError::DuplicateAlias {
                    command: name,
                    alias: alias.clone(),
                });
            }
        }

        let mut seen_args = HashSet::new();
        let mut optional_seen = false;
        for spec in &descriptor.args {
            if !seen_args.insert(spec.name.as_str()) {
                return Err(ConfigurationError::DuplicateArgument {
                    command: name,
                    argument: spec.name.clone(),
                });
            }
            if spec.is_mandatory() && optional_seen {
                return Err(ConfigurationError::RequiredAfterOptional {
                    command: name,
                    argument: spec.name.clone(),
                });
            }
            if !spec.is_mandatory() {
                optional_seen = true;
            }
        }

        // Collapsed input fills slot 0 only.
        let mandatory = descriptor.args.iter().filter(|spec| spec.is_mandatory()).count();
        if descriptor.single_arg && mandatory > 1 {
            return Err(ConfigurationError::SingleArgSchema {
                command: name,
                mandatory,
            });
        }

        log::trace!("Built command descriptor: {:?}", descriptor);
        Ok(Command {
            descriptor,
            handler,
        })
    }
}
