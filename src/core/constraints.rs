//! # Constraint Evaluation
//!
//! Decides whether a located command may run for a given invocation. The checks run in a
//! fixed order and the first failure wins:
//!
//! 1. environment
//! 2. enabled flag
//! 3. `specific` allow-list
//! 4. arity
//! 5. per-slot type predicate
//! 6. `can_execute`
//! 7. bot (self) permissions
//! 8. issuer permissions
//! 9. cooldown
//!
//! A match in a non-empty `specific` list skips checks 6 to 9; arity and types still apply.
//! Such an invocation passes with [`Clearance::Privileged`], which also exempts it from
//! cooldown bookkeeping in the engine. No check mutates state.

use std::fmt;

use crate::{
    core::{command::Command, context::Context, resolvers::ResolverTable},
    models::{Environment, SpecificEntry},
};

/// How an invocation passed the checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clearance {
    /// Every check ran.
    Standard,
    /// The author matched the `specific` list; checks 6 to 9 were skipped.
    Privileged,
}

impl Clearance {
    pub fn is_privileged(self) -> bool {
        self == Clearance::Privileged
    }
}

/// Why an invocation was refused. Rendered to the user through [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    WrongEnvironment(Environment),
    Disabled,
    NotAllowed,
    Arity {
        min: usize,
        max: Option<usize>,
        given: usize,
    },
    InvalidArgument {
        name: String,
        kind: String,
        value: String,
    },
    /// A type resolver returned no value.
    Unresolved { name: String, value: String },
    CannotExecute,
    MissingSelfPermissions(Vec<String>),
    MissingIssuerPermissions(Vec<String>),
    Cooldown { remaining_ms: u64 },
}

impl Rejection {
    /// A stable, machine-readable code for logs and events.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::WrongEnvironment(_) => "environment",
            Rejection::Disabled => "disabled",
            Rejection::NotAllowed => "not_allowed",
            Rejection::Arity { .. } => "arity",
            Rejection::InvalidArgument { .. } => "invalid_argument",
            Rejection::Unresolved { .. } => "unresolved_argument",
            Rejection::CannotExecute => "cannot_execute",
            Rejection::MissingSelfPermissions(_) => "self_permissions",
            Rejection::MissingIssuerPermissions(_) => "issuer_permissions",
            Rejection::Cooldown { .. } => "cooldown",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::WrongEnvironment(Environment::Private) => {
                f.write_str(t!("rejection.environment.private"))
            }
            Rejection::WrongEnvironment(Environment::NsfwGuild) => {
                f.write_str(t!("rejection.environment.nsfw"))
            }
            Rejection::WrongEnvironment(_) => f.write_str(t!("rejection.environment.guild")),
            Rejection::Disabled => f.write_str(t!("rejection.disabled")),
            Rejection::NotAllowed => f.write_str(t!("rejection.not_allowed")),
            Rejection::Arity {
                min,
                max: Some(max),
                given,
            } => write!(f, t!("rejection.arity"), min = min, max = max, given = given),
            Rejection::Arity {
                min,
                max: None,
                given,
            } => write!(f, t!("rejection.arity_min"), min = min, given = given),
            Rejection::InvalidArgument { name, kind, value } => write!(
                f,
                t!("rejection.invalid_argument"),
                name = name,
                kind = kind,
                value = value
            ),
            Rejection::Unresolved { name, value } => write!(
                f,
                t!("rejection.unresolved_argument"),
                name = name,
                value = value
            ),
            Rejection::CannotExecute => f.write_str(t!("rejection.cannot_execute")),
            Rejection::MissingSelfPermissions(missing) => write!(
                f,
                t!("rejection.self_permissions"),
                missing = missing.join(", ")
            ),
            Rejection::MissingIssuerPermissions(missing) => write!(
                f,
                t!("rejection.issuer_permissions"),
                missing = missing.join(", ")
            ),
            Rejection::Cooldown { remaining_ms } => write!(
                f,
                t!("rejection.cooldown"),
                seconds = remaining_ms.div_ceil(1000)
            ),
        }
    }
}

/// The accepted argument count for `command`, as `(min, max)`.
///
/// Single-argument commands collapse their input into one slot, so they accept anything
/// from `min(min, 1)` upward.
pub fn arity_bounds(command: &Command) -> (usize, Option<usize>) {
    let min = command.min_arguments();
    if command.descriptor().single_arg {
        (min.min(1), None)
    } else {
        (min, Some(command.max_arguments()))
    }
}

/// Returns `true` if the author of `ctx` is named by `entry`.
fn matches_specific(entry: &SpecificEntry, ctx: &Context) -> bool {
    let author = ctx.author_id();
    match entry {
        SpecificEntry::User(id) => id == author,
        SpecificEntry::Role(id) => ctx.message.author_roles().iter().any(|role| role == id),
        SpecificEntry::Group(name) => ctx
            .settings
            .group_members(name)
            .iter()
            .any(|member| member == author),
    }
}

/// Runs every check against `slots` (the positional values after flag overlay).
///
/// # Errors
/// Returns the [`Rejection`] of the first failing check.
pub fn evaluate(
    command: &Command,
    slots: &[Option<String>],
    ctx: &Context,
    table: &ResolverTable,
) -> Result<Clearance, Rejection> {
    let constraints = command.constraints();

    // 1. Environment
    if !constraints.environment.admits(ctx.message.channel()) {
        return Err(Rejection::WrongEnvironment(constraints.environment));
    }

    // 2. Enabled
    if !constraints.enabled {
        return Err(Rejection::Disabled);
    }

    // 3. Specific
    let privileged = if constraints.specific.is_empty() {
        false
    } else if constraints.specific.iter().any(|e| matches_specific(e, ctx)) {
        true
    } else {
        return Err(Rejection::NotAllowed);
    };

    // 4. Arity
    let (min, max) = arity_bounds(command);
    let given = slots.len();
    let too_many = max.is_some_and(|max| given > max);
    let missing_leading = (0..min).any(|i| slots.get(i).is_none_or(Option::is_none));
    if too_many || missing_leading {
        return Err(Rejection::Arity { min, max, given });
    }

    // 5. Types
    for (spec, slot) in command.args().iter().zip(slots) {
        let Some(value) = slot else {
            continue;
        };
        if !table.validate(&spec.kind, value) {
            return Err(Rejection::InvalidArgument {
                name: spec.name.clone(),
                kind: spec.kind.clone(),
                value: value.clone(),
            });
        }
    }

    if privileged {
        log::debug!(
            "'{}' matched the specific list of '{}'; skipping remaining checks.",
            ctx.author_id(),
            command.name()
        );
        return Ok(Clearance::Privileged);
    }

    // 6. can_execute
    if !constraints.can_execute.evaluate(ctx) {
        return Err(Rejection::CannotExecute);
    }

    // 7. Self permissions
    let missing = ctx
        .message
        .self_permissions()
        .missing(&constraints.self_permissions);
    if !missing.is_empty() {
        return Err(Rejection::MissingSelfPermissions(missing));
    }

    // 8. Issuer permissions
    let missing = ctx
        .message
        .issuer_permissions()
        .missing(&constraints.issuer_permissions);
    if !missing.is_empty() {
        return Err(Rejection::MissingIssuerPermissions(missing));
    }

    // 9. Cooldown
    if constraints.cooldown > 0 {
        if let Some(remaining) = ctx
            .registry
            .cooldowns()
            .remaining(ctx.author_id(), command.name())
        {
            return Err(Rejection::Cooldown {
                remaining_ms: remaining.as_millis() as u64,
            });
        }
    }

    Ok(Clearance::Standard)
}
