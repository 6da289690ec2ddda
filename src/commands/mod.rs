// src/commands/mod.rs

// Built-in commands. Each module exposes a `command()` factory that the module loader
// maps to a `builtin/<name>` origin.

pub mod help;
pub mod ping;
pub mod reload;
pub mod undo;

use crate::core::loader::CommandFactory;

/// A compiled-in command and the factory that builds it.
struct BuiltinDefinition {
    name: &'static str,
    factory: CommandFactory,
}

/// The single source of truth for all built-in commands.
static BUILTINS: &[BuiltinDefinition] = &[
    BuiltinDefinition {
        name: "help",
        factory: help::command,
    },
    BuiltinDefinition {
        name: "ping",
        factory: ping::command,
    },
    BuiltinDefinition {
        name: "reload",
        factory: reload::command,
    },
    BuiltinDefinition {
        name: "undo",
        factory: undo::command,
    },
];

/// `(name, factory)` for every built-in command.
pub fn builtins() -> impl Iterator<Item = (&'static str, CommandFactory)> {
    BUILTINS.iter().map(|def| (def.name, def.factory))
}
