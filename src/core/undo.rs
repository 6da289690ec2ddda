// src/core/undo.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::{
    core::{arguments::ResolvedArguments, command::Command, context::Context},
    models::Outcome,
};

/// Represents errors that prevent a stored execution from being undone.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UndoError {
    /// The command was removed, or its module no longer loads.
    #[error("Command '{command}' is no longer available, so it cannot be undone.")]
    Unavailable { command: String },
    /// The command was reloaded into a version that cannot undo.
    #[error("Command '{command}' no longer supports undo.")]
    NotUndoable { command: String },
}

/// The most recent undoable execution of one user.
#[derive(Debug, Clone)]
pub struct UndoEntry {
    pub command: Arc<Command>,
    pub context: Context,
    pub args: ResolvedArguments,
}

/// One undo slot per user. Each undoable execution overwrites the slot; an undo consumes it.
#[derive(Debug, Default)]
pub struct UndoMemory {
    slots: Mutex<HashMap<String, UndoEntry>>,
}

impl UndoMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UndoEntry>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Overwrites the slot of `user`, returning the entry it replaced.
    pub fn store(&self, user: &str, entry: UndoEntry) -> Option<UndoEntry> {
        log::debug!("Storing undo slot for '{}': {}", user, entry.command.name());
        self.lock().insert(user.to_string(), entry)
    }

    /// Removes and returns the slot of `user`.
    pub fn take(&self, user: &str) -> Option<UndoEntry> {
        self.lock().remove(user)
    }

    /// The name of the command `user` could currently undo.
    pub fn peek(&self, user: &str) -> Option<String> {
        self.lock()
            .get(user)
            .map(|entry| entry.command.name().to_string())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Consumes the caller's undo slot and runs `undo` with the original context and arguments.
///
/// The command is looked up again by name, so a release or reload since the execution
/// undoes through the current instance rather than the disposed one.
///
/// Returns `Ok(None)` when the caller has nothing to undo. The slot is consumed even if the
/// undo itself fails.
pub async fn undo_last(memory: &UndoMemory, ctx: &Context) -> anyhow::Result<Option<(String, Outcome)>> {
    let Some(entry) = memory.take(ctx.author_id()) else {
        return Ok(None);
    };
    let name = entry.command.name().to_string();
    let command = match ctx.registry.get(&name) {
        Some(command) if command.is_undoable() => command,
        Some(_) => return Err(UndoError::NotUndoable { command: name }.into()),
        None => return Err(UndoError::Unavailable { command: name }.into()),
    };

    log::debug!("Undoing '{}' for '{}'", name, ctx.author_id());
    let outcome = command.handler().undo(&entry.context, &entry.args).await?;
    Ok(Some((name, outcome)))
}
