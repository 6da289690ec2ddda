// src/core/context.rs

use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::{
    core::{registry::Registry, tokenizer::Flag, undo::UndoMemory},
    platform::Message,
    settings::Settings,
};

/// Everything a command, guard, relay or resolver may inspect about one invocation.
///
/// Cheap to clone: the message, registry and settings are shared. The undo memory is held
/// weakly since it stores contexts itself.
#[derive(Clone)]
pub struct Context {
    pub invocation_id: Uuid,
    pub message: Arc<dyn Message>,
    pub registry: Arc<Registry>,
    pub settings: Arc<Settings>,
    undo: Weak<UndoMemory>,
    /// The prefix the message was addressed with.
    pub prefix: String,
    /// The name or alias the user typed.
    pub invoked_name: String,
    pub flags: Vec<Flag>,
    /// Epoch milliseconds, read from the registry's clock.
    pub received_at: u64,
}

impl Context {
    pub fn new(
        message: Arc<dyn Message>,
        registry: Arc<Registry>,
        settings: Arc<Settings>,
        undo: &Arc<UndoMemory>,
    ) -> Self {
        let received_at = registry.now_ms();
        Self {
            invocation_id: Uuid::new_v4(),
            message,
            registry,
            settings,
            undo: Arc::downgrade(undo),
            prefix: String::new(),
            invoked_name: String::new(),
            flags: Vec::new(),
            received_at,
        }
    }

    /// A detached context around `message`: an empty registry, default settings and no
    /// undo memory.
    #[cfg(test)]
    pub(crate) fn for_message(message: Arc<dyn Message>) -> Self {
        let loader = crate::core::loader::ModuleLoader::new();
        let registry = Arc::new(Registry::new(Arc::new(loader)));
        let received_at = registry.now_ms();
        Self {
            invocation_id: Uuid::new_v4(),
            message,
            registry,
            settings: Arc::new(Settings::default()),
            undo: Weak::new(),
            prefix: String::new(),
            invoked_name: String::new(),
            flags: Vec::new(),
            received_at,
        }
    }

    pub fn with_invocation(mut self, prefix: &str, invoked_name: &str, flags: Vec<Flag>) -> Self {
        self.prefix = prefix.to_string();
        self.invoked_name = invoked_name.to_string();
        self.flags = flags;
        self
    }

    pub fn author_id(&self) -> &str {
        self.message.author_id()
    }

    pub fn flag(&self, key: &str) -> Option<&Flag> {
        self.flags.iter().find(|flag| flag.key == key)
    }

    /// The engine's undo memory, if the engine is still alive.
    pub fn undo_memory(&self) -> Option<Arc<UndoMemory>> {
        self.undo.upgrade()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("invocation_id", &self.invocation_id)
            .field("message", &self.message)
            .field("prefix", &self.prefix)
            .field("invoked_name", &self.invoked_name)
            .field("flags", &self.flags)
            .field("received_at", &self.received_at)
            .finish_non_exhaustive()
    }
}
