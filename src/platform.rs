//! # Platform Contracts
//!
//! The pipeline never talks to a chat platform directly. Inbound messages arrive through
//! the [`Message`] trait and outbound side effects leave through an [`ActionInterpreter`].
//! A platform adapter implements both; [`TextMessage`] and [`BufferedInterpreter`] are
//! minimal in-memory implementations used by the console front-end and by tests.

use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;

use crate::{
    core::context::Context,
    models::{Action, ChannelKind, PermissionSet},
};

/// An inbound chat message, as exposed by the platform adapter.
pub trait Message: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn author_id(&self) -> &str;
    fn author_roles(&self) -> &[String];
    fn content(&self) -> &str;
    fn channel_id(&self) -> &str;
    fn channel(&self) -> ChannelKind;
    fn guild_id(&self) -> Option<&str>;
    /// Effective permissions of the author in the message's channel.
    fn issuer_permissions(&self) -> PermissionSet;
    /// Effective permissions of the bot itself in the message's channel.
    fn self_permissions(&self) -> PermissionSet;
}

/// Executes the actions produced by commands.
#[async_trait]
pub trait ActionInterpreter: Send + Sync {
    async fn interpret(&self, action: Action, ctx: &Context) -> anyhow::Result<()>;

    /// Interprets `actions` in order, stopping at the first failure.
    async fn interpret_many(&self, actions: Vec<Action>, ctx: &Context) -> anyhow::Result<()> {
        for action in actions {
            self.interpret(action, ctx).await?;
        }
        Ok(())
    }
}

/// A self-contained message with owned fields.
#[derive(Debug, Clone)]
pub struct TextMessage {
    pub id: String,
    pub author_id: String,
    pub author_roles: Vec<String>,
    pub content: String,
    pub channel_id: String,
    pub channel: ChannelKind,
    pub guild_id: Option<String>,
    pub issuer_permissions: PermissionSet,
    pub self_permissions: PermissionSet,
}

impl TextMessage {
    /// A direct message from `author_id`.
    pub fn private(author_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author_id: author_id.into(),
            author_roles: Vec::new(),
            content: content.into(),
            channel_id: "dm".to_string(),
            channel: ChannelKind::Private,
            guild_id: None,
            issuer_permissions: PermissionSet::new(),
            self_permissions: PermissionSet::new(),
        }
    }

    /// A message posted in a guild channel.
    pub fn guild(
        author_id: impl Into<String>,
        guild_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: "general".to_string(),
            channel: ChannelKind::Guild { nsfw: false },
            guild_id: Some(guild_id.into()),
            ..Self::private(author_id, content)
        }
    }

    pub fn with_roles<S: Into<String>>(mut self, roles: impl IntoIterator<Item = S>) -> Self {
        self.author_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_issuer_permissions(mut self, permissions: PermissionSet) -> Self {
        self.issuer_permissions = permissions;
        self
    }

    pub fn with_self_permissions(mut self, permissions: PermissionSet) -> Self {
        self.self_permissions = permissions;
        self
    }

    pub fn nsfw(mut self) -> Self {
        if let ChannelKind::Guild { .. } = self.channel {
            self.channel = ChannelKind::Guild { nsfw: true };
        }
        self
    }
}

impl Message for TextMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn author_id(&self) -> &str {
        &self.author_id
    }

    fn author_roles(&self) -> &[String] {
        &self.author_roles
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn channel(&self) -> ChannelKind {
        self.channel
    }

    fn guild_id(&self) -> Option<&str> {
        self.guild_id.as_deref()
    }

    fn issuer_permissions(&self) -> PermissionSet {
        self.issuer_permissions.clone()
    }

    fn self_permissions(&self) -> PermissionSet {
        self.self_permissions.clone()
    }
}

/// An interpreter that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct BufferedInterpreter {
    actions: Mutex<Vec<Action>>,
}

impl BufferedInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears the recorded actions.
    pub fn drain(&self) -> Vec<Action> {
        let mut guard = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *guard)
    }

    /// The `content` of every recorded reply, in order.
    pub fn replies(&self) -> Vec<String> {
        let guard = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .filter_map(|action| match action {
                Action::Reply { content } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ActionInterpreter for BufferedInterpreter {
    async fn interpret(&self, action: Action, _ctx: &Context) -> anyhow::Result<()> {
        log::trace!("Buffering action: {:?}", action);
        self.actions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(action);
        Ok(())
    }
}
