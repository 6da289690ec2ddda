// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::context::Context;

// --- INVOCATION ENVIRONMENT ---

/// Where a command is allowed to run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Anywhere,
    Guild,
    Private,
    NsfwGuild,
}

/// The kind of channel a message was received in, as reported by the platform adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Private,
    Guild { nsfw: bool },
}

impl Environment {
    /// Returns `true` if a message received in `channel` satisfies this environment.
    pub fn admits(self, channel: ChannelKind) -> bool {
        matches!(
            (self, channel),
            (Environment::Anywhere, _)
                | (Environment::Guild, ChannelKind::Guild { .. })
                | (Environment::Private, ChannelKind::Private)
                | (Environment::NsfwGuild, ChannelKind::Guild { nsfw: true })
        )
    }
}

// --- PERMISSIONS ---

/// A set of named permissions (e.g. `manage_messages`).
///
/// The framework only ever performs superset checks on these names; mapping them to a
/// platform's permission bits is the adapter's job.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.0.insert(permission.into())
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Lists the permissions of `required` that this set does not hold, in sorted order.
    /// An empty result means `self` is a superset of `required`.
    pub fn missing(&self, required: &PermissionSet) -> Vec<String> {
        required.0.difference(&self.0).cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// --- EXCLUSIVITY ---

/// One entry of a command's `specific` override list.
///
/// Serialized as a prefixed string (`user:123`, `role:456`, `group:owners`) so manifests
/// stay readable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum SpecificEntry {
    User(String),
    Role(String),
    Group(String),
}

impl FromStr for SpecificEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("Specific entry '{}' is missing a 'kind:' prefix.", s))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(format!("Specific entry '{}' has an empty identifier.", s));
        }
        match kind.trim() {
            "user" => Ok(SpecificEntry::User(id.to_string())),
            "role" => Ok(SpecificEntry::Role(id.to_string())),
            "group" => Ok(SpecificEntry::Group(id.to_string())),
            other => Err(format!("Unknown specific entry kind '{}'.", other)),
        }
    }
}

impl TryFrom<String> for SpecificEntry {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpecificEntry> for String {
    fn from(value: SpecificEntry) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SpecificEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecificEntry::User(id) => write!(f, "user:{}", id),
            SpecificEntry::Role(id) => write!(f, "role:{}", id),
            SpecificEntry::Group(name) => write!(f, "group:{}", name),
        }
    }
}

// --- CONSTRAINTS ---

/// The dynamic `can_execute` predicate of a command.
#[derive(Clone)]
pub enum CanExecute {
    Always(bool),
    Dynamic(Arc<dyn Fn(&Context) -> bool + Send + Sync>),
}

impl CanExecute {
    pub fn evaluate(&self, ctx: &Context) -> bool {
        match self {
            CanExecute::Always(value) => *value,
            CanExecute::Dynamic(predicate) => predicate(ctx),
        }
    }
}

impl fmt::Debug for CanExecute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanExecute::Always(value) => f.debug_tuple("Always").field(value).finish(),
            CanExecute::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Declarative requirements a command attaches to itself.
#[derive(Debug, Clone)]
pub struct Constraints {
    pub environment: Environment,
    pub self_permissions: PermissionSet,
    pub issuer_permissions: PermissionSet,
    /// Cooldown in seconds. `0` disables the cooldown check.
    pub cooldown: u64,
    pub specific: Vec<SpecificEntry>,
    pub enabled: bool,
    pub can_execute: CanExecute,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            environment: Environment::Anywhere,
            self_permissions: PermissionSet::new(),
            issuer_permissions: PermissionSet::new(),
            cooldown: 0,
            specific: Vec::new(),
            enabled: true,
            can_execute: CanExecute::Always(true),
        }
    }
}

// --- ARGUMENT SCHEMA ---

/// The default value of an optional argument.
#[derive(Clone)]
pub enum ArgDefault {
    Static(String),
    Dynamic(Arc<dyn Fn(&Context) -> String + Send + Sync>),
}

impl ArgDefault {
    pub fn produce(&self, ctx: &Context) -> String {
        match self {
            ArgDefault::Static(value) => value.clone(),
            ArgDefault::Dynamic(producer) => producer(ctx),
        }
    }
}

impl fmt::Debug for ArgDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgDefault::Static(value) => f.debug_tuple("Static").field(value).finish(),
            ArgDefault::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Declares one positional argument of a command.
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    pub name: String,
    /// Key into the resolver table (`integer`, `boolean`, `user`, ...).
    pub kind: String,
    pub required: bool,
    pub default: Option<ArgDefault>,
    /// Single-dash flag that may also fill this slot (`-n` for `count`).
    pub flag_short: Option<String>,
}

impl ArgumentSpec {
    pub fn required(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            required: true,
            default: None,
            flag_short: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(ArgDefault::Static(value.into()));
        self
    }

    pub fn with_default_fn(
        mut self,
        producer: impl Fn(&Context) -> String + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(ArgDefault::Dynamic(Arc::new(producer)));
        self
    }

    pub fn with_flag(mut self, short: impl Into<String>) -> Self {
        self.flag_short = Some(short.into());
        self
    }

    /// A slot that must be supplied by the caller: required and without a substitute.
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default.is_none()
    }
}

// --- RESOLVED VALUES ---

/// A typed argument value produced by a resolver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    User(String),
    Role(String),
    Channel(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Text(value) => f.write_str(value),
            ArgValue::Integer(value) => write!(f, "{}", value),
            ArgValue::Decimal(value) => write!(f, "{}", value),
            ArgValue::Boolean(value) => write!(f, "{}", value),
            ArgValue::User(id) => write!(f, "<@{}>", id),
            ArgValue::Role(id) => write!(f, "<@&{}>", id),
            ArgValue::Channel(id) => write!(f, "<#{}>", id),
        }
    }
}

// --- ACTIONS ---

/// A side effect requested by a command. Actions are never executed by the engine itself;
/// they are handed verbatim to the host's `ActionInterpreter`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Reply { content: String },
    Send { channel_id: String, content: String },
    React { emoji: String },
    DeleteMessage { message_id: String },
    AddRole { user_id: String, role_id: String },
    RemoveRole { user_id: String, role_id: String },
    Custom { kind: String, payload: serde_json::Value },
}

impl Action {
    pub fn reply(content: impl Into<String>) -> Self {
        Action::Reply {
            content: content.into(),
        }
    }
}

/// What a command body returned.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
    #[default]
    Nothing,
    Value(serde_json::Value),
    Action(Action),
    Actions(Vec<Action>),
}

impl Outcome {
    /// Splits the outcome into the actions that must be interpreted, in order.
    pub fn into_actions(self) -> Vec<Action> {
        match self {
            Outcome::Nothing | Outcome::Value(_) => Vec::new(),
            Outcome::Action(action) => vec![action],
            Outcome::Actions(actions) => actions,
        }
    }
}

impl From<Action> for Outcome {
    fn from(action: Action) -> Self {
        Outcome::Action(action)
    }
}

impl From<Vec<Action>> for Outcome {
    fn from(actions: Vec<Action>) -> Self {
        Outcome::Actions(actions)
    }
}
