// src/core/resolvers.rs

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{core::context::Context, models::ArgValue};

lazy_static! {
    static ref USER_MENTION_RE: Regex = Regex::new(r"^(?:<@!?(\d+)>|(\d+))$").unwrap();
    static ref ROLE_MENTION_RE: Regex = Regex::new(r"^(?:<@&(\d+)>|(\d+))$").unwrap();
    static ref CHANNEL_MENTION_RE: Regex = Regex::new(r"^(?:<#(\d+)>|(\d+))$").unwrap();
}

const AFFIRMATIVE: &[&str] = &["true", "1", "yes", "on", "y"];
const NEGATIVE: &[&str] = &["false", "0", "no", "off", "n"];

/// Turns a raw argument string into a typed value.
///
/// `validate` is the cheap syntactic predicate run during constraint evaluation; `resolve`
/// runs afterwards and may consult the host (a member lookup, for instance). Returning
/// `None` from `resolve` rejects the invocation.
#[async_trait]
pub trait TypeResolver: Send + Sync {
    fn validate(&self, _raw: &str) -> bool {
        true
    }

    async fn resolve(&self, raw: &str, ctx: &Context) -> Option<ArgValue>;
}

/// Maps declared argument kinds (`integer`, `user`, ...) to their resolvers.
#[derive(Clone, Default)]
pub struct ResolverTable {
    resolvers: HashMap<String, Arc<dyn TypeResolver>>,
}

impl fmt::Debug for ResolverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.resolvers.keys().collect();
        kinds.sort();
        f.debug_struct("ResolverTable").field("kinds", &kinds).finish()
    }
}

impl ResolverTable {
    /// An empty table. Every argument passes through as text.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the built-in resolvers registered.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register("integer", IntegerResolver);
        table.register("decimal", DecimalResolver);
        table.register("boolean", BooleanResolver);
        table.register("string", TextResolver);
        table.register("user", MentionResolver::user());
        table.register("role", MentionResolver::role());
        table.register("channel", MentionResolver::channel());
        table
    }

    /// Registers (or replaces) the resolver for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, resolver: impl TypeResolver + 'static) {
        self.resolvers.insert(kind.into(), Arc::new(resolver));
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn TypeResolver>> {
        self.resolvers.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.resolvers.contains_key(kind)
    }

    /// Runs the syntactic predicate for `kind`. Unknown kinds always validate.
    pub fn validate(&self, kind: &str, raw: &str) -> bool {
        self.get(kind).is_none_or(|resolver| resolver.validate(raw))
    }
}

// --- BUILT-IN RESOLVERS ---

#[derive(Debug, Clone, Copy)]
pub struct IntegerResolver;

#[async_trait]
impl TypeResolver for IntegerResolver {
    fn validate(&self, raw: &str) -> bool {
        raw.parse::<i64>().is_ok()
    }

    async fn resolve(&self, raw: &str, _ctx: &Context) -> Option<ArgValue> {
        raw.parse::<i64>().ok().map(ArgValue::Integer)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecimalResolver;

impl DecimalResolver {
    fn parse(raw: &str) -> Option<f64> {
        raw.parse::<f64>().ok().filter(|value| value.is_finite())
    }
}

#[async_trait]
impl TypeResolver for DecimalResolver {
    fn validate(&self, raw: &str) -> bool {
        Self::parse(raw).is_some()
    }

    async fn resolve(&self, raw: &str, _ctx: &Context) -> Option<ArgValue> {
        Self::parse(raw).map(ArgValue::Decimal)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BooleanResolver;

impl BooleanResolver {
    fn parse(raw: &str) -> Option<bool> {
        let lowered = raw.to_ascii_lowercase();
        if AFFIRMATIVE.contains(&lowered.as_str()) {
            Some(true)
        } else if NEGATIVE.contains(&lowered.as_str()) {
            Some(false)
        } else {
            None
        }
    }
}

#[async_trait]
impl TypeResolver for BooleanResolver {
    fn validate(&self, raw: &str) -> bool {
        Self::parse(raw).is_some()
    }

    async fn resolve(&self, raw: &str, _ctx: &Context) -> Option<ArgValue> {
        Self::parse(raw).map(ArgValue::Boolean)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextResolver;

#[async_trait]
impl TypeResolver for TextResolver {
    async fn resolve(&self, raw: &str, _ctx: &Context) -> Option<ArgValue> {
        Some(ArgValue::Text(raw.to_string()))
    }
}

/// Resolves `<@id>`-style mentions (or bare numeric ids) to an id.
#[derive(Debug, Clone)]
pub struct MentionResolver {
    pattern: &'static Regex,
    wrap: fn(String) -> ArgValue,
}

impl MentionResolver {
    pub fn user() -> Self {
        Self {
            pattern: &*USER_MENTION_RE,
            wrap: ArgValue::User,
        }
    }

    pub fn role() -> Self {
        Self {
            pattern: &*ROLE_MENTION_RE,
            wrap: ArgValue::Role,
        }
    }

    pub fn channel() -> Self {
        Self {
            pattern: &*CHANNEL_MENTION_RE,
            wrap: ArgValue::Channel,
        }
    }

    fn extract(&self, raw: &str) -> Option<String> {
        let caps = self.pattern.captures(raw.trim())?;
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    }
}

#[async_trait]
impl TypeResolver for MentionResolver {
    fn validate(&self, raw: &str) -> bool {
        self.extract(raw).is_some()
    }

    async fn resolve(&self, raw: &str, _ctx: &Context) -> Option<ArgValue> {
        self.extract(raw).map(self.wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::TextMessage;

    fn ctx() -> Context {
        Context::for_message(Arc::new(TextMessage::private("1", "!test")))
    }

    #[tokio::test]
    async fn test_integer_resolver() {
        let ctx = ctx();
        assert_eq!(
            IntegerResolver.resolve("-13", &ctx).await,
            Some(ArgValue::Integer(-13))
        );
        assert_eq!(IntegerResolver.resolve("1.5", &ctx).await, None);
        assert_eq!(IntegerResolver.resolve("ten", &ctx).await, None);
        assert!(!IntegerResolver.validate("12a"));
    }

    #[tokio::test]
    async fn test_decimal_resolver_rejects_non_finite() {
        let ctx = ctx();
        assert_eq!(
            DecimalResolver.resolve("2.5", &ctx).await,
            Some(ArgValue::Decimal(2.5))
        );
        assert_eq!(DecimalResolver.resolve("inf", &ctx).await, None);
        assert_eq!(DecimalResolver.resolve("NaN", &ctx).await, None);
    }

    #[test]
    fn test_boolean_tokens_are_case_insensitive() {
        for token in ["true", "YES", "On", "y", "1"] {
            assert_eq!(BooleanResolver::parse(token), Some(true), "{}", token);
        }
        for token in ["false", "No", "OFF", "n", "0"] {
            assert_eq!(BooleanResolver::parse(token), Some(false), "{}", token);
        }
        assert_eq!(BooleanResolver::parse("maybe"), None);
    }

    #[tokio::test]
    async fn test_mentions() {
        let ctx = ctx();
        let user = MentionResolver::user();
        assert_eq!(
            user.resolve("<@!42>", &ctx).await,
            Some(ArgValue::User("42".into()))
        );
        assert_eq!(user.resolve("42", &ctx).await, Some(ArgValue::User("42".into())));
        assert_eq!(user.resolve("<@&42>", &ctx).await, None);

        let role = MentionResolver::role();
        assert_eq!(role.resolve("<@&7>", &ctx).await, Some(ArgValue::Role("7".into())));

        let channel = MentionResolver::channel();
        assert!(channel.validate("<#99>"));
        assert!(!channel.validate("#general"));
    }

    #[test]
    fn test_unknown_kinds_validate() {
        let table = ResolverTable::with_builtins();
        assert!(table.validate("emoji", "anything"));
        assert!(!table.validate("integer", "x"));
        assert!(table.contains("user"));
    }
}
