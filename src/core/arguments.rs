// src/core/arguments.rs

use std::collections::HashMap;

use crate::{
    core::{
        command::ConfigurationError, constraints::Rejection, context::Context,
        resolvers::ResolverTable,
    },
    models::{ArgValue, ArgumentSpec},
};

// --- DATA STRUCTS ---

/// Argument values after default substitution, in schema order. Omitted optional slots are
/// absent rather than empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawArguments {
    entries: Vec<(String, String)>,
}

impl RawArguments {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The values alone, in schema order.
    pub fn values(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, value)| value.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Typed arguments handed to a command body, keyed by argument name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArguments {
    values: HashMap<String, ArgValue>,
}

impl ResolvedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The value as text; every kind renders to one.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(ToString::to_string)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ArgValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn decimal(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            ArgValue::Decimal(value) => Some(*value),
            ArgValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            ArgValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// The bare id of a user, role or channel argument.
    pub fn id(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ArgValue::User(id) | ArgValue::Role(id) | ArgValue::Channel(id) => Some(id),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// --- PHASE 1: DEFAULTS ---

/// Maps positional slots onto `schema`, filling the gaps.
///
/// # Logic:
/// - A supplied slot is kept as-is.
/// - A missing slot with a default takes the default; dynamic defaults are invoked with `ctx`.
/// - A missing optional slot without a default is omitted.
/// - A missing required slot without a default is a configuration error. Arity checking
///   normally prevents this, so reaching it means the schema and the arity bounds disagree.
///
/// Slots beyond the end of the schema are ignored.
pub fn apply_defaults(
    slots: &[Option<String>],
    schema: &[ArgumentSpec],
    ctx: &Context,
) -> Result<RawArguments, ConfigurationError> {
    let mut entries = Vec::with_capacity(schema.len());

    for (index, spec) in schema.iter().enumerate() {
        let supplied = slots.get(index).cloned().flatten();
        let value = match (supplied, &spec.default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.produce(ctx),
            (None, None) if !spec.required => continue,
            (None, None) => {
                return Err(ConfigurationError::MissingRequiredValue {
                    command: ctx.invoked_name.clone(),
                    argument: spec.name.clone(),
                });
            }
        };
        entries.push((spec.name.clone(), value));
    }

    log::debug!("Arguments after defaults: {:?}", entries);
    Ok(RawArguments { entries })
}

// --- PHASE 2: RESOLUTION ---

/// Runs each argument through the resolver registered for its declared kind.
///
/// Kinds without a resolver pass through as [`ArgValue::Text`]. A resolver returning `None`
/// aborts resolution with [`Rejection::Unresolved`].
pub async fn resolve(
    raw: &RawArguments,
    schema: &[ArgumentSpec],
    table: &ResolverTable,
    ctx: &Context,
) -> Result<ResolvedArguments, Rejection> {
    let mut resolved = ResolvedArguments::new();

    for (name, value) in raw.iter() {
        let kind = schema
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.kind.as_str());

        let typed = match kind.and_then(|kind| table.get(kind)) {
            Some(resolver) => resolver.resolve(value, ctx).await.ok_or_else(|| {
                Rejection::Unresolved {
                    name: name.to_string(),
                    value: value.to_string(),
                }
            })?,
            None => ArgValue::Text(value.to_string()),
        };
        resolved.insert(name, typed);
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::TextMessage;
    use std::sync::Arc;

    fn ctx() -> Context {
        Context::for_message(Arc::new(TextMessage::private("1", "!test")))
    }

    fn slots(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn test_apply_defaults_fills_trailing_optional() {
        // --- Setup ---
        let schema = vec![
            ArgumentSpec::required("first", "string"),
            ArgumentSpec::optional("second", "string").with_default("x"),
        ];

        // --- Execute ---
        let raw = apply_defaults(&slots(&["a"]), &schema, &ctx()).unwrap();

        // --- Assert ---
        assert_eq!(raw.values(), vec!["a", "x"]);
    }

    #[test]
    fn test_apply_defaults_omits_optional_without_default() {
        let schema = vec![
            ArgumentSpec::required("first", "string"),
            ArgumentSpec::optional("second", "string"),
        ];
        let raw = apply_defaults(&slots(&["a"]), &schema, &ctx()).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.get("second"), None);
    }

    #[test]
    fn test_apply_defaults_invokes_dynamic_default() {
        let schema = vec![
            ArgumentSpec::optional("target", "user").with_default_fn(|ctx| ctx.author_id().to_string()),
        ];
        let raw = apply_defaults(&[], &schema, &ctx()).unwrap();
        assert_eq!(raw.get("target"), Some("1"));
    }

    #[test]
    fn test_apply_defaults_missing_required_is_configuration_error() {
        let schema = vec![
            ArgumentSpec::optional("first", "string"),
            ArgumentSpec::required("second", "string").with_default("d"),
            ArgumentSpec::optional("third", "string"),
        ];
        // A gap left by a flag on a later slot.
        let raw = apply_defaults(&[None, None, Some("z".into())], &schema, &ctx()).unwrap();
        assert_eq!(raw.values(), vec!["d", "z"]);

        let strict = vec![ArgumentSpec::required("only", "string")];
        let result = apply_defaults(&[None], &strict, &ctx());
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingRequiredValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_numbers() {
        // --- Setup ---
        let ctx = ctx();
        let table = ResolverTable::with_builtins();
        let ints = vec![
            ArgumentSpec::required("first", "integer"),
            ArgumentSpec::required("second", "integer"),
        ];
        let decimals = vec![
            ArgumentSpec::required("first", "decimal"),
            ArgumentSpec::required("second", "decimal"),
        ];

        // --- Execute ---
        let raw_ints = apply_defaults(&slots(&["100", "-13"]), &ints, &ctx).unwrap();
        let resolved_ints = resolve(&raw_ints, &ints, &table, &ctx).await.unwrap();
        let raw_decimals = apply_defaults(&slots(&["1.1", "2.75"]), &decimals, &ctx).unwrap();
        let resolved_decimals = resolve(&raw_decimals, &decimals, &table, &ctx).await.unwrap();

        // --- Assert ---
        assert_eq!(resolved_ints.integer("first"), Some(100));
        assert_eq!(resolved_ints.integer("second"), Some(-13));
        assert_eq!(resolved_decimals.decimal("first"), Some(1.1));
        assert_eq!(resolved_decimals.decimal("second"), Some(2.75));
    }

    #[tokio::test]
    async fn test_resolve_failure_is_rejection() {
        let ctx = ctx();
        let table = ResolverTable::with_builtins();
        let schema = vec![ArgumentSpec::required("count", "integer")];
        let raw = apply_defaults(&slots(&["many"]), &schema, &ctx).unwrap();

        let result = resolve(&raw, &schema, &table, &ctx).await;
        assert_eq!(
            result,
            Err(Rejection::Unresolved {
                name: "count".into(),
                value: "many".into()
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_passes_through() {
        let ctx = ctx();
        let schema = vec![ArgumentSpec::required("emoji", "emoji")];
        let raw = apply_defaults(&slots(&[":wave:"]), &schema, &ctx).unwrap();
        let resolved = resolve(&raw, &schema, &ResolverTable::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(resolved.get("emoji"), Some(&ArgValue::Text(":wave:".into())));
    }
}
