// tests/pipeline.rs

use async_trait::async_trait;
use herald::{
    core::{
        arguments::{self, ResolvedArguments},
        command::{Command, CommandHandler},
        constraints::{self, Rejection},
        context::Context,
        cooldown::{CooldownLedger, ManualClock},
        engine::{Dispatch, Engine},
        loader::ModuleLoader,
        registry::{Registry, RegistryError},
        resolvers::ResolverTable,
        tokenizer,
    },
    models::{Action, ArgumentSpec, Outcome, PermissionSet},
    platform::{BufferedInterpreter, Message, TextMessage},
    settings::Settings,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

struct Quiet;

#[async_trait]
impl CommandHandler for Quiet {
    async fn run(&self, _ctx: &Context, _args: &ResolvedArguments) -> anyhow::Result<Outcome> {
        Ok(Outcome::Nothing)
    }
}

fn dm(user: &str, content: &str) -> Arc<dyn Message> {
    Arc::new(TextMessage::private(user, content))
}

fn detached_context(content: &str) -> Context {
    let engine = Engine::new(
        builtin_registry(),
        Arc::new(BufferedInterpreter::new()),
        Arc::new(Settings::default()),
    );
    engine.context_for(dm("u1", content))
}

fn builtin_registry() -> Arc<Registry> {
    let loader = ModuleLoader::with_builtins();
    let origins = loader.builtin_origins();
    let registry = Arc::new(Registry::new(Arc::new(loader)));
    for origin in origins {
        registry.load(&origin).unwrap();
    }
    registry
}

#[test]
fn test_tokenize_round_trips_through_command_string() {
    let inputs = [
        r#"add "two words" 'single quoted' `code span` plain"#,
        r#"note ```multi
line``` --title=brief -v -n=3"#,
        "--verbose -- -13 \"--not-a-flag\"",
        r#"ban bob --reason="very bad" now"#,
        "",
    ];

    for raw in inputs {
        let first = tokenizer::tokenize(raw);
        let rebuilt = first.to_command_string();
        let second = tokenizer::tokenize(&rebuilt);
        assert_eq!(first, second, "'{}' rebuilt as '{}'", raw, rebuilt);
    }
}

#[tokio::test]
#[allow(clippy::approx_constant)]
async fn test_numeric_arguments_resolve() {
    // --- Setup ---
    let ctx = detached_context("!calc");
    let table = ResolverTable::with_builtins();
    let integers = [
        ArgumentSpec::required("first", "integer"),
        ArgumentSpec::required("second", "integer"),
    ];
    let decimals = [
        ArgumentSpec::required("first", "decimal"),
        ArgumentSpec::required("second", "decimal"),
    ];

    // --- Execute ---
    let raw = arguments::apply_defaults(
        &[Some("100".into()), Some("-13".into())],
        &integers,
        &ctx,
    )
    .unwrap();
    let ints = arguments::resolve(&raw, &integers, &table, &ctx).await.unwrap();

    let raw = arguments::apply_defaults(
        &[Some("1.1".into()), Some("3.14".into())],
        &decimals,
        &ctx,
    )
    .unwrap();
    let decs = arguments::resolve(&raw, &decimals, &table, &ctx).await.unwrap();

    // --- Assert ---
    assert_eq!(ints.integer("first"), Some(100));
    assert_eq!(ints.integer("second"), Some(-13));
    assert_eq!(decs.decimal("first"), Some(1.1));
    assert_eq!(decs.decimal("second"), Some(3.14));
}

#[test]
fn test_defaults_fill_missing_optional_slots() {
    let ctx = detached_context("!cmd a");
    let schema = [
        ArgumentSpec::required("first", "string"),
        ArgumentSpec::optional("second", "string").with_default("x"),
    ];

    let raw = arguments::apply_defaults(&[Some("a".into())], &schema, &ctx).unwrap();

    assert_eq!(raw.values(), vec!["a", "x"]);
}

#[test]
fn test_cooldown_expires_with_clock() {
    let clock = Arc::new(ManualClock::new(10_000));
    let ledger = CooldownLedger::new(clock.clone());
    let now = ledger.now_ms();

    ledger.set("u1", now + 5_000, "ping");
    assert!(!ledger.expired("u1", "ping"));

    clock.advance(Duration::from_millis(5_001));
    assert!(ledger.expired("u1", "ping"));
}

#[test]
fn test_alias_collision_rolls_back_second_registration() {
    // --- Setup ---
    let registry = Registry::new(Arc::new(ModuleLoader::new()));
    let first = Command::builder("first")
        .aliases(["one", "shared"])
        .build(Quiet)
        .unwrap();
    let second = Command::builder("second")
        .aliases(["two", "shared"])
        .build(Quiet)
        .unwrap();

    // --- Execute ---
    registry.register(first, "mem/first").unwrap();
    let result = registry.register(second, "mem/second");

    // --- Assert ---
    assert!(matches!(result, Err(RegistryError::AliasCollision { .. })));
    assert!(registry.contains("first"));
    assert_eq!(registry.aliases_of("first"), vec!["one", "shared"]);
    assert!(!registry.contains("second"));
    assert!(registry.aliases_of("second").is_empty());
    assert_eq!(registry.canonical_name("two"), "two");
    assert_eq!(registry.canonical_name("shared"), "first");
}

#[test]
fn test_release_and_lazy_restore() {
    let registry = builtin_registry();

    assert!(registry.release("ping"));
    assert!(registry.is_released("ping"));
    let restored = registry.get("ping").unwrap();
    assert_eq!(restored.name(), "ping");
    assert!(registry.contains("ping"));

    assert!(!registry.release("help"));
    assert!(registry.contains("help"));
}

#[test]
fn test_disabled_is_reported_before_permissions() {
    let command = Command::builder("ban")
        .enabled(false)
        .issuer_permissions(PermissionSet::from_iter(["ban_members"]))
        .build(Quiet)
        .unwrap();
    let ctx = detached_context("!ban");

    let result = constraints::evaluate(&command, &[], &ctx, &ResolverTable::with_builtins());

    assert_eq!(result, Err(Rejection::Disabled));
    assert_eq!(Rejection::Disabled.reason(), "disabled");
}

#[tokio::test]
async fn test_manifest_command_runs_through_engine() {
    // --- Setup ---
    let dir = tempdir().unwrap();
    let path = dir.path().join("greet.toml");
    fs::write(
        &path,
        r#"
name = "greet"
aliases = ["hi"]
reply = "Hello, {who}!"

[[args]]
name = "who"
required = false
default = "world"
"#,
    )
    .unwrap();
    let registry = builtin_registry();
    registry.load(&path).unwrap();
    let interpreter = Arc::new(BufferedInterpreter::new());
    let engine = Engine::new(registry, interpreter.clone(), Arc::new(Settings::default()));

    // --- Execute ---
    let first = engine.handle(dm("u1", "!hi")).await;
    let second = engine.handle(dm("u1", "!GREET friend")).await;
    let ignored = engine.handle(dm("u1", "greet friend")).await;

    // --- Assert ---
    assert_eq!(first, Dispatch::Executed { command: "greet".into() });
    assert_eq!(second, Dispatch::Executed { command: "greet".into() });
    assert_eq!(ignored, Dispatch::Ignored);
    assert_eq!(
        interpreter.drain(),
        vec![Action::reply("Hello, world!"), Action::reply("Hello, friend!")]
    );
}

#[tokio::test]
async fn test_builtin_help_lists_registered_commands() {
    let interpreter = Arc::new(BufferedInterpreter::new());
    let engine = Engine::new(
        builtin_registry(),
        interpreter.clone(),
        Arc::new(Settings::default()),
    );

    let dispatch = engine.handle(dm("u1", "!help")).await;

    assert!(matches!(dispatch, Dispatch::Executed { .. }));
    let replies = interpreter.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("!ping"));
    assert!(replies[0].contains("!help"));
}
