// src/core/registry.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::core::{
    command::{Command, is_valid_name},
    cooldown::{Clock, CooldownLedger, SystemClock},
    loader::{CommandLoader, LoadError},
};

/// Represents errors that can occur while mutating the registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The canonical name does not match the command name pattern.
    #[error("Invalid command name '{name}'.")]
    InvalidName { name: String },
    /// A live command already uses this canonical name.
    #[error("Command '{name}' is already registered.")]
    AlreadyRegistered { name: String },
    /// The canonical name is already an alias of another command.
    #[error("Command name '{name}' is already an alias of '{owner}'.")]
    NameShadowsAlias { name: String, owner: String },
    /// An alias is owned by another command, or is another command's canonical name.
    /// Every alias inserted by the failed call has been rolled back.
    #[error("Alias '{alias}' of '{name}' is already taken by '{owner}'.")]
    AliasCollision {
        name: String,
        alias: String,
        owner: String,
    },
    /// The command's module could not be loaded from its origin.
    #[error("Failed to load command: {0}")]
    Load(#[from] LoadError),
    /// The loaded module declares a different name than the one being restored.
    #[error("Module at '{origin}' declares '{found}', expected '{expected}'.")]
    NameMismatch {
        expected: String,
        found: String,
        origin: PathBuf,
    },
    #[error("Command '{name}' is not registered.")]
    NotFound { name: String },
}

type RegistryResult<T> = Result<T, RegistryError>;

/// A live command and where it was loaded from.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub command: Arc<Command>,
    pub origin: PathBuf,
}

/// A command that was unloaded but can be loaded again from `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedCommand {
    pub name: String,
    pub origin: PathBuf,
}

/// The outcome of looking a name up without side effects.
#[derive(Debug, Clone)]
pub enum Resolution {
    Live(Arc<Command>),
    Released(ReleasedCommand),
}

#[derive(Debug, Default)]
struct RegistryState {
    commands: HashMap<String, RegistryEntry>,
    /// alias -> canonical name. Survives `release`.
    aliases: HashMap<String, String>,
    /// canonical name -> origin of unloaded commands.
    released: HashMap<String, PathBuf>,
    /// canonical name -> epoch ms of the last invocation (or registration).
    last_used: HashMap<String, u64>,
}

impl RegistryState {
    fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        if self.commands.contains_key(name) || self.released.contains_key(name) {
            return name;
        }
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    fn is_known_name(&self, name: &str) -> bool {
        self.commands.contains_key(name) || self.released.contains_key(name)
    }

    /// Inserts `command` under the current lock.
    ///
    /// # Logic:
    /// 1. The name must be valid, not live, and not another command's alias.
    /// 2. Aliases are inserted one by one. On the first collision every alias inserted so
    ///    far in this call is removed again and the registration fails.
    /// 3. Aliases left over from a previous incarnation that the new descriptor no longer
    ///    declares are dropped.
    fn insert(&mut self, command: Command, origin: PathBuf, now: u64) -> RegistryResult<Arc<Command>> {
        let name = command.name().to_string();

        if !is_valid_name(&name) {
            return Err(RegistryError::InvalidName { name });
        }
        if self.commands.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }
        if let Some(owner) = self.aliases.get(&name).filter(|owner| **owner != name) {
            return Err(RegistryError::NameShadowsAlias {
                owner: owner.clone(),
                name,
            });
        }

        let mut inserted: Vec<String> = Vec::new();
        for alias in command.aliases() {
            let owner = if self.is_known_name(alias) {
                Some(alias.clone())
            } else {
                self.aliases.get(alias).filter(|owner| **owner != name).cloned()
            };

            if let Some(owner) = owner {
                for rolled_back in &inserted {
                    self.aliases.remove(rolled_back);
                }
                log::debug!(
                    "Rolled back {} alias(es) of '{}' after collision on '{}'.",
                    inserted.len(),
                    name,
                    alias
                );
                return Err(RegistryError::AliasCollision {
                    name,
                    alias: alias.clone(),
                    owner,
                });
            }

            if !self.aliases.contains_key(alias) {
                self.aliases.insert(alias.clone(), name.clone());
                inserted.push(alias.clone());
            }
        }

        let declared = command.aliases();
        self.aliases
            .retain(|alias, owner| *owner != name || declared.contains(alias));

        let command = Arc::new(command);
        self.released.remove(&name);
        self.last_used.insert(name.clone(), now);
        self.commands.insert(
            name,
            RegistryEntry {
                command: Arc::clone(&command),
                origin,
            },
        );
        Ok(command)
    }

    fn remove_aliases_of(&mut self, name: &str) -> Vec<String> {
        let owned: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, owner)| owner.as_str() == name)
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in &owned {
            self.aliases.remove(alias);
        }
        owned
    }
}

/// The set of loaded commands, their aliases, and the cooldown ledger.
///
/// All mutations take the same write lock, so a `reload` can never interleave with a
/// `release` of the same name. Module loading happens outside the lock.
pub struct Registry {
    state: RwLock<RegistryState>,
    loader: Arc<dyn CommandLoader>,
    cooldowns: CooldownLedger,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("state", &self.state)
            .field("cooldowns", &self.cooldowns)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(loader: Arc<dyn CommandLoader>) -> Self {
        Self::with_clock(loader, Arc::new(SystemClock))
    }

    pub fn with_clock(loader: Arc<dyn CommandLoader>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            loader,
            cooldowns: CooldownLedger::new(Arc::clone(&clock)),
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// The ledger of every user's cooldowns.
    pub fn cooldowns(&self) -> &CooldownLedger {
        &self.cooldowns
    }

    pub fn loader(&self) -> &Arc<dyn CommandLoader> {
        &self.loader
    }

    // --- MUTATION ---

    /// Registers `command`, loaded from `origin`.
    ///
    /// # Errors
    /// See [`RegistryError`]. On an alias collision no alias of `command` remains registered.
    pub fn register(&self, command: Command, origin: impl Into<PathBuf>) -> RegistryResult<Arc<Command>> {
        let origin = origin.into();
        let now = self.now_ms();
        let registered = self.write().insert(command, origin.clone(), now)?;
        log::debug!(
            "Registered '{}' from '{}'",
            registered.name(),
            origin.display()
        );
        Ok(registered)
    }

    /// Loads the module at `origin` through the loader and registers it.
    pub fn load(&self, origin: &Path) -> RegistryResult<Arc<Command>> {
        let command = self.loader.load(origin)?;
        self.register(command, origin)
    }

    /// Forgets a command entirely: live instance, aliases and release bookkeeping.
    /// Accepts the canonical name or an alias.
    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.write();
            let canonical = state.canonical(name).to_string();
            let entry = state.commands.remove(&canonical);
            let was_released = state.released.remove(&canonical).is_some();
            let aliases = state.remove_aliases_of(&canonical);
            state.last_used.remove(&canonical);
            if entry.is_none() && !was_released && aliases.is_empty() {
                return false;
            }
            entry
        };

        if let Some(entry) = removed {
            entry.command.handler().dispose();
        }
        log::debug!("Removed command '{}'", name);
        true
    }

    /// Unloads a live command, remembering its origin so it can be loaded again.
    ///
    /// Returns `false` for unknown, already released, and internal commands. Aliases stay
    /// registered and keep pointing at the released name.
    pub fn release(&self, name: &str) -> bool {
        let entry = {
            let mut state = self.write();
            let canonical = state.canonical(name).to_string();
            match state.commands.get(&canonical) {
                None => return false,
                Some(entry) if entry.command.is_internal() => {
                    log::warn!("Refusing to release internal command '{}'.", canonical);
                    return false;
                }
                Some(_) => {}
            }
            let Some(entry) = state.commands.remove(&canonical) else {
                return false;
            };
            state.released.insert(canonical, entry.origin.clone());
            entry
        };

        entry.command.handler().dispose();
        log::debug!(
            "Released '{}' (origin '{}')",
            entry.command.name(),
            entry.origin.display()
        );
        true
    }

    /// Re-imports a live (or released) command from its origin, discarding the old instance.
    ///
    /// Returns `false` if the command is unknown or the module no longer loads; a live
    /// command is then left untouched.
    pub fn reload(&self, name: &str) -> bool {
        match self.try_reload(name) {
            Ok(command) => {
                log::debug!("Reloaded '{}'", command.name());
                true
            }
            Err(e) => {
                log::warn!("Failed to reload '{}': {}", name, e);
                false
            }
        }
    }

    fn try_reload(&self, name: &str) -> RegistryResult<Arc<Command>> {
        let (canonical, origin) = match self.resolve(name) {
            Some(Resolution::Live(command)) => {
                let canonical = command.name().to_string();
                let origin = self
                    .read()
                    .commands
                    .get(&canonical)
                    .map(|entry| entry.origin.clone())
                    .ok_or_else(|| RegistryError::NotFound {
                        name: canonical.clone(),
                    })?;
                (canonical, origin)
            }
            Some(Resolution::Released(released)) => return self.materialize(released),
            None => {
                return Err(RegistryError::NotFound {
                    name: name.to_string(),
                });
            }
        };

        let fresh = self.loader.load(&origin)?;
        if fresh.name() != canonical {
            return Err(RegistryError::NameMismatch {
                expected: canonical,
                found: fresh.name().to_string(),
                origin,
            });
        }

        let now = self.now_ms();
        let (previous, reloaded) = {
            let mut state = self.write();
            let Some(previous) = state.commands.remove(&canonical) else {
                return Err(RegistryError::NotFound { name: canonical });
            };
            let previous_aliases = state.remove_aliases_of(&canonical);

            match state.insert(fresh, origin, now) {
                Ok(reloaded) => (previous, reloaded),
                Err(e) => {
                    for alias in previous_aliases {
                        state.aliases.insert(alias, canonical.clone());
                    }
                    state.commands.insert(canonical, previous);
                    return Err(e);
                }
            }
        };

        previous.command.handler().dispose();
        Ok(reloaded)
    }

    /// Reloads every live command. Returns how many succeeded.
    pub fn reload_all(&self) -> usize {
        let names = self.names();
        let total = names.len();
        let reloaded = names.iter().filter(|name| self.reload(name)).count();
        log::debug!("Reloaded {}/{} commands", reloaded, total);
        reloaded
    }

    // --- LOOKUP ---

    /// Maps an alias to its canonical name. Unknown names are returned unchanged.
    pub fn canonical_name(&self, name: &str) -> String {
        self.read().canonical(name).to_string()
    }

    /// Looks `name` (canonical or alias) up without loading anything.
    pub fn resolve(&self, name: &str) -> Option<Resolution> {
        let state = self.read();
        let canonical = state.canonical(name);
        if let Some(entry) = state.commands.get(canonical) {
            return Some(Resolution::Live(Arc::clone(&entry.command)));
        }
        state.released.get(canonical).map(|origin| {
            Resolution::Released(ReleasedCommand {
                name: canonical.to_string(),
                origin: origin.clone(),
            })
        })
    }

    /// Loads a released command back from its origin and registers it.
    ///
    /// If another caller restored it first, the live instance is returned instead.
    pub fn materialize(&self, released: ReleasedCommand) -> RegistryResult<Arc<Command>> {
        let command = self.loader.load(&released.origin)?;
        if command.name() != released.name {
            return Err(RegistryError::NameMismatch {
                expected: released.name,
                found: command.name().to_string(),
                origin: released.origin,
            });
        }

        let now = self.now_ms();
        let mut state = self.write();
        if let Some(entry) = state.commands.get(&released.name) {
            return Ok(Arc::clone(&entry.command));
        }
        let restored = state.insert(command, released.origin, now)?;
        log::debug!("Materialized released command '{}'", released.name);
        Ok(restored)
    }

    /// Returns the live command for `name`, loading it back first if it was released.
    ///
    /// Failures to restore (a deleted module file, for instance) are logged and reported
    /// as `None`.
    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        match self.resolve(name)? {
            Resolution::Live(command) => Some(command),
            Resolution::Released(released) => {
                let origin = released.origin.clone();
                match self.materialize(released) {
                    Ok(command) => Some(command),
                    Err(e) => {
                        log::warn!(
                            "Could not restore '{}' from '{}': {}",
                            name,
                            origin.display(),
                            e
                        );
                        None
                    }
                }
            }
        }
    }

    /// Returns the live command for `name` without restoring released ones.
    pub fn get_live(&self, name: &str) -> Option<Arc<Command>> {
        match self.resolve(name)? {
            Resolution::Live(command) => Some(command),
            Resolution::Released(_) => None,
        }
    }

    /// `true` if `name` is the canonical name of a live command.
    pub fn contains(&self, name: &str) -> bool {
        self.read().commands.contains_key(name)
    }

    pub fn is_released(&self, name: &str) -> bool {
        let state = self.read();
        state.released.contains_key(state.canonical(name))
    }

    /// Canonical names of live commands, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Live commands, sorted by name.
    pub fn commands(&self) -> Vec<Arc<Command>> {
        let state = self.read();
        let mut commands: Vec<Arc<Command>> = state
            .commands
            .values()
            .map(|entry| Arc::clone(&entry.command))
            .collect();
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        commands
    }

    /// Registered aliases pointing at `name`, sorted.
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let state = self.read();
        let mut aliases: Vec<String> = state
            .aliases
            .iter()
            .filter(|(_, owner)| owner.as_str() == name)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }

    // --- USAGE BOOKKEEPING ---

    /// Records that `name` was just invoked.
    pub fn touch(&self, name: &str) {
        let now = self.now_ms();
        let mut state = self.write();
        let canonical = state.canonical(name).to_string();
        if state.commands.contains_key(&canonical) {
            state.last_used.insert(canonical, now);
        }
    }

    pub fn last_used(&self, name: &str) -> Option<u64> {
        let state = self.read();
        state.last_used.get(state.canonical(name)).copied()
    }

    /// Live, releasable commands not used since `cutoff_ms`, sorted.
    pub fn idle_since(&self, cutoff_ms: u64) -> Vec<String> {
        let state = self.read();
        let mut idle: Vec<String> = state
            .commands
            .iter()
            .filter(|(_, entry)| !entry.command.is_internal())
            .filter(|(name, _)| {
                state
                    .last_used
                    .get(name.as_str())
                    .is_none_or(|used| *used < cutoff_ms)
            })
            .map(|(name, _)| name.clone())
            .collect();
        idle.sort();
        idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        arguments::ResolvedArguments, command::CommandHandler, context::Context,
        cooldown::ManualClock,
    };
    use crate::models::Outcome;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Noop;

    #[async_trait]
    impl CommandHandler for Noop {
        async fn run(&self, _ctx: &Context, _args: &ResolvedArguments) -> anyhow::Result<Outcome> {
            Ok(Outcome::Nothing)
        }
    }

    struct Counted(Arc<AtomicUsize>);

    #[async_trait]
    impl CommandHandler for Counted {
        async fn run(&self, _ctx: &Context, _args: &ResolvedArguments) -> anyhow::Result<Outcome> {
            Ok(Outcome::Nothing)
        }

        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Loads commands from an in-memory table of origin -> (name, aliases, internal).
    #[derive(Default)]
    struct TableLoader {
        modules: Mutex<HashMap<PathBuf, (String, Vec<String>, bool)>>,
        loads: AtomicUsize,
    }

    impl TableLoader {
        fn put(&self, origin: &str, name: &str, aliases: &[&str], internal: bool) {
            self.modules.lock().unwrap().insert(
                PathBuf::from(origin),
                (
                    name.to_string(),
                    aliases.iter().map(|a| a.to_string()).collect(),
                    internal,
                ),
            );
        }

        fn delete(&self, origin: &str) {
            self.modules.lock().unwrap().remove(Path::new(origin));
        }
    }

    impl CommandLoader for TableLoader {
        fn load(&self, origin: &Path) -> Result<Command, LoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let modules = self.modules.lock().unwrap();
            let (name, aliases, internal) = modules.get(origin).cloned().ok_or_else(|| {
                LoadError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    origin.display().to_string(),
                ))
            })?;
            Ok(Command::builder(name)
                .aliases(aliases)
                .internal(internal)
                .build(Noop)?)
        }
    }

    fn setup() -> (Arc<TableLoader>, Registry) {
        let loader = Arc::new(TableLoader::default());
        loader.put("cmd/ping.toml", "ping", &["p", "pong"], false);
        loader.put("builtin/help", "help", &["h"], true);
        let registry = Registry::new(loader.clone());
        registry.load(Path::new("cmd/ping.toml")).unwrap();
        registry.load(Path::new("builtin/help")).unwrap();
        (loader, registry)
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_names() {
        let (_, registry) = setup();
        let dup = Command::builder("ping").build(Noop).unwrap();
        assert!(matches!(
            registry.register(dup, "other"),
            Err(RegistryError::AlreadyRegistered { .. })
        ));

        let shadow = Command::builder("p").build(Noop).unwrap();
        assert!(matches!(
            registry.register(shadow, "other"),
            Err(RegistryError::NameShadowsAlias { .. })
        ));
    }

    #[test]
    fn test_alias_collision_rolls_back() {
        // --- Setup ---
        let (_, registry) = setup();
        let second = Command::builder("pinger")
            .aliases(["pg", "pi", "pong"])
            .build(Noop)
            .unwrap();

        // --- Execute ---
        let result = registry.register(second, "cmd/pinger.toml");

        // --- Assert ---
        assert!(matches!(
            result,
            Err(RegistryError::AliasCollision { ref alias, ref owner, .. })
                if alias == "pong" && owner == "ping"
        ));
        assert!(!registry.contains("pinger"));
        assert!(registry.aliases_of("pinger").is_empty());
        assert_eq!(registry.canonical_name("pg"), "pg");
        assert_eq!(registry.aliases_of("ping"), vec!["p", "pong"]);
        assert!(registry.contains("ping"));
    }

    #[test]
    fn test_alias_equal_to_other_canonical_name_collides() {
        let (_, registry) = setup();
        let command = Command::builder("assist").alias("help").build(Noop).unwrap();
        assert!(matches!(
            registry.register(command, "x"),
            Err(RegistryError::AliasCollision { .. })
        ));
    }

    #[test]
    fn test_release_then_get_restores() {
        // --- Setup ---
        let (loader, registry) = setup();
        let loads_before = loader.loads.load(Ordering::SeqCst);

        // --- Execute ---
        assert!(registry.release("ping"));
        assert!(!registry.release("ping"));

        // --- Assert ---
        assert!(!registry.contains("ping"));
        assert!(registry.is_released("ping"));
        assert_eq!(registry.canonical_name("p"), "ping");
        assert!(matches!(registry.resolve("p"), Some(Resolution::Released(_))));

        let restored = registry.get("p").unwrap();
        assert_eq!(restored.name(), "ping");
        assert!(registry.contains("ping"));
        assert!(!registry.is_released("ping"));
        assert_eq!(loader.loads.load(Ordering::SeqCst), loads_before + 1);
        assert_eq!(registry.aliases_of("ping"), vec!["p", "pong"]);
    }

    #[test]
    fn test_internal_commands_refuse_release() {
        let (_, registry) = setup();
        assert!(!registry.release("help"));
        assert!(!registry.release("h"));
        assert!(registry.contains("help"));
    }

    #[test]
    fn test_get_released_with_missing_module_returns_none() {
        let (loader, registry) = setup();
        registry.release("ping");
        loader.delete("cmd/ping.toml");

        assert!(registry.get("ping").is_none());
        assert!(registry.is_released("ping"));
    }

    #[test]
    fn test_release_disposes_instance() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new(Arc::new(TableLoader::default()));
        let command = Command::builder("count")
            .build(Counted(disposed.clone()))
            .unwrap();
        registry.register(command, "mem/count").unwrap();

        assert!(registry.release("count"));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reload_swaps_aliases_and_keeps_old_on_failure() {
        // --- Setup ---
        let (loader, registry) = setup();
        loader.put("cmd/ping.toml", "ping", &["pp"], false);

        // --- Execute & Assert ---
        assert!(registry.reload("ping"));
        assert_eq!(registry.aliases_of("ping"), vec!["pp"]);
        assert_eq!(registry.canonical_name("p"), "p");

        loader.delete("cmd/ping.toml");
        assert!(!registry.reload("pp"));
        assert!(registry.contains("ping"));
        assert_eq!(registry.aliases_of("ping"), vec!["pp"]);

        assert!(!registry.reload("missing"));
    }

    #[test]
    fn test_reload_all_counts_successes() {
        let (loader, registry) = setup();
        loader.delete("cmd/ping.toml");
        assert_eq!(registry.reload_all(), 1);
        assert_eq!(registry.names(), vec!["help", "ping"]);
    }

    #[test]
    fn test_remove_forgets_everything() {
        let (_, registry) = setup();
        registry.release("ping");

        assert!(registry.remove("p"));
        assert!(!registry.is_released("ping"));
        assert!(registry.aliases_of("ping").is_empty());
        assert!(registry.resolve("ping").is_none());
        assert!(!registry.remove("ping"));
    }

    #[test]
    fn test_idle_since_skips_internal_and_recent() {
        let clock = Arc::new(ManualClock::new(1_000));
        let loader = Arc::new(TableLoader::default());
        loader.put("a", "alpha", &[], false);
        loader.put("b", "beta", &[], false);
        loader.put("h", "help", &[], true);
        let registry = Registry::with_clock(loader, clock.clone());
        for origin in ["a", "b", "h"] {
            registry.load(Path::new(origin)).unwrap();
        }

        clock.advance(Duration::from_secs(60));
        registry.touch("beta");

        assert_eq!(registry.idle_since(clock.now_ms()), vec!["alpha"]);
        assert_eq!(registry.last_used("beta"), Some(61_000));
    }
}
