// src/core/loader.rs

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::{
    constants::{BUILTIN_ORIGIN_PREFIX, MANIFEST_EXTENSION},
    core::{
        command::{Command, ConfigurationError},
        manifest,
    },
};

/// Errors raised while turning an origin into a [`Command`].
#[derive(Error, Debug)]
pub enum LoadError {
    /// The module file could not be read (deleted between release and reload, for instance).
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse manifest '{}': {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// The module loaded but declares an invalid command.
    #[error("Invalid command declaration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("No built-in command is registered at '{}'.", .origin.display())]
    UnknownBuiltin { origin: PathBuf },
}

/// Produces a fresh [`Command`] instance from an origin path.
///
/// The registry calls this on `load`, on `reload`, and when a released command is needed
/// again, so implementations must be able to load the same origin repeatedly.
pub trait CommandLoader: Send + Sync {
    fn load(&self, origin: &Path) -> Result<Command, LoadError>;
}

/// A factory for a compiled-in command.
pub type CommandFactory = fn() -> Result<Command, ConfigurationError>;

/// Loads compiled-in commands from `builtin/<name>` origins and TOML manifests from any
/// other path.
#[derive(Default, Clone)]
pub struct ModuleLoader {
    factories: HashMap<PathBuf, CommandFactory>,
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("builtins", &self.builtin_origins())
            .finish()
    }
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader that knows every command under [`crate::commands`].
    pub fn with_builtins() -> Self {
        let mut loader = Self::new();
        for (name, factory) in crate::commands::builtins() {
            loader.register_factory(name, factory);
        }
        loader
    }

    /// The origin path of the built-in command `name`.
    pub fn builtin_origin(name: &str) -> PathBuf {
        Path::new(BUILTIN_ORIGIN_PREFIX).join(name)
    }

    pub fn register_factory(&mut self, name: &str, factory: CommandFactory) {
        self.factories.insert(Self::builtin_origin(name), factory);
    }

    /// Origins of every registered built-in, sorted.
    pub fn builtin_origins(&self) -> Vec<PathBuf> {
        let mut origins: Vec<PathBuf> = self.factories.keys().cloned().collect();
        origins.sort();
        origins
    }

    /// Finds every manifest under `dir`, sorted by path.
    ///
    /// # Errors
    /// Returns `LoadError::Io` if the directory cannot be walked.
    pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let mut manifests = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(std::io::Error::from)?;
            let is_manifest = entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == MANIFEST_EXTENSION);
            if is_manifest {
                manifests.push(entry.into_path());
            }
        }
        manifests.sort();
        log::debug!("Discovered {} manifest(s) in '{}'", manifests.len(), dir.display());
        Ok(manifests)
    }
}

impl CommandLoader for ModuleLoader {
    fn load(&self, origin: &Path) -> Result<Command, LoadError> {
        if origin.starts_with(BUILTIN_ORIGIN_PREFIX) {
            let factory = self
                .factories
                .get(origin)
                .ok_or_else(|| LoadError::UnknownBuiltin {
                    origin: origin.to_path_buf(),
                })?;
            return Ok(factory()?);
        }
        manifest::load_manifest(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_builtins_load_by_origin() {
        let loader = ModuleLoader::with_builtins();
        let help = loader.load(&ModuleLoader::builtin_origin("help")).unwrap();
        assert_eq!(help.name(), "help");
        assert!(help.is_internal());

        assert!(matches!(
            loader.load(Path::new("builtin/nope")),
            Err(LoadError::UnknownBuiltin { .. })
        ));
    }

    #[test]
    fn test_discover_finds_nested_manifests() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let nested = dir.path().join("fun");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("b.toml"), "name = \"b\"\nreply = \"b\"\n").unwrap();
        fs::write(nested.join("a.toml"), "name = \"a\"\nreply = \"a\"\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        // --- Execute ---
        let found = ModuleLoader::discover(dir.path()).unwrap();

        // --- Assert ---
        assert_eq!(found, vec![dir.path().join("b.toml"), nested.join("a.toml")]);
        let loader = ModuleLoader::new();
        let names: Vec<String> = found
            .iter()
            .map(|path| loader.load(path).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
