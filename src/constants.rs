// src/constants.rs

/// The name of herald's directory inside the system config directory (`~/.config/herald`).
pub const CONFIG_DIR_NAME: &str = "herald";

/// The name of the settings file (inside the config directory).
pub const SETTINGS_FILENAME: &str = "settings.toml";

/// The prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "!";

/// The reaction added to a successfully handled message when `react_on_success` is set.
pub const DEFAULT_SUCCESS_REACTION: &str = "✅";

/// Origins under this virtual directory are resolved against compiled-in factories
/// instead of manifest files.
pub const BUILTIN_ORIGIN_PREFIX: &str = "builtin";

/// File extension of command manifests.
pub const MANIFEST_EXTENSION: &str = "toml";

/// Pattern every canonical command name must match.
pub const COMMAND_NAME_PATTERN: &str = r"^[a-z_0-9-]{1,40}$";

/// Buffer size of the engine's event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
