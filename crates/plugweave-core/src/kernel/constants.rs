/// Application name
pub const APP_NAME: &str = "Plugweave";

/// Application version
pub const APP_VERSION: &str = "0.1.0";

/// Id of the descriptor representing the host application itself
pub const CORE_PLUGIN_ID: &str = "platform.core";

/// Prefix of dependency ids that belong to the module-aware compatibility model
pub const MODULE_DEPENDENCY_PREFIX: &str = "platform.modules.";

/// Umbrella marker: the host provides every platform module
pub const ALL_MODULES_MARKER: &str = "platform.modules.all";

/// Manifest file name inside a plugin's `META-INF` directory
pub const PLUGIN_MANIFEST: &str = "plugin.json";

/// Directory holding the plugin manifest, relative to a plugin root
pub const META_INF: &str = "META-INF";

/// Extension of single-file plugin archives
pub const ARCHIVE_EXTENSION: &str = "jar";

/// Suffix of the platform-prefixed manifest found on classpath roots (`<Prefix>Plugin.json`)
pub const PLATFORM_MANIFEST_SUFFIX: &str = "Plugin.json";

/// File (inside the config directory) listing disabled plugin ids
pub const DISABLED_PLUGINS_FILENAME: &str = "disabled_plugins.txt";

/// File (inside the config directory) listing broken plugin versions
pub const BROKEN_PLUGINS_FILENAME: &str = "brokenPlugins.txt";

/// Default configuration directory name
pub const CONFIG_DIR_NAME: &str = ".plugweave";

/// Default custom (user-writable) plugins directory
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

/// Default bundled (read-only) plugins directory
pub const BUNDLED_PLUGINS_DIR: &str = "plugins/bundled";

/// Default number of manifest parsing workers
pub const DEFAULT_PARSE_WORKERS: usize = 4;
