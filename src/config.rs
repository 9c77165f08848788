//! Configuration module for mapscript.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{BridgeError, Result};

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file. Empty logs to the console only.
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Level for lines plugins write through `log.*`.
    #[serde(default = "default_log_level")]
    pub plugin_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/mapscript.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            plugin_level: default_log_level(),
        }
    }
}

/// Runtime context configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Directory the search roots are relative to.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    /// Module search roots, tried in order.
    #[serde(default = "default_search_roots")]
    pub search_roots: Vec<String>,
    /// Interpreter memory limit in megabytes (0 = unlimited).
    #[serde(default = "default_engine_memory")]
    pub memory_limit_mb: usize,
}

fn default_base_dir() -> String {
    ".".to_string()
}

fn default_search_roots() -> Vec<String> {
    vec!["plugins".to_string(), "plugins/libraries".to_string()]
}

fn default_engine_memory() -> usize {
    256
}

impl EngineConfig {
    /// Search roots resolved against the base directory.
    pub fn resolved_roots(&self) -> Vec<PathBuf> {
        let base = Path::new(&self.base_dir);
        self.search_roots.iter().map(|root| base.join(root)).collect()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            search_roots: default_search_roots(),
            memory_limit_mb: default_engine_memory(),
        }
    }
}

/// Plugin discovery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Directories scanned recursively for plugin declarations.
    #[serde(default = "default_plugin_dirs")]
    pub directories: Vec<String>,
    /// File extension of plugin files.
    #[serde(default = "default_plugin_extension")]
    pub extension: String,
}

fn default_plugin_dirs() -> Vec<String> {
    vec!["plugins/entities".to_string()]
}

fn default_plugin_extension() -> String {
    "lua".to_string()
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directories: default_plugin_dirs(),
            extension: default_plugin_extension(),
        }
    }
}

/// Sandboxed literal evaluator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    /// Wall-clock budget for one evaluation in milliseconds.
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_ms: u64,
    /// Instructions executed between abort checks.
    #[serde(default = "default_hook_interval")]
    pub hook_interval: u32,
    /// Memory limit of the throwaway interpreter in kilobytes (0 = unlimited).
    #[serde(default = "default_sandbox_memory")]
    pub memory_limit_kb: usize,
}

fn default_sandbox_timeout() -> u64 {
    1000
}

fn default_hook_interval() -> u32 {
    1000
}

fn default_sandbox_memory() -> usize {
    4096
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_sandbox_timeout(),
            hook_interval: default_hook_interval(),
            memory_limit_kb: default_sandbox_memory(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Runtime context configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Plugin discovery configuration.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Sandboxed evaluator configuration.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(BridgeError::Io)?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BridgeError::Config(format!("config parse error: {e}")))
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - the sandbox timeout is zero
    /// - no module search root is configured
    pub fn validate(&self) -> Result<()> {
        if self.sandbox.timeout_ms == 0 {
            return Err(BridgeError::Config(
                "sandbox.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.engine.search_roots.is_empty() {
            return Err(BridgeError::Config(
                "engine.search_roots must name at least one directory".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/mapscript.log");

        assert_eq!(config.engine.base_dir, ".");
        assert_eq!(config.engine.search_roots, vec!["plugins", "plugins/libraries"]);
        assert_eq!(config.engine.memory_limit_mb, 256);

        assert_eq!(config.plugins.directories, vec!["plugins/entities"]);
        assert_eq!(config.plugins.extension, "lua");

        assert_eq!(config.sandbox.timeout_ms, 1000);
        assert_eq!(config.sandbox.hook_interval, 1000);
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[logging]
level = "debug"
file = "custom/logs/app.log"
plugin_level = "warn"

[engine]
base_dir = "/opt/editor"
search_roots = ["mods/a", "mods/b"]
memory_limit_mb = 64

[plugins]
directories = ["mods/a/entities", "mods/b/entities"]
extension = "luau"

[sandbox]
timeout_ms = 250
hook_interval = 100
memory_limit_kb = 512
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/logs/app.log");
        assert_eq!(config.logging.plugin_level, "warn");
        assert_eq!(config.engine.memory_limit_mb, 64);
        assert_eq!(
            config.engine.resolved_roots(),
            vec![
                PathBuf::from("/opt/editor/mods/a"),
                PathBuf::from("/opt/editor/mods/b")
            ]
        );
        assert_eq!(config.plugins.directories.len(), 2);
        assert_eq!(config.plugins.extension, "luau");
        assert_eq!(config.sandbox.timeout_ms, 250);
        assert_eq!(config.sandbox.hook_interval, 100);
        assert_eq!(config.sandbox.memory_limit_kb, 512);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[sandbox]
timeout_ms = 500
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.sandbox.timeout_ms, 500);
        assert_eq!(config.sandbox.hook_interval, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(BridgeError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.sandbox.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_no_roots() {
        let mut config = Config::default();
        config.engine.search_roots.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[sandbox]\ntimeout_ms = 0\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));

        std::fs::write(&path, "[engine]\nsearch_roots = []\n").unwrap();
        assert!(matches!(Config::load(&path), Err(BridgeError::Config(_))));

        std::fs::write(&path, "[sandbox]\ntimeout_ms = 50\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().sandbox.timeout_ms, 50);
    }
}
