//! Logging configuration and initialization for mapscript.
//!
//! Host lines and plugin lines share one subscriber. Plugins log under
//! [`PLUGIN_TARGET`], which gets its own level so a chatty plugin can be
//! quieted without hiding bridge warnings.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::{BridgeError, Result};

/// Target of every line a plugin writes through `log.*`.
pub const PLUGIN_TARGET: &str = "plugin";

/// Parse log level string to tracing Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Directive giving plugin lines their own level.
fn plugin_directive(level: &str) -> Option<Directive> {
    let level = parse_level(level).as_str().to_ascii_lowercase();
    format!("{PLUGIN_TARGET}={level}").parse().ok()
}

/// `RUST_LOG` first, then the configured host and plugin levels.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let filter = EnvFilter::from_default_env().add_directive(parse_level(&config.level).into());
    match plugin_directive(&config.plugin_level) {
        Some(directive) => filter.add_directive(directive),
        None => filter,
    }
}

/// Initialize logging: console always, plus a plain-text log file unless
/// `file` is empty.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let file_layer = if config.file.is_empty() {
        None
    } else {
        if let Some(parent) = Path::new(&config.file).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let log_file = Arc::new(File::create(&config.file)?);
        Some(
            fmt::layer()
                .with_writer(log_file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
    };

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(fmt::layer().with_writer(std::io::stdout).with_target(true))
        .with(file_layer)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("logging already initialized: {e}")))?;

    Ok(())
}

/// Console-only logging, used when the file sink cannot be opened.
///
/// Silently keeps an already installed subscriber, so tests may call it
/// repeatedly.
pub fn init_console_only(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(fmt::layer().with_writer(std::io::stdout).with_target(true))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("Info"), Level::INFO);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("ERROR"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_default() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_plugin_directive() {
        let directive = plugin_directive("WARN").unwrap();
        assert_eq!(directive.to_string().to_ascii_lowercase(), "plugin=warn");
        let fallback = plugin_directive("bogus").unwrap();
        assert_eq!(fallback.to_string().to_ascii_lowercase(), "plugin=info");
    }

    #[test]
    fn test_filter_carries_plugin_level() {
        let config = LoggingConfig {
            plugin_level: "error".to_string(),
            ..LoggingConfig::default()
        };
        let filter = build_filter(&config).to_string().to_ascii_lowercase();
        assert!(filter.contains("plugin=error"));
    }

    #[test]
    fn test_init_console_only_twice() {
        init_console_only(&LoggingConfig::default());
        init_console_only(&LoggingConfig {
            level: "debug".to_string(),
            ..LoggingConfig::default()
        });
    }
}
