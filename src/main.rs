use std::env;
use std::path::Path;

use tracing::{error, info, warn};

use mapscript::{Config, PluginCatalog, PluginLoader};

fn main() {
    let config_path = env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());

    // Load and validate configuration
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = mapscript::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        mapscript::logging::init_console_only(&config.logging);
    }

    info!("mapscript - Lua plugin bridge");

    let engine = match mapscript::shared_engine(&config.engine) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "script runtime unavailable");
            std::process::exit(1);
        }
    };

    let loader = PluginLoader::new(&engine).with_extension(config.plugins.extension.clone());
    let mut catalog = PluginCatalog::new();
    let base = Path::new(&config.engine.base_dir);
    for dir in &config.plugins.directories {
        let report = loader.load_dir(&base.join(dir), &mut catalog);
        for (path, reason) in &report.errors {
            warn!(path = %path, error = %reason, "plugin file not loaded");
        }
    }

    info!(
        plugins = catalog.len(),
        names = ?catalog.names().collect::<Vec<_>>(),
        "plugins loaded"
    );
}
