//! Plugin loading from source text and plugin directories.

use std::collections::BTreeMap;
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};

use mlua::{Table, Value};
use tracing::{debug, info, warn};

use super::contract::PluginDescriptor;
use super::engine::ScriptEngine;
use crate::map::Entity;
use crate::{BridgeError, Result};

/// Outcome of loading a directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Plugins registered.
    pub loaded: usize,
    /// Files that failed, with the reason.
    pub errors: Vec<(String, String)>,
}

impl LoadReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Plugins by name. A later registration under the same name replaces the
/// earlier one.
#[derive(Debug, Default)]
pub struct PluginCatalog {
    plugins: BTreeMap<String, PluginDescriptor>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, plugin: PluginDescriptor) {
        let name = plugin.name().to_string();
        if let Some(previous) = self.plugins.insert(name.clone(), plugin) {
            warn!(
                plugin = %name,
                previous = %previous.source(),
                "plugin registered twice, later declaration wins"
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(name)
    }

    /// The plugin handling `entity`.
    pub fn for_entity(&self, entity: &Entity) -> Option<&PluginDescriptor> {
        self.get(&entity.name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Loads plugin declarations into an engine.
pub struct PluginLoader<'a> {
    engine: &'a ScriptEngine,
    extension: String,
}

impl<'a> PluginLoader<'a> {
    pub fn new(engine: &'a ScriptEngine) -> Self {
        Self {
            engine,
            extension: "lua".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Load every declaration in `source`.
    ///
    /// A chunk returns either one declaration (a table with a `name`) or a
    /// list of them. Declarations without a text name are skipped with a
    /// warning; a chunk that fails to compile or run, or returns anything
    /// else, is an error.
    pub fn load_source(&self, chunk: &str, source: &str) -> Result<Vec<PluginDescriptor>> {
        let value = self.engine.eval_source(chunk, source)?;
        let Value::Table(table) = value else {
            return Err(BridgeError::Contract(format!(
                "{chunk} must return a plugin table, got {}",
                value.type_name()
            )));
        };

        let declarations: Vec<Table> = if has_name(&table) {
            vec![table]
        } else {
            let mut list = Vec::new();
            for entry in table.sequence_values::<Value>() {
                match entry {
                    Ok(Value::Table(declaration)) => list.push(declaration),
                    Ok(other) => warn!(
                        chunk,
                        kind = other.type_name(),
                        "plugin list entry is not a table, skipping"
                    ),
                    Err(e) => warn!(chunk, error = %e, "unreadable plugin list entry, skipping"),
                }
            }
            list
        };

        let mut plugins = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            match PluginDescriptor::from_table(self.engine, chunk, &declaration) {
                Ok(plugin) => plugins.push(plugin),
                Err(e) => warn!(chunk, error = %e, "skipping plugin declaration"),
            }
        }
        Ok(plugins)
    }

    pub fn load_file(&self, path: &Path) -> Result<Vec<PluginDescriptor>> {
        let source = fs::read_to_string(path)?;
        self.load_source(&format!("@{}", path.display()), &source)
    }

    /// Load every plugin file under `dir` into `catalog`.
    pub fn load_dir(&self, dir: &Path, catalog: &mut PluginCatalog) -> LoadReport {
        let mut report = LoadReport::default();
        if dir.exists() {
            self.scan_directory(dir, catalog, &mut report);
        } else {
            debug!(dir = %dir.display(), "plugin directory does not exist");
        }
        info!(
            dir = %dir.display(),
            loaded = report.loaded,
            errors = report.errors.len(),
            "plugin directory loaded"
        );
        report
    }

    fn scan_directory(&self, dir: &Path, catalog: &mut PluginCatalog, report: &mut LoadReport) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                report.errors.push((dir.display().to_string(), e.to_string()));
                return;
            }
        };

        // File types come from the entries themselves, so symlinks are not followed.
        let mut paths: Vec<(PathBuf, FileType)> = entries
            .flatten()
            .filter_map(|entry| entry.file_type().ok().map(|kind| (entry.path(), kind)))
            .collect();
        paths.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, kind) in paths {
            if kind.is_dir() {
                self.scan_directory(&path, catalog, report);
            } else if kind.is_symlink() && path.is_dir() {
                debug!(path = %path.display(), "skipping symlinked directory");
            } else if path.extension().is_some_and(|ext| ext == self.extension.as_str()) {
                match self.load_file(&path) {
                    Ok(plugins) => {
                        for plugin in plugins {
                            catalog.insert(plugin);
                            report.loaded += 1;
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to load plugin file");
                        report.errors.push((path.display().to_string(), e.to_string()));
                    }
                }
            }
        }
    }
}

fn has_name(table: &Table) -> bool {
    !table.raw_get::<Value>("name").unwrap_or(Value::Nil).is_nil()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use tempfile::TempDir;

    fn engine() -> ScriptEngine {
        ScriptEngine::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_single_declaration() {
        let engine = engine();
        let plugins = PluginLoader::new(&engine)
            .load_source("spring.lua", "return { name = 'spring', depth = -1 }")
            .unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "spring");
    }

    #[test]
    fn test_declaration_list_skips_unnamed() {
        let engine = engine();
        let plugins = PluginLoader::new(&engine)
            .load_source(
                "many.lua",
                "return { { name = 'a' }, { depth = 1 }, 'junk', { name = 'b' } }",
            )
            .unwrap();
        let names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_bad_sources() {
        let engine = engine();
        let loader = PluginLoader::new(&engine);
        assert!(matches!(
            loader.load_source("broken.lua", "return {"),
            Err(BridgeError::Compile { .. })
        ));
        assert!(matches!(
            loader.load_source("number.lua", "return 5"),
            Err(BridgeError::Contract(_))
        ));
        assert!(matches!(
            loader.load_source("raise.lua", "error('load failed')"),
            Err(BridgeError::Runtime { .. })
        ));
    }

    #[test]
    fn test_load_dir_recursive_with_override() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join("a.lua"), "return { name = 'box', depth = 1 }").unwrap();
        fs::write(nested.join("b.lua"), "return { name = 'box', depth = 2 }").unwrap();
        fs::write(temp.path().join("broken.lua"), "return {").unwrap();
        fs::write(temp.path().join("notes.txt"), "not a plugin").unwrap();

        let engine = engine();
        let mut catalog = PluginCatalog::new();
        let report = PluginLoader::new(&engine).load_dir(temp.path(), &mut catalog);

        assert_eq!(report.loaded, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(catalog.len(), 1);
        let source = catalog.get("box").unwrap().source();
        assert!(source.ends_with("b.lua"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_not_followed() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("a.lua"), "return { name = 'a' }").unwrap();
        std::os::unix::fs::symlink(temp.path(), nested.join("loop")).unwrap();

        let engine = engine();
        let mut catalog = PluginCatalog::new();
        let report = PluginLoader::new(&engine).load_dir(temp.path(), &mut catalog);

        assert_eq!(report.loaded, 1);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let engine = engine();
        let mut catalog = PluginCatalog::new();
        let report =
            PluginLoader::new(&engine).load_dir(Path::new("/nonexistent/plugins"), &mut catalog);
        assert_eq!(report.loaded, 0);
        assert!(!report.has_errors());
    }
}
