//! Module resolution for `require` inside plugins.
//!
//! The interpreter's searcher list is replaced with two entries: the
//! built-in preload searcher and a host searcher that maps `a.b.c` to
//! `a/b/c.lua` under each configured root, in order. The default file
//! searchers (and with them `package.path` and C modules) are dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Function, Lua, Table, Value};
use tracing::debug;

use crate::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct ModuleResolver {
    roots: Vec<PathBuf>,
}

impl ModuleResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Candidate paths for `name`, in search order.
    pub fn candidates(&self, name: &str) -> Result<Vec<PathBuf>> {
        if name.is_empty()
            || name.contains(['/', '\\'])
            || name.split('.').any(|segment| segment.is_empty())
        {
            return Err(BridgeError::Module {
                name: name.to_string(),
                tried: Vec::new(),
            });
        }
        let relative: PathBuf = name.split('.').collect::<PathBuf>().with_extension("lua");
        Ok(self.roots.iter().map(|root| root.join(&relative)).collect())
    }

    /// Resolve `name` to a file, or list every path tried.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut tried = Vec::new();
        for candidate in self.candidates(name)? {
            if candidate.is_file() {
                return Ok(candidate);
            }
            tried.push(candidate.display().to_string());
        }
        Err(BridgeError::Module {
            name: name.to_string(),
            tried,
        })
    }

    /// Replace the interpreter's searchers with preload plus this resolver.
    pub fn install(self, lua: &Lua) -> mlua::Result<()> {
        let package: Table = lua.globals().get("package")?;
        let searchers: Table = package.get("searchers")?;
        let preload: Function = searchers.raw_get(1)?;

        let resolver = Rc::new(self);
        let searcher = lua.create_function(move |lua, name: String| {
            match resolver.resolve(&name) {
                Ok(path) => {
                    let chunk = load_module(lua, &path)?;
                    let origin = lua.create_string(path.display().to_string())?;
                    Ok((Value::Function(chunk), Value::String(origin)))
                }
                Err(BridgeError::Module { tried, .. }) => {
                    let message = tried
                        .iter()
                        .map(|path| format!("\n\tno file '{path}'"))
                        .collect::<String>();
                    Ok((Value::String(lua.create_string(message)?), Value::Nil))
                }
                Err(other) => Err(mlua::Error::external(other)),
            }
        })?;

        let fresh = lua.create_table()?;
        fresh.raw_set(1, preload)?;
        fresh.raw_set(2, searcher)?;
        package.set("searchers", fresh)?;
        package.set("path", "")?;
        package.set("cpath", "")?;
        Ok(())
    }
}

fn load_module(lua: &Lua, path: &Path) -> mlua::Result<Function> {
    debug!(path = %path.display(), "loading module");
    let source = fs::read_to_string(path).map_err(mlua::Error::external)?;
    lua.load(source)
        .set_name(format!("@{}", path.display()))
        .into_function()
}
