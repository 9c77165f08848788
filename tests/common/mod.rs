//! Test helpers for integration tests.
//!
//! Provides engine construction, on-disk plugin trees and a small scene.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::rc::Rc;

use mlua::Value;
use tempfile::TempDir;

use mapscript::config::EngineConfig;
use mapscript::{Entity, EntityRef, PluginDescriptor, Room, RoomRef, ScriptEngine};

/// Engine with default configuration (roots relative to the cwd).
pub fn engine() -> ScriptEngine {
    ScriptEngine::new(&EngineConfig::default()).expect("engine should initialize")
}

/// Engine whose module roots live under `base`.
pub fn engine_at(base: &Path) -> ScriptEngine {
    let config = EngineConfig {
        base_dir: base.display().to_string(),
        ..EngineConfig::default()
    };
    ScriptEngine::new(&config).expect("engine should initialize")
}

/// Write `files` (relative path, source) under a fresh temp directory.
pub fn plugin_tree(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().expect("temp dir");
    for (relative, source) in files {
        let path = temp.path().join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, source).expect("write plugin");
    }
    temp
}

/// Load a single declaration from source.
pub fn declare(engine: &ScriptEngine, source: &str) -> PluginDescriptor {
    let Value::Table(table) = engine.eval_source("test", source).expect("eval") else {
        panic!("declaration must be a table");
    };
    PluginDescriptor::from_table(engine, "test", &table).expect("declaration")
}

/// A room holding one entity per `index` data value.
pub fn scene(indices: &[i64]) -> (RoomRef, Vec<EntityRef>) {
    let entities: Vec<EntityRef> = indices
        .iter()
        .enumerate()
        .map(|(i, index)| {
            Entity::new(i as i64 + 1, "blinker", 10, 20)
                .with_size(8, 8)
                .with_data("index", *index)
                .into_ref()
        })
        .collect();
    let room = entities
        .iter()
        .fold(Room::new("lvl-1", 320, 184), |room, entity| {
            room.with_entity(Rc::clone(entity))
        })
        .into_ref();
    (room, entities)
}
