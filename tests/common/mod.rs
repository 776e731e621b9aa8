//! Shared fixtures for file-backed loader tests
//!
//! Each fixture is a temporary directory holding a config file and the
//! data it points at, so configs can use relative source paths.

use dynaload::{Loader, LoaderConfig, MemoryStore, OpenedSource, RunStats};
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Write `contents` to `name` inside the fixture directory.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }
}

/// Load `config`, run it against a fresh in-memory store and return both.
pub async fn run_config(config: &PathBuf) -> (Vec<RunStats>, MemoryStore) {
    let config = LoaderConfig::load(config).expect("load config");
    let loader = Loader::new(config.mappings().expect("build mappings"));
    let store = MemoryStore::new();
    let stats = match config.source.open().expect("open source") {
        OpenedSource::Csv(source) => loader.run(&source, &store).await,
        OpenedSource::Xml(source) => loader.run(&source, &store).await,
    }
    .expect("run loader");
    (stats, store)
}
