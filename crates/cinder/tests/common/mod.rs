//! Shared helpers for integration tests

#![allow(dead_code)]

use cinder::{Config, Factory};
use cinder_parser::preprocessor::find_compiler;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A factory generating under a fresh temp dir, or `None` without a C compiler
pub fn factory() -> Option<(Factory, TempDir)> {
    init_tracing();
    if find_compiler(None).is_err() {
        eprintln!("no C compiler, skipping");
        return None;
    }

    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.generation.gen_root = temp.path().join("gen");
    Some((Factory::new(config), temp))
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}
