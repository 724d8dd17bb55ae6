//! Plugin boundary.
//!
//! Plugins contribute extra entry paths and referenced dependencies for
//! tooling the import graph cannot see (test runners, bundlers, linters).
//! They never observe or mutate the import graph; everything they produce
//! flows back through the engine's two injection points (entry paths and
//! the ledger).

use miette::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::manifest::PackageManifest;

/// Context handed to a plugin when one of its config files is found.
pub struct PluginContext<'a> {
    pub workspace_dir: &'a Path,
    pub manifest: &'a PackageManifest,
    pub is_production: bool,
}

/// Everything a plugin reports for one config file.
#[derive(Debug, Default)]
pub struct PluginOutcome {
    /// `(containing_file, specifier)` pairs, replayed through the engine's
    /// specifier classifier so they participate in ledger accounting.
    pub referenced_dependencies: Vec<(PathBuf, String)>,
    /// `(containing_file, binary_name)` pairs.
    pub referenced_binaries: Vec<(PathBuf, String)>,
    /// Peer dependencies this tool implies.
    pub peer_dependencies: Vec<String>,
    /// Binaries found installed on disk (name → absolute path).
    pub installed_binaries: BTreeMap<String, PathBuf>,
    /// Additional entry files (absolute paths).
    pub entry_paths: Vec<PathBuf>,
}

/// A per-tool adapter.
pub trait Plugin {
    fn name(&self) -> &'static str;

    /// Whether the tool is present, judged from the workspace's declared
    /// dependencies.
    fn is_enabled(&self, dependencies: &BTreeSet<String>) -> bool;

    /// Glob patterns (relative to the workspace directory) locating the
    /// tool's config files.
    fn config_globs(&self) -> &[&'static str];

    /// Inspect one config file and report its contributions.
    fn collect(&self, config_path: &Path, ctx: &PluginContext<'_>) -> Result<PluginOutcome>;
}

/// The set of registered plugins. Empty by default; hosts register the
/// adapters relevant to their toolchain.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins.iter().map(|plugin| plugin.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
