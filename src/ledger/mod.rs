//! Dependency ledger.
//!
//! Per-workspace accounting of manifest-declared packages against the
//! references the engine observes. The referenced set only ever grows;
//! `settle` computes the declared-minus-referenced remainder once analysis
//! is done.

use globset::GlobSet;
use miette::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

use crate::discovery::build_glob_set;
use crate::workspaces::Workspace;

/// Declared and observed dependencies of one workspace.
#[derive(Debug, Default)]
struct WorkspaceDeps {
    package_name: String,
    manifest_path: PathBuf,
    dependencies: BTreeSet<String>,
    dev_dependencies: BTreeSet<String>,
    peer_dependencies: BTreeSet<String>,
    optional_dependencies: BTreeSet<String>,
    installed_binaries: BTreeMap<String, PathBuf>,
    referenced: BTreeSet<String>,
}

impl WorkspaceDeps {
    fn declares(&self, package: &str) -> bool {
        self.dependencies.contains(package)
            || self.dev_dependencies.contains(package)
            || self.optional_dependencies.contains(package)
    }
}

/// The unused remainder for one workspace after settling.
#[derive(Debug)]
pub struct SettledWorkspace {
    pub name: String,
    pub manifest_path: PathBuf,
    pub unused_dependencies: Vec<String>,
    pub unused_dev_dependencies: Vec<String>,
}

/// Declared-vs-referenced bookkeeping across all workspaces.
pub struct DependencyLedger {
    by_workspace: BTreeMap<String, WorkspaceDeps>,
    ancestors: BTreeMap<String, Vec<String>>,
    ignore: GlobSet,
    strict: bool,
}

impl DependencyLedger {
    /// `ignore_patterns` are package-name globs that always satisfy a
    /// reference and are never reported as unused.
    pub fn new(ignore_patterns: &[String], strict: bool) -> Result<Self> {
        Ok(Self {
            by_workspace: BTreeMap::new(),
            ancestors: BTreeMap::new(),
            ignore: build_glob_set(ignore_patterns)?,
            strict,
        })
    }

    /// Populate the declared sets from a workspace manifest.
    pub fn add_workspace(&mut self, workspace: &Workspace) {
        let manifest = &workspace.manifest;
        let deps = WorkspaceDeps {
            package_name: workspace.package_name.clone(),
            manifest_path: workspace.manifest_path.clone(),
            dependencies: manifest.dependencies.keys().cloned().collect(),
            dev_dependencies: manifest.dev_dependencies.keys().cloned().collect(),
            peer_dependencies: manifest.peer_dependencies.keys().cloned().collect(),
            optional_dependencies: manifest.optional_dependencies.keys().cloned().collect(),
            installed_binaries: BTreeMap::new(),
            referenced: BTreeSet::new(),
        };
        self.ancestors
            .insert(workspace.name.clone(), workspace.ancestors.clone());
        self.by_workspace.insert(workspace.name.clone(), deps);
    }

    /// Merge peer dependencies discovered through plugins.
    pub fn add_peer_dependencies(&mut self, workspace_name: &str, peers: &[String]) {
        if let Some(deps) = self.by_workspace.get_mut(workspace_name) {
            deps.peer_dependencies.extend(peers.iter().cloned());
        }
    }

    /// Record the binaries present on disk for a workspace.
    pub fn set_installed_binaries(
        &mut self,
        workspace_name: &str,
        binaries: BTreeMap<String, PathBuf>,
    ) {
        if let Some(deps) = self.by_workspace.get_mut(workspace_name) {
            deps.installed_binaries.extend(binaries);
        }
    }

    /// Does `workspace_name` have a binary named `binary` installed?
    pub fn has_binary(&self, workspace_name: &str, binary: &str) -> bool {
        self.by_workspace
            .get(workspace_name)
            .map(|deps| deps.installed_binaries.contains_key(binary))
            .unwrap_or(false)
    }

    /// Record a package reference observed in `workspace_name`.
    ///
    /// Returns true when the reference is satisfied: the package is declared
    /// by the workspace, declared by an ancestor (non-strict only), a peer
    /// dependency (non-strict only), the workspace's own name, or matches an
    /// ignore pattern. Returns false when the package is truly unknown.
    pub fn maybe_add_referenced(&mut self, workspace_name: &str, package: &str) -> bool {
        if package.is_empty() {
            return false;
        }
        let Some(deps) = self.by_workspace.get_mut(workspace_name) else {
            return false;
        };

        // Workspace self-references are always satisfied, strict or not.
        if deps.package_name == package {
            return true;
        }

        if deps.declares(package) {
            deps.referenced.insert(package.to_string());
            return true;
        }

        if !self.strict && deps.peer_dependencies.contains(package) {
            deps.referenced.insert(package.to_string());
            return true;
        }

        if self.ignore.is_match(package) {
            return true;
        }

        if !self.strict {
            let ancestors = self
                .ancestors
                .get(workspace_name)
                .cloned()
                .unwrap_or_default();
            // Nearest ancestor first.
            for ancestor in ancestors.iter().rev() {
                if let Some(ancestor_deps) = self.by_workspace.get_mut(ancestor) {
                    if ancestor_deps.declares(package) {
                        ancestor_deps.referenced.insert(package.to_string());
                        return true;
                    }
                }
            }
        }

        debug!("Unknown package {package} referenced in workspace {workspace_name}");
        false
    }

    /// Compute declared-minus-referenced for every workspace.
    pub fn settle(&self) -> Vec<SettledWorkspace> {
        self.by_workspace
            .iter()
            .map(|(name, deps)| {
                let unused = |declared: &BTreeSet<String>| {
                    declared
                        .iter()
                        .filter(|package| !deps.referenced.contains(*package))
                        .filter(|package| !self.ignore.is_match(package.as_str()))
                        .cloned()
                        .collect()
                };
                SettledWorkspace {
                    name: name.clone(),
                    manifest_path: deps.manifest_path.clone(),
                    unused_dependencies: unused(&deps.dependencies),
                    unused_dev_dependencies: unused(&deps.dev_dependencies),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::manifest::PackageManifest;
    use std::path::Path;
    use std::sync::Arc;

    fn workspace(name: &str, package_name: &str, ancestors: &[&str], manifest_json: &str) -> Workspace {
        let manifest: PackageManifest = serde_json::from_str(manifest_json).expect("manifest");
        Workspace {
            name: name.to_string(),
            dir: Path::new("/repo").join(name),
            manifest: Arc::new(manifest),
            manifest_path: Path::new("/repo").join(name).join("package.json"),
            package_name: package_name.to_string(),
            ancestors: ancestors.iter().map(|s| s.to_string()).collect(),
            config: Config::default().for_workspace(name),
            enabled: true,
        }
    }

    #[test]
    fn test_declared_reference_recorded() {
        let mut ledger = DependencyLedger::new(&[], false).expect("ledger");
        ledger.add_workspace(&workspace(
            ".",
            "root",
            &[],
            r#"{ "dependencies": { "lodash": "^4" }, "devDependencies": { "vitest": "^1" } }"#,
        ));

        assert!(ledger.maybe_add_referenced(".", "lodash"));
        assert!(!ledger.maybe_add_referenced(".", "unknown-pkg"));

        let settled = ledger.settle();
        assert_eq!(settled.len(), 1);
        assert!(settled[0].unused_dependencies.is_empty());
        assert_eq!(settled[0].unused_dev_dependencies, vec!["vitest"]);
    }

    #[test]
    fn test_self_reference_always_allowed() {
        for strict in [false, true] {
            let mut ledger = DependencyLedger::new(&[], strict).expect("ledger");
            ledger.add_workspace(&workspace(".", "self", &[], r#"{ "name": "self" }"#));
            assert!(ledger.maybe_add_referenced(".", "self"));
        }
    }

    #[test]
    fn test_ancestor_cascade_only_when_not_strict() {
        let manifest = r#"{ "dependencies": { "shared-util": "^1" } }"#;

        let mut relaxed = DependencyLedger::new(&[], false).expect("ledger");
        relaxed.add_workspace(&workspace(".", "root", &[], manifest));
        relaxed.add_workspace(&workspace("packages/a", "@org/a", &["."], "{}"));
        assert!(relaxed.maybe_add_referenced("packages/a", "shared-util"));
        // The reference lands on the declaring ancestor.
        let settled = relaxed.settle();
        let root = settled.iter().find(|ws| ws.name == ".").unwrap();
        assert!(root.unused_dependencies.is_empty());

        let mut strict = DependencyLedger::new(&[], true).expect("ledger");
        strict.add_workspace(&workspace(".", "root", &[], manifest));
        strict.add_workspace(&workspace("packages/a", "@org/a", &["."], "{}"));
        assert!(!strict.maybe_add_referenced("packages/a", "shared-util"));
    }

    #[test]
    fn test_peer_dependencies_only_when_not_strict() {
        let manifest = r#"{ "peerDependencies": { "react": "^18" } }"#;

        let mut relaxed = DependencyLedger::new(&[], false).expect("ledger");
        relaxed.add_workspace(&workspace(".", "lib", &[], manifest));
        assert!(relaxed.maybe_add_referenced(".", "react"));

        let mut strict = DependencyLedger::new(&[], true).expect("ledger");
        strict.add_workspace(&workspace(".", "lib", &[], manifest));
        assert!(!strict.maybe_add_referenced(".", "react"));
    }

    #[test]
    fn test_ignore_patterns() {
        let mut ledger =
            DependencyLedger::new(&["@types/*".to_string()], false).expect("ledger");
        ledger.add_workspace(&workspace(
            ".",
            "root",
            &[],
            r#"{ "devDependencies": { "@types/node": "^20" } }"#,
        ));

        assert!(ledger.maybe_add_referenced(".", "@types/react"));
        let settled = ledger.settle();
        assert!(settled[0].unused_dev_dependencies.is_empty());
    }

    #[test]
    fn test_plugin_peer_merge() {
        let mut ledger = DependencyLedger::new(&[], false).expect("ledger");
        ledger.add_workspace(&workspace(".", "root", &[], "{}"));
        ledger.add_peer_dependencies(".", &["webpack".to_string()]);
        assert!(ledger.maybe_add_referenced(".", "webpack"));
    }
}
