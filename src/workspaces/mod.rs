//! Workspace registry.
//!
//! A workspace is a directory with its own manifest participating in the
//! project. The registry owns all of them and answers the lookups the
//! engine needs: by package name (exact), by file path (deepest directory
//! prefix), and ancestry (root first).

use miette::{miette, IntoDiagnostic, Result, WrapErr};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, ResolvedWorkspaceConfig};
use crate::discovery::{build_glob_set, expand_workspace_globs};
use crate::manifest::{self, PackageManifest};

/// One workspace of the project.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Stable name: the directory relative to the project root (`.` for the
    /// root workspace).
    pub name: String,
    /// Absolute directory.
    pub dir: PathBuf,
    /// Parsed manifest.
    pub manifest: Arc<PackageManifest>,
    /// Path to the manifest file, for issue attribution.
    pub manifest_path: PathBuf,
    /// Declared package name; falls back to the directory name.
    pub package_name: String,
    /// Ancestor workspace names, root first. Never contains `name`.
    pub ancestors: Vec<String>,
    /// Effective configuration for this workspace.
    pub config: ResolvedWorkspaceConfig,
    /// Excluded from analysis via `ignore_workspaces`.
    pub enabled: bool,
}

/// All workspaces of the project, ordered ancestors-first.
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    workspaces: Vec<Workspace>,
    by_package: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl WorkspaceRegistry {
    /// Discover workspaces from the root manifest's `workspaces` globs.
    ///
    /// A missing or unparsable root manifest is fatal; a member directory
    /// whose manifest fails to parse is fatal too (the project definition
    /// itself is broken).
    pub fn discover(root: &Path, config: &Config) -> Result<Self> {
        let root_manifest_path = root.join("package.json");
        let root_manifest = manifest::load_cached(&root_manifest_path)
            .into_diagnostic()
            .wrap_err_with(|| {
                format!("Missing or invalid root manifest: {}", root_manifest_path.display())
            })?;

        let mut dirs = vec![root.to_path_buf()];
        if let Some(workspaces) = &root_manifest.workspaces {
            dirs.extend(expand_workspace_globs(root, workspaces.globs())?);
        }

        let ignored = build_glob_set(&config.ignore_workspaces)?;

        let mut registry = Self::default();
        // Parents before children, so ancestor chains resolve as we insert.
        dirs.sort_by_key(|dir| dir.components().count());

        for dir in dirs {
            let manifest_path = dir.join("package.json");
            let ws_manifest = if dir == root {
                Arc::clone(&root_manifest)
            } else {
                manifest::load_cached(&manifest_path)
                    .into_diagnostic()
                    .wrap_err_with(|| {
                        format!("Invalid workspace manifest: {}", manifest_path.display())
                    })?
            };

            let name = if dir == root {
                ".".to_string()
            } else {
                dir.strip_prefix(root)
                    .unwrap_or(&dir)
                    .to_string_lossy()
                    .to_string()
            };

            let package_name = ws_manifest.name.clone().unwrap_or_else(|| {
                dir.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| name.clone())
            });

            let ancestors = registry
                .workspaces
                .iter()
                .filter(|other| dir != other.dir && dir.starts_with(&other.dir))
                .map(|other| other.name.clone())
                .collect();

            let enabled = !ignored.is_match(Path::new(&name));
            if !enabled {
                debug!("Workspace {name} is ignored by configuration");
            }

            registry.add(Workspace {
                config: config.for_workspace(&name),
                name,
                dir,
                manifest: ws_manifest,
                manifest_path,
                package_name,
                ancestors,
                enabled,
            })?;
        }

        debug!("Discovered {} workspaces", registry.len());
        Ok(registry)
    }

    /// Insert a workspace. Package names must be unique across the registry.
    pub fn add(&mut self, workspace: Workspace) -> Result<()> {
        if self.by_package.contains_key(&workspace.package_name) {
            return Err(miette!(
                "Duplicate package name across workspaces: {}",
                workspace.package_name
            ));
        }
        let index = self.workspaces.len();
        self.by_package.insert(workspace.package_name.clone(), index);
        self.by_name.insert(workspace.name.clone(), index);
        self.workspaces.push(workspace);
        Ok(())
    }

    /// Exact package-name lookup.
    pub fn lookup_by_package_name(&self, package_name: &str) -> Option<&Workspace> {
        self.by_package.get(package_name).map(|&i| &self.workspaces[i])
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Workspace> {
        self.by_name.get(name).map(|&i| &self.workspaces[i])
    }

    /// The deepest workspace whose directory is a prefix of `path`.
    pub fn lookup_by_file_path(&self, path: &Path) -> Option<&Workspace> {
        self.workspaces
            .iter()
            .filter(|ws| path.starts_with(&ws.dir))
            .max_by_key(|ws| ws.dir.components().count())
    }

    /// Ancestor names of a workspace, root first.
    pub fn ancestors(&self, name: &str) -> &[String] {
        self.lookup_by_name(name)
            .map(|ws| ws.ancestors.as_slice())
            .unwrap_or(&[])
    }

    /// Workspaces participating in analysis, ancestors-first.
    pub fn enabled_workspaces(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.iter().filter(|ws| ws.enabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Workspace> {
        self.workspaces.iter()
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_manifest(dir: &Path, contents: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("package.json"), contents).unwrap();
    }

    #[test]
    fn test_discover_monorepo() {
        let root = tempfile::tempdir().expect("tempdir");
        write_manifest(
            root.path(),
            r#"{ "name": "root", "workspaces": ["packages/*"] }"#,
        );
        write_manifest(&root.path().join("packages/a"), r#"{ "name": "@org/a" }"#);
        write_manifest(&root.path().join("packages/b"), r#"{ "name": "@org/b" }"#);

        let registry = WorkspaceRegistry::discover(root.path(), &Config::default())
            .expect("discover");

        assert_eq!(registry.len(), 3);
        assert!(registry.lookup_by_package_name("@org/a").is_some());
        assert!(registry.lookup_by_package_name("nope").is_none());

        let a = registry.lookup_by_package_name("@org/a").unwrap();
        assert_eq!(a.ancestors, vec![".".to_string()]);

        let file = root.path().join("packages/a/src/index.ts");
        assert_eq!(registry.lookup_by_file_path(&file).unwrap().name, "packages/a");
        assert_eq!(registry.lookup_by_file_path(root.path()).unwrap().name, ".");
    }

    #[test]
    fn test_missing_root_manifest_is_fatal() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(WorkspaceRegistry::discover(root.path(), &Config::default()).is_err());
    }

    #[test]
    fn test_duplicate_package_name_rejected() {
        let mut registry = WorkspaceRegistry::default();
        let manifest = Arc::new(PackageManifest::default());
        for (i, name) in ["dup", "dup"].iter().enumerate() {
            let result = registry.add(Workspace {
                name: format!("pkg{i}"),
                dir: PathBuf::from(format!("/repo/pkg{i}")),
                manifest: Arc::clone(&manifest),
                manifest_path: PathBuf::from(format!("/repo/pkg{i}/package.json")),
                package_name: name.to_string(),
                ancestors: Vec::new(),
                config: Config::default().for_workspace("."),
                enabled: true,
            });
            if i == 0 {
                assert!(result.is_ok());
            } else {
                assert!(result.is_err());
            }
        }
    }

    #[test]
    fn test_ignored_workspace_disabled() {
        let root = tempfile::tempdir().expect("tempdir");
        write_manifest(
            root.path(),
            r#"{ "name": "root", "workspaces": ["apps/*"] }"#,
        );
        write_manifest(&root.path().join("apps/site"), r#"{ "name": "site" }"#);

        let config = Config {
            ignore_workspaces: vec!["apps/*".to_string()],
            ..Config::default()
        };
        let registry = WorkspaceRegistry::discover(root.path(), &config).expect("discover");
        let enabled: Vec<_> = registry.enabled_workspaces().map(|ws| ws.name.clone()).collect();
        assert_eq!(enabled, vec![".".to_string()]);
        // Still present for path lookups.
        assert!(registry.lookup_by_package_name("site").is_some());
    }
}
