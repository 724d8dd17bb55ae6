//! Package manifest (`package.json`) model and process-wide cache.
//!
//! The engine consults `name`, `main`, `module`, `bin`, `exports` and the
//! four dependency tables. Everything else is carried opaquely.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

use crate::specifier::probe_module_file;

/// Manifest errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// The `bin` field: either a single path or a name → path map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    Path(String),
    Map(BTreeMap<String, String>),
}

/// The `workspaces` field: a glob array or `{ "packages": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    Globs(Vec<String>),
    Detailed { packages: Vec<String> },
}

impl WorkspacesField {
    pub fn globs(&self) -> &[String] {
        match self {
            WorkspacesField::Globs(globs) => globs,
            WorkspacesField::Detailed { packages } => packages,
        }
    }
}

/// Parsed `package.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: Option<String>,
    pub main: Option<String>,
    pub module: Option<String>,
    pub bin: Option<BinField>,
    pub exports: Option<serde_json::Value>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub peer_dependencies: BTreeMap<String, String>,
    pub optional_dependencies: BTreeMap<String, String>,
    pub workspaces: Option<WorkspacesField>,
    /// The tool's own configuration section.
    pub deadwood: Option<serde_json::Value>,
}

impl PackageManifest {
    /// Parse a manifest from disk.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Entry file candidates declared by the manifest itself:
    /// `main`, `module`, every `bin` target, and every `exports` target.
    pub fn entry_files(&self) -> Vec<String> {
        let mut entries = Vec::new();
        if let Some(main) = &self.main {
            entries.push(main.clone());
        }
        if let Some(module) = &self.module {
            entries.push(module.clone());
        }
        match &self.bin {
            Some(BinField::Path(path)) => entries.push(path.clone()),
            Some(BinField::Map(map)) => entries.extend(map.values().cloned()),
            None => {}
        }
        if let Some(exports) = &self.exports {
            collect_export_targets(exports, &mut entries);
        }
        entries
    }

    /// Resolve a subpath import into this package (`pkg/deep` → `deep`)
    /// against the manifest's export rules, relative to `dir`.
    ///
    /// Resolution order: the `exports` map, then the raw subpath as a file
    /// inside the package, then `module`/`main` for the bare package root.
    pub fn resolve_subpath(&self, dir: &Path, subpath: Option<&str>) -> Option<PathBuf> {
        let key = match subpath {
            Some(sub) => format!("./{sub}"),
            None => ".".to_string(),
        };
        if let Some(exports) = &self.exports {
            if let Some(target) = resolve_export_value(exports, &key) {
                if let Some(file) = probe_module_file(&dir.join(target)) {
                    return Some(file);
                }
            }
        }
        match subpath {
            Some(sub) => probe_module_file(&dir.join(sub)),
            None => self
                .module
                .as_deref()
                .or(self.main.as_deref())
                .and_then(|entry| probe_module_file(&dir.join(entry)))
                .or_else(|| probe_module_file(dir)),
        }
    }
}

/// Resolve an `exports` value for a subpath key.
///
/// Handles the string form, the subpath-keyed object form, and conditional
/// objects (preferring `import`, then `default`, then `require`).
fn resolve_export_value(exports: &serde_json::Value, key: &str) -> Option<String> {
    match exports {
        serde_json::Value::String(target) => {
            if key == "." {
                Some(target.clone())
            } else {
                None
            }
        }
        serde_json::Value::Object(map) => {
            if map.keys().any(|k| k.starts_with('.')) {
                let value = map.get(key)?;
                resolve_conditional(value)
            } else if key == "." {
                resolve_conditional(exports)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn resolve_conditional(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(target) => Some(target.clone()),
        serde_json::Value::Object(map) => {
            for condition in ["import", "default", "require"] {
                if let Some(inner) = map.get(condition) {
                    if let Some(target) = resolve_conditional(inner) {
                        return Some(target);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Collect every string target reachable in an `exports` value.
fn collect_export_targets(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(target) => out.push(target.clone()),
        serde_json::Value::Object(map) => {
            for inner in map.values() {
                collect_export_targets(inner, out);
            }
        }
        _ => {}
    }
}

/// Process-wide manifest cache, initialised on first use.
/// The filesystem is read-only during a run, so entries never invalidate.
fn cache() -> &'static Mutex<HashMap<PathBuf, Arc<PackageManifest>>> {
    static CACHE: OnceLock<Mutex<HashMap<PathBuf, Arc<PackageManifest>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Load a manifest through the process-wide cache.
pub fn load_cached(path: &Path) -> Result<Arc<PackageManifest>, ManifestError> {
    let mut guard = cache().lock().expect("manifest cache poisoned");
    if let Some(manifest) = guard.get(path) {
        return Ok(Arc::clone(manifest));
    }
    let manifest = Arc::new(PackageManifest::from_path(path)?);
    guard.insert(path.to_path_buf(), Arc::clone(&manifest));
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> PackageManifest {
        serde_json::from_str(json).expect("manifest should parse")
    }

    #[test]
    fn test_entry_files() {
        let manifest = parse(
            r#"{
                "name": "pkg",
                "main": "dist/index.js",
                "module": "dist/index.mjs",
                "bin": { "pkg": "bin/cli.js" },
                "exports": { ".": { "import": "dist/index.mjs" }, "./sub": "dist/sub.js" }
            }"#,
        );
        let entries = manifest.entry_files();
        assert!(entries.contains(&"dist/index.js".to_string()));
        assert!(entries.contains(&"dist/index.mjs".to_string()));
        assert!(entries.contains(&"bin/cli.js".to_string()));
        assert!(entries.contains(&"dist/sub.js".to_string()));
    }

    #[test]
    fn test_bin_string_form() {
        let manifest = parse(r#"{ "bin": "cli.js" }"#);
        assert_eq!(manifest.entry_files(), vec!["cli.js".to_string()]);
    }

    #[test]
    fn test_resolve_export_value() {
        let exports: serde_json::Value =
            serde_json::from_str(r#"{ ".": "./index.js", "./deep": { "import": "./deep.mjs" } }"#)
                .unwrap();
        assert_eq!(resolve_export_value(&exports, "."), Some("./index.js".into()));
        assert_eq!(resolve_export_value(&exports, "./deep"), Some("./deep.mjs".into()));
        assert_eq!(resolve_export_value(&exports, "./missing"), None);
    }

    #[test]
    fn test_workspaces_field_forms() {
        let globs = parse(r#"{ "workspaces": ["packages/*"] }"#);
        assert_eq!(globs.workspaces.unwrap().globs(), ["packages/*".to_string()]);

        let detailed = parse(r#"{ "workspaces": { "packages": ["apps/*"] } }"#);
        assert_eq!(detailed.workspaces.unwrap().globs(), ["apps/*".to_string()]);
    }
}
