//! Glob expansion against a workspace directory.
//!
//! Built on `ignore::WalkBuilder` so gitignore rules apply, with `globset`
//! doing the pattern matching. Results are sorted and deduplicated so the
//! engine's traversal order is deterministic.

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use miette::{IntoDiagnostic, Result, WrapErr};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::trace;

/// Process-wide cache of compiled glob sets, initialised on first use.
fn glob_cache() -> &'static Mutex<HashMap<String, GlobSet>> {
    static CACHE: OnceLock<Mutex<HashMap<String, GlobSet>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Compile patterns into a single matcher. Brace sets are enabled.
/// Compiled sets are cached for the lifetime of the process.
pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let key = patterns.join("\u{0}");
    if let Some(set) = glob_cache().lock().expect("glob cache poisoned").get(&key) {
        return Ok(set.clone());
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .into_diagnostic()
            .wrap_err_with(|| format!("Invalid glob pattern: {pattern}"))?;
        builder.add(glob);
    }
    let set = builder.build().into_diagnostic()?;
    glob_cache()
        .lock()
        .expect("glob cache poisoned")
        .insert(key, set.clone());
    Ok(set)
}

/// Expand `patterns` under `dir`, honouring `ignore_patterns` and,
/// optionally, gitignore rules. Returns absolute paths, sorted.
pub fn expand_globs(
    dir: &Path,
    patterns: &[String],
    ignore_patterns: &[String],
    gitignore: bool,
) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let include = build_glob_set(patterns)?;
    let exclude = build_glob_set(ignore_patterns)?;

    let walker = WalkBuilder::new(dir)
        .hidden(true)
        .git_ignore(gitignore)
        .git_global(gitignore)
        .git_exclude(gitignore)
        .ignore(gitignore)
        .parents(gitignore)
        .follow_links(false)
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .build();

    let candidates: Vec<PathBuf> = walker
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
        .collect();

    let mut matched: Vec<PathBuf> = candidates
        .par_iter()
        .filter(|path| {
            let Ok(relative) = path.strip_prefix(dir) else {
                return false;
            };
            if !include.is_match(relative) {
                return false;
            }
            if exclude.is_match(relative) {
                trace!("Ignoring {}", path.display());
                return false;
            }
            true
        })
        .cloned()
        .collect();

    matched.sort();
    matched.dedup();
    Ok(matched)
}

/// Find directories under `root` that contain a package manifest and match
/// one of `patterns`. Used for workspace discovery.
pub fn expand_workspace_globs(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let include = build_glob_set(patterns)?;

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .follow_links(false)
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .build();

    let mut dirs = BTreeSet::new();
    for entry in walker.filter_map(|entry| entry.ok()) {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if path == root {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if include.is_match(relative) && path.join("package.json").is_file() {
            dirs.insert(path.to_path_buf());
        }
    }
    Ok(dirs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_expand_globs_matches_and_ignores() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("index.ts"), "").unwrap();
        fs::write(dir.path().join("src/util.ts"), "").unwrap();
        fs::write(dir.path().join("src/util.test.ts"), "").unwrap();
        fs::write(dir.path().join("readme.md"), "").unwrap();

        let files = expand_globs(
            dir.path(),
            &["**/*.ts".to_string()],
            &["**/*.test.ts".to_string()],
            false,
        )
        .expect("expand");

        assert_eq!(files.len(), 2);
        assert!(files.contains(&dir.path().join("index.ts")));
        assert!(files.contains(&dir.path().join("src/util.ts")));
    }

    #[test]
    fn test_expand_globs_brace_sets() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("index.ts"), "").unwrap();
        fs::write(dir.path().join("index.js"), "").unwrap();

        let files = expand_globs(dir.path(), &["index.{ts,tsx}".to_string()], &[], false)
            .expect("expand");
        assert_eq!(files, vec![dir.path().join("index.ts")]);
    }

    #[test]
    fn test_expand_workspace_globs() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(root.path().join("packages/a")).unwrap();
        fs::create_dir_all(root.path().join("packages/b")).unwrap();
        fs::create_dir_all(root.path().join("packages/no-manifest")).unwrap();
        fs::write(root.path().join("packages/a/package.json"), "{}").unwrap();
        fs::write(root.path().join("packages/b/package.json"), "{}").unwrap();

        let dirs = expand_workspace_globs(root.path(), &["packages/*".to_string()])
            .expect("expand");
        assert_eq!(dirs.len(), 2);
    }
}
