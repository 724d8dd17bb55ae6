//! Compiler-options groups.
//!
//! Workspaces compiling with the same options share one principal, so the
//! options carry a canonical fingerprint that is stable across textually
//! different but semantically identical configs.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::manifest::ManifestError;
use crate::specifier::{normalize, probe_module_file};

/// The subset of compiler configuration the resolver consults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Base directory for non-relative path resolution.
    pub base_url: Option<PathBuf>,
    /// Path alias patterns (`@app/*` → [`src/*`]), sorted by key.
    pub paths: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawTsConfig {
    extends: Option<String>,
    compiler_options: RawCompilerOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawCompilerOptions {
    base_url: Option<String>,
    paths: BTreeMap<String, Vec<String>>,
}

impl CompilerOptions {
    /// Load from a `tsconfig`-style JSON file. Comments are tolerated.
    /// `extends` is followed one level; the extending file wins per field.
    pub fn from_config_file(path: &Path) -> Result<Self, ManifestError> {
        let raw = read_raw(path)?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        let mut options = if let Some(parent) = &raw.extends {
            let parent_path = normalize(&dir.join(parent));
            match read_raw(&parent_path) {
                Ok(parent_raw) => {
                    let parent_dir = parent_path.parent().unwrap_or_else(|| Path::new(""));
                    Self::from_raw(parent_raw, parent_dir)
                }
                Err(err) => {
                    debug!("Ignoring unreadable extended config {}: {err}", parent_path.display());
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        let own = Self::from_raw(raw, dir);
        if own.base_url.is_some() {
            options.base_url = own.base_url;
        }
        if !own.paths.is_empty() {
            options.paths = own.paths;
        }
        Ok(options)
    }

    fn from_raw(raw: RawTsConfig, dir: &Path) -> Self {
        Self {
            base_url: raw
                .compiler_options
                .base_url
                .map(|base| normalize(&dir.join(base))),
            paths: raw.compiler_options.paths,
        }
    }

    /// Rewrite a bare specifier through the path aliases, probing candidates
    /// on disk. Returns the first target file that exists.
    pub fn rewrite_alias(&self, specifier: &str) -> Option<PathBuf> {
        let base = self.base_url.as_deref()?;
        for (pattern, targets) in &self.paths {
            let captured = match_alias(pattern, specifier)?;
            for target in targets {
                let candidate = base.join(target.replace('*', captured));
                if let Some(file) = probe_module_file(&normalize(&candidate)) {
                    return Some(file);
                }
            }
        }
        None
    }

    /// Canonical fingerprint: identical options always fingerprint equal,
    /// independent of the config file they were read from.
    pub fn fingerprint(&self) -> String {
        let mut parts = Vec::new();
        parts.push(format!(
            "baseUrl={}",
            self.base_url
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        ));
        for (pattern, targets) in &self.paths {
            parts.push(format!("path:{pattern}={}", targets.join(",")));
        }
        parts.join(";")
    }
}

/// Match a specifier against an alias pattern with at most one `*`.
/// Returns the captured wildcard text (empty for exact patterns).
fn match_alias<'a>(pattern: &str, specifier: &'a str) -> Option<&'a str> {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            let rest = specifier.strip_prefix(prefix)?;
            rest.strip_suffix(suffix)
        }
        None => {
            if pattern == specifier {
                Some("")
            } else {
                None
            }
        }
    }
}

fn read_raw(path: &Path) -> Result<RawTsConfig, ManifestError> {
    let contents = std::fs::read_to_string(path)?;
    let stripped = strip_json_comments(&contents);
    Ok(serde_json::from_str(&stripped)?)
}

/// Blank out `//` and `/* */` comments, preserving offsets and strings.
fn strip_json_comments(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    let mut in_string = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'"' {
                in_string = false;
            }
            i += 1;
        } else if b == b'"' {
            in_string = true;
            i += 1;
        } else if b == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            while i < bytes.len() && bytes[i] != b'\n' {
                out[i] = b' ';
                i += 1;
            }
        } else if b == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                if out[i] != b'\n' {
                    out[i] = b' ';
                }
                i += 1;
            }
            if i + 1 < bytes.len() {
                out[i] = b' ';
                out[i + 1] = b' ';
                i += 2;
            } else {
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_canonical() {
        let mut a = CompilerOptions::default();
        a.paths.insert("@app/*".into(), vec!["src/*".into()]);
        a.paths.insert("@lib/*".into(), vec!["lib/*".into()]);

        let mut b = CompilerOptions::default();
        // Insertion order differs; BTreeMap canonicalises it.
        b.paths.insert("@lib/*".into(), vec!["lib/*".into()]);
        b.paths.insert("@app/*".into(), vec!["src/*".into()]);

        assert_eq!(a.fingerprint(), b.fingerprint());

        b.base_url = Some(PathBuf::from("/repo"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_match_alias() {
        assert_eq!(match_alias("@app/*", "@app/util/x"), Some("util/x"));
        assert_eq!(match_alias("@app/*", "@lib/x"), None);
        assert_eq!(match_alias("exact", "exact"), Some(""));
        assert_eq!(match_alias("exact", "other"), None);
    }

    #[test]
    fn test_strip_json_comments() {
        let input = "{\n  // comment\n  \"a\": \"http://x\", /* block */ \"b\": 1\n}";
        let stripped = strip_json_comments(input);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["a"], "http://x");
        assert_eq!(value["b"], 1);
    }
}
