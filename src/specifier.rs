//! Module specifier classification and path utilities.
//!
//! Classification is a pure function of the specifier string; it never
//! touches the filesystem. Disk probing lives in separate helpers so the
//! classifier stays order-independent and trivially testable.

use std::path::{Component, Path, PathBuf};

/// Extensions probed when a specifier omits one, in resolution order.
pub const MODULE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// The four specifier classes the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecifierKind {
    /// Relative (`./x`, `../x`) or absolute path outside `node_modules`.
    Internal,
    /// Absolute path with a `node_modules` segment.
    NodeModules,
    /// Bare package specifier (`pkg`, `@scope/pkg`, optionally with subpath).
    Bare,
    /// Nothing we can make sense of.
    Unresolvable,
}

/// Classify a module specifier by its string shape alone.
pub fn classify(specifier: &str) -> SpecifierKind {
    if specifier.is_empty() {
        return SpecifierKind::Unresolvable;
    }
    if specifier.starts_with('.') {
        return SpecifierKind::Internal;
    }
    if Path::new(specifier).is_absolute() {
        if specifier.split('/').any(|segment| segment == "node_modules") {
            return SpecifierKind::NodeModules;
        }
        return SpecifierKind::Internal;
    }
    if package_name(specifier).is_some() {
        return SpecifierKind::Bare;
    }
    SpecifierKind::Unresolvable
}

/// Derive the package name from a bare specifier.
///
/// Scoped packages keep their scope segment (`@scope/pkg/deep` → `@scope/pkg`).
/// Returns `None` when the specifier cannot name a package.
pub fn package_name(specifier: &str) -> Option<String> {
    if specifier.is_empty() {
        return None;
    }
    let mut segments = specifier.split('/');
    let first = segments.next()?;
    if first.is_empty() {
        return None;
    }
    if first.starts_with('@') {
        let second = segments.next()?;
        if first.len() == 1 || second.is_empty() {
            return None;
        }
        return Some(format!("{first}/{second}"));
    }
    let leading = first.chars().next()?;
    if !leading.is_alphanumeric() && leading != '_' {
        return None;
    }
    Some(first.to_string())
}

/// The subpath after the package name, if any (`@scope/pkg/deep/x` → `deep/x`).
pub fn package_subpath(specifier: &str) -> Option<&str> {
    let name = package_name(specifier)?;
    let rest = specifier.strip_prefix(name.as_str())?;
    let rest = rest.strip_prefix('/')?;
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Package name from a `node_modules` path (`.../node_modules/@s/p/x.js` → `@s/p`).
pub fn package_name_from_module_path(path: &Path) -> Option<String> {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let idx = parts.iter().rposition(|p| *p == "node_modules")?;
    let first = parts.get(idx + 1)?;
    if first.starts_with('@') {
        let second = parts.get(idx + 2)?;
        Some(format!("{first}/{second}"))
    } else {
        Some((*first).to_string())
    }
}

/// Lexically normalise a path: resolve `.` and `..` without touching disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve a relative specifier against the directory of the importing file.
pub fn resolve_relative(containing_file: &Path, specifier: &str) -> PathBuf {
    let dir = containing_file.parent().unwrap_or_else(|| Path::new(""));
    normalize(&dir.join(specifier))
}

/// Probe a resolved module path on disk: as-is, with known extensions,
/// then as a directory with an index file. Returns the first file that exists.
pub fn probe_module_file(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    if candidate.extension().is_none() {
        for ext in MODULE_EXTENSIONS {
            let with_ext = candidate.with_extension(ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
    }
    if candidate.is_dir() {
        for ext in MODULE_EXTENSIONS {
            let index = candidate.join(format!("index.{ext}"));
            if index.is_file() {
                return Some(index);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_relative() {
        assert_eq!(classify("./lib"), SpecifierKind::Internal);
        assert_eq!(classify("../lib/util"), SpecifierKind::Internal);
        assert_eq!(classify("."), SpecifierKind::Internal);
    }

    #[test]
    fn test_classify_absolute() {
        assert_eq!(classify("/repo/src/a.ts"), SpecifierKind::Internal);
        assert_eq!(
            classify("/repo/node_modules/pkg/index.js"),
            SpecifierKind::NodeModules
        );
    }

    #[test]
    fn test_classify_bare() {
        assert_eq!(classify("react"), SpecifierKind::Bare);
        assert_eq!(classify("@scope/pkg"), SpecifierKind::Bare);
        assert_eq!(classify("@scope/pkg/deep"), SpecifierKind::Bare);
    }

    #[test]
    fn test_classify_unresolvable() {
        assert_eq!(classify(""), SpecifierKind::Unresolvable);
        assert_eq!(classify("@"), SpecifierKind::Unresolvable);
        assert_eq!(classify("@scope"), SpecifierKind::Unresolvable);
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("react"), Some("react".to_string()));
        assert_eq!(package_name("react/jsx-runtime"), Some("react".to_string()));
        assert_eq!(package_name("@a/b"), Some("@a/b".to_string()));
        assert_eq!(package_name("@a/b/deep.ts"), Some("@a/b".to_string()));
        assert_eq!(package_name("@a"), None);
        assert_eq!(package_name(""), None);
    }

    #[test]
    fn test_package_subpath() {
        assert_eq!(package_subpath("react"), None);
        assert_eq!(package_subpath("react/jsx-runtime"), Some("jsx-runtime"));
        assert_eq!(package_subpath("@a/b/deep.ts"), Some("deep.ts"));
        assert_eq!(package_subpath("@a/b/"), None);
    }

    #[test]
    fn test_package_name_from_module_path() {
        assert_eq!(
            package_name_from_module_path(Path::new("/r/node_modules/lodash/map.js")),
            Some("lodash".to_string())
        );
        assert_eq!(
            package_name_from_module_path(Path::new("/r/node_modules/@s/p/x.js")),
            Some("@s/p".to_string())
        );
        assert_eq!(package_name_from_module_path(Path::new("/r/src/x.js")), None);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("a/./b")), PathBuf::from("a/b"));
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative(Path::new("/repo/src/a.ts"), "../lib/b"),
            PathBuf::from("/repo/lib/b")
        );
    }
}
