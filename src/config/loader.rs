use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::manifest::PackageManifest;

/// Default entry patterns, production-scoped (`!` suffix).
pub const DEFAULT_ENTRY: &[&str] = &[
    "index.{js,mjs,cjs,jsx,ts,tsx,mts,cts}!",
    "src/index.{js,mjs,cjs,jsx,ts,tsx,mts,cts}!",
];

/// Default project patterns, production-scoped.
pub const DEFAULT_PROJECT: &[&str] = &["**/*.{js,mjs,cjs,jsx,ts,tsx,mts,cts}!"];

/// Configuration for a deadwood run.
///
/// Patterns ending in `!` are production-scoped: in production mode only
/// those are used for seeding; otherwise the marker is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Entry glob patterns applied to every workspace without an override.
    pub entry: Vec<String>,

    /// Project glob patterns (dead-file candidates).
    pub project: Vec<String>,

    /// File patterns excluded from analysis entirely.
    pub ignore: Vec<String>,

    /// Package-name patterns never reported as unlisted or unused.
    pub ignore_dependencies: Vec<String>,

    /// Binary names never reported.
    pub ignore_binaries: Vec<String>,

    /// Workspace names excluded from analysis.
    pub ignore_workspaces: Vec<String>,

    /// Issue kinds to report (empty = all).
    pub include: Vec<String>,

    /// Issue kinds to suppress.
    pub exclude: Vec<String>,

    /// Per-workspace overrides, keyed by workspace name.
    pub workspaces: BTreeMap<String, WorkspaceConfig>,
}

/// Per-workspace configuration block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub entry: Vec<String>,
    pub project: Vec<String>,
    pub ignore: Vec<String>,
    pub ignore_dependencies: Vec<String>,
}

/// A workspace's configuration after defaults are applied.
#[derive(Debug, Clone)]
pub struct ResolvedWorkspaceConfig {
    pub entry: Vec<String>,
    pub project: Vec<String>,
    pub ignore: Vec<String>,
    pub ignore_dependencies: Vec<String>,
}

impl Config {
    /// Load configuration from a file (YAML or TOML).
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try default config locations, then the manifest's own section.
    pub fn from_default_locations(project_root: &Path, manifest: &PackageManifest) -> Result<Self> {
        let default_names = [
            ".deadwood.yml",
            ".deadwood.yaml",
            ".deadwood.toml",
            "deadwood.yml",
            "deadwood.yaml",
            "deadwood.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        if let Some(section) = &manifest.deadwood {
            return serde_json::from_value(section.clone())
                .into_diagnostic()
                .wrap_err("Failed to parse deadwood section of package manifest");
        }

        Ok(Self::default())
    }

    /// Resolve the effective configuration for one workspace:
    /// workspace override, else the global patterns, else the defaults.
    pub fn for_workspace(&self, name: &str) -> ResolvedWorkspaceConfig {
        let ws = self.workspaces.get(name);

        let pick = |specific: Option<&Vec<String>>, global: &Vec<String>, defaults: &[&str]| {
            match specific {
                Some(patterns) if !patterns.is_empty() => patterns.clone(),
                _ if !global.is_empty() => global.clone(),
                _ => defaults.iter().map(|s| s.to_string()).collect(),
            }
        };

        ResolvedWorkspaceConfig {
            entry: pick(ws.map(|w| &w.entry), &self.entry, DEFAULT_ENTRY),
            project: pick(ws.map(|w| &w.project), &self.project, DEFAULT_PROJECT),
            ignore: {
                let mut ignore = self.ignore.clone();
                if let Some(ws) = ws {
                    ignore.extend(ws.ignore.iter().cloned());
                }
                ignore
            },
            ignore_dependencies: {
                let mut deps = self.ignore_dependencies.clone();
                if let Some(ws) = ws {
                    deps.extend(ws.ignore_dependencies.iter().cloned());
                }
                deps
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolution_uses_builtin_patterns() {
        let config = Config::default();
        let resolved = config.for_workspace("packages/a");
        assert_eq!(resolved.entry.len(), DEFAULT_ENTRY.len());
        assert_eq!(resolved.project.len(), DEFAULT_PROJECT.len());
    }

    #[test]
    fn test_workspace_override_wins() {
        let mut config = Config {
            entry: vec!["main.ts!".to_string()],
            ..Config::default()
        };
        config.workspaces.insert(
            "packages/cli".to_string(),
            WorkspaceConfig {
                entry: vec!["cli.ts!".to_string()],
                ..WorkspaceConfig::default()
            },
        );

        assert_eq!(config.for_workspace("packages/cli").entry, vec!["cli.ts!"]);
        assert_eq!(config.for_workspace("packages/lib").entry, vec!["main.ts!"]);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = "entry:\n  - index.ts!\nignore_dependencies:\n  - '@types/*'\n";
        let config: Config = serde_yaml::from_str(yaml).expect("yaml config");
        assert_eq!(config.entry, vec!["index.ts!"]);
        assert_eq!(config.ignore_dependencies, vec!["@types/*"]);
    }
}
