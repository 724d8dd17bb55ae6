//! Issue taxonomy, collector, and counters.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// The wire-visible issue kinds, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    Files,
    Duplicates,
    Exports,
    NsExports,
    Types,
    NsTypes,
    EnumMembers,
    ClassMembers,
    Unlisted,
    Unresolved,
    Dependencies,
    DevDependencies,
}

impl IssueKind {
    pub const ALL: [IssueKind; 12] = [
        IssueKind::Files,
        IssueKind::Duplicates,
        IssueKind::Exports,
        IssueKind::NsExports,
        IssueKind::Types,
        IssueKind::NsTypes,
        IssueKind::EnumMembers,
        IssueKind::ClassMembers,
        IssueKind::Unlisted,
        IssueKind::Unresolved,
        IssueKind::Dependencies,
        IssueKind::DevDependencies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Files => "files",
            IssueKind::Duplicates => "duplicates",
            IssueKind::Exports => "exports",
            IssueKind::NsExports => "nsExports",
            IssueKind::Types => "types",
            IssueKind::NsTypes => "nsTypes",
            IssueKind::EnumMembers => "enumMembers",
            IssueKind::ClassMembers => "classMembers",
            IssueKind::Unlisted => "unlisted",
            IssueKind::Unresolved => "unresolved",
            IssueKind::Dependencies => "dependencies",
            IssueKind::DevDependencies => "devDependencies",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }

    /// Human heading for the terminal reporter.
    pub fn title(&self) -> &'static str {
        match self {
            IssueKind::Files => "Unused files",
            IssueKind::Duplicates => "Duplicate exports",
            IssueKind::Exports => "Unused exports",
            IssueKind::NsExports => "Unused exports in namespaces",
            IssueKind::Types => "Unused exported types",
            IssueKind::NsTypes => "Unused exported types in namespaces",
            IssueKind::EnumMembers => "Unused exported enum members",
            IssueKind::ClassMembers => "Unused exported class members",
            IssueKind::Unlisted => "Unlisted dependencies",
            IssueKind::Unresolved => "Unresolved imports",
            IssueKind::Dependencies => "Unused dependencies",
            IssueKind::DevDependencies => "Unused devDependencies",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub file_path: PathBuf,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_symbol: Option<String>,
}

impl Issue {
    pub fn new(kind: IssueKind, file_path: PathBuf, symbol: impl Into<String>) -> Self {
        Self {
            kind,
            file_path,
            symbol: symbol.into(),
            symbols: None,
            symbol_type: None,
            parent_symbol: None,
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn with_symbol_type(mut self, symbol_type: impl Into<String>) -> Self {
        self.symbol_type = Some(symbol_type.into());
        self
    }

    pub fn with_parent_symbol(mut self, parent: impl Into<String>) -> Self {
        self.parent_symbol = Some(parent.into());
        self
    }
}

/// Accumulates findings by kind, with per-kind counters.
#[derive(Debug, Default)]
pub struct IssueCollector {
    by_kind: BTreeMap<IssueKind, Vec<Issue>>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: Issue) {
        self.by_kind.entry(issue.kind).or_default().push(issue);
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.by_kind.get(&kind).map(|v| v.len()).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.by_kind.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(|v| v.is_empty())
    }

    pub fn of_kind(&self, kind: IssueKind) -> &[Issue] {
        self.by_kind.get(&kind).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.by_kind.values().flatten()
    }

    /// Sort issues within each kind by file and symbol for stable output.
    pub fn sort(&mut self) {
        for issues in self.by_kind.values_mut() {
            issues.sort_by(|a, b| {
                a.file_path
                    .cmp(&b.file_path)
                    .then_with(|| a.symbol.cmp(&b.symbol))
            });
        }
    }
}

/// File counters reported alongside the issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Files actually analysed.
    pub processed: usize,
    /// Processed plus unreferenced project files.
    pub total: usize,
}

/// Which issue kinds the reporter should surface.
#[derive(Debug, Clone)]
pub struct ReportSelectors {
    enabled: BTreeSet<IssueKind>,
}

impl Default for ReportSelectors {
    fn default() -> Self {
        Self {
            enabled: IssueKind::ALL.into_iter().collect(),
        }
    }
}

impl ReportSelectors {
    /// Build from config: `include` narrows to the named kinds, `exclude`
    /// removes kinds from whatever is enabled. Unknown names are ignored.
    pub fn from_patterns(include: &[String], exclude: &[String]) -> Self {
        let mut enabled: BTreeSet<IssueKind> = if include.is_empty() {
            IssueKind::ALL.into_iter().collect()
        } else {
            include.iter().filter_map(|s| IssueKind::parse(s)).collect()
        };
        for name in exclude {
            if let Some(kind) = IssueKind::parse(name) {
                enabled.remove(&kind);
            }
        }
        Self { enabled }
    }

    pub fn is_enabled(&self, kind: IssueKind) -> bool {
        self.enabled.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = IssueKind> + '_ {
        self.enabled.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in IssueKind::ALL {
            assert_eq!(IssueKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(IssueKind::parse("bogus"), None);
    }

    #[test]
    fn test_collector_counts() {
        let mut collector = IssueCollector::new();
        collector.add(Issue::new(IssueKind::Files, "b.ts".into(), "b.ts"));
        collector.add(Issue::new(IssueKind::Files, "a.ts".into(), "a.ts"));
        collector.add(Issue::new(IssueKind::Exports, "a.ts".into(), "foo"));
        assert_eq!(collector.count(IssueKind::Files), 2);
        assert_eq!(collector.total(), 3);

        collector.sort();
        let files = collector.of_kind(IssueKind::Files);
        assert_eq!(files[0].symbol, "a.ts");
    }

    #[test]
    fn test_selectors_include_exclude() {
        let selectors = ReportSelectors::from_patterns(
            &["files".to_string(), "exports".to_string()],
            &["exports".to_string()],
        );
        assert!(selectors.is_enabled(IssueKind::Files));
        assert!(!selectors.is_enabled(IssueKind::Exports));
        assert!(!selectors.is_enabled(IssueKind::Unlisted));
    }
}
