//! Analysis principals.
//!
//! A principal is an analysis context bound to one compiler-options group.
//! It owns the entry and project path sets, the per-file records its parser
//! produced, and a file graph over which reachability is a DFS from the
//! entry nodes. Workspaces with compatible options share a principal, so
//! their import graphs connect naturally.

mod factory;

pub use factory::{PrincipalFactory, PrincipalId};

use miette::Result;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::parser::{ExportItem, ImportItems, ParsedModule, SourceParser, WILDCARD};

/// Everything one analysed file contributed.
#[derive(Debug, Default)]
pub struct FileRecord {
    pub exports: BTreeMap<String, ExportItem>,
    pub imports: BTreeMap<PathBuf, ImportItems>,
    pub duplicate_exports: Vec<Vec<String>>,
}

/// All imports pointing at one target file, merged across importers.
#[derive(Debug, Default)]
pub struct AggregatedImports {
    /// Identifiers consumed from the target, across all importers.
    pub identifiers: BTreeSet<String>,
    pub importers: BTreeSet<PathBuf>,
    /// Files that re-export through the target (`export ... from`).
    pub re_exported_by: BTreeSet<PathBuf>,
    /// Files star-importing or star-re-exporting the target.
    pub star_imported_by: BTreeSet<PathBuf>,
}

impl AggregatedImports {
    /// The whole module object was consumed somewhere.
    pub fn has_wildcard(&self) -> bool {
        self.identifiers.contains(WILDCARD)
    }
}

pub struct Principal {
    fingerprint: String,
    parser: Box<dyn SourceParser>,
    entry_paths: BTreeSet<PathBuf>,
    project_paths: BTreeSet<PathBuf>,
    skip_exports: BTreeSet<PathBuf>,
    records: HashMap<PathBuf, FileRecord>,
    imports_by_target: HashMap<PathBuf, AggregatedImports>,
    graph: DiGraph<PathBuf, ()>,
    node_map: HashMap<PathBuf, NodeIndex>,
}

impl Principal {
    pub fn new(fingerprint: String, parser: Box<dyn SourceParser>) -> Self {
        Self {
            fingerprint,
            parser,
            entry_paths: BTreeSet::new(),
            project_paths: BTreeSet::new(),
            skip_exports: BTreeSet::new(),
            records: HashMap::new(),
            imports_by_target: HashMap::new(),
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Add a reachability root. Returns true when the path is new.
    /// The entry set is append-only; convergence detection depends on it.
    pub fn add_entry_path(&mut self, path: PathBuf) -> bool {
        self.entry_paths.insert(path)
    }

    /// Add a dead-file candidate.
    pub fn add_project_path(&mut self, path: PathBuf) -> bool {
        self.project_paths.insert(path)
    }

    /// Exclude a file from unused-export reconciliation even if imported.
    pub fn skip_exports_analysis_for(&mut self, path: PathBuf) {
        self.skip_exports.insert(path);
    }

    pub fn entry_count(&self) -> usize {
        self.entry_paths.len()
    }

    pub fn is_entry(&self, path: &Path) -> bool {
        self.entry_paths.contains(path)
    }

    pub fn is_project_path(&self, path: &Path) -> bool {
        self.project_paths.contains(path)
    }

    pub fn should_skip_exports(&self, path: &Path) -> bool {
        self.skip_exports.contains(path)
    }

    pub fn record(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn analyzed_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.records.keys()
    }

    pub fn imports_of(&self, target: &Path) -> Option<&AggregatedImports> {
        self.imports_by_target.get(target)
    }

    /// Parse one file and fold its imports into the graph and the
    /// aggregated import table.
    pub fn analyze_source_file(&mut self, path: &Path) -> Result<ParsedModule> {
        let parsed = self.parser.parse(path)?;

        for (target, items) in &parsed.imports.internal {
            self.add_edge(path, target);
            let aggregated = self.imports_by_target.entry(target.clone()).or_default();
            aggregated.importers.insert(path.to_path_buf());
            aggregated.identifiers.extend(items.identifiers.iter().cloned());
            if items.is_re_exported {
                aggregated.re_exported_by.insert(path.to_path_buf());
            }
            if items.is_star {
                aggregated.star_imported_by.insert(path.to_path_buf());
            }
        }

        self.records.insert(
            path.to_path_buf(),
            FileRecord {
                exports: parsed.exports.clone(),
                imports: parsed.imports.internal.clone(),
                duplicate_exports: parsed.duplicate_exports.clone(),
            },
        );

        Ok(parsed)
    }

    fn node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&index) = self.node_map.get(path) {
            return index;
        }
        let index = self.graph.add_node(path.to_path_buf());
        self.node_map.insert(path.to_path_buf(), index);
        index
    }

    fn add_edge(&mut self, from: &Path, to: &Path) {
        let from_idx = self.node(from);
        let to_idx = self.node(to);
        self.graph.update_edge(from_idx, to_idx, ());
    }

    /// The transitive closure of files reachable from the entry paths via
    /// already-analysed imports. Unanalysed targets still count as
    /// reachable; they are what drives the next fixed-point round.
    pub fn get_used_resolved_files(&self) -> Vec<PathBuf> {
        let mut reachable: BTreeSet<PathBuf> = self.entry_paths.iter().cloned().collect();
        for entry in &self.entry_paths {
            let Some(&start) = self.node_map.get(entry) else {
                continue;
            };
            let mut dfs = Dfs::new(&self.graph, start);
            while let Some(node) = dfs.next(&self.graph) {
                if let Some(path) = self.graph.node_weight(node) {
                    reachable.insert(path.clone());
                }
            }
        }
        reachable.into_iter().collect()
    }

    /// Project paths nothing reaches.
    pub fn get_unreferenced_files(&self) -> Vec<PathBuf> {
        let used: BTreeSet<PathBuf> = self.get_used_resolved_files().into_iter().collect();
        self.project_paths
            .iter()
            .filter(|path| !used.contains(*path))
            .cloned()
            .collect()
    }

    /// Members of exported symbol `parent` (declared in `file`) that no
    /// analysed file references.
    pub fn find_unused_members(&self, file: &Path, parent: &str, members: &[String]) -> Vec<String> {
        let mut files: Vec<PathBuf> = self.records.keys().cloned().collect();
        files.sort();
        // The declaring file participates: internal uses count as usage.
        if !self.records.contains_key(file) {
            files.push(file.to_path_buf());
        }
        let used = self.parser.find_used_members(&files, parent, members);
        members
            .iter()
            .filter(|member| !used.contains(*member))
            .cloned()
            .collect()
    }

    /// Public-annotated exports are never reported.
    pub fn is_public_export(&self, export: &ExportItem) -> bool {
        export.is_public
    }

    /// The file's namespace escapes through a star importer whose own
    /// module object is consumed abroad.
    pub fn has_external_references(&self, file: &Path, _export_name: &str) -> bool {
        let Some(aggregated) = self.imports_by_target.get(file) else {
            return false;
        };
        aggregated.star_imported_by.iter().any(|importer| {
            self.imports_by_target
                .get(importer)
                .map(|agg| agg.has_wildcard())
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerOptions;
    use crate::parser::Scanner;
    use std::fs;

    fn principal() -> Principal {
        Principal::new(
            "test".to_string(),
            Box::new(Scanner::new(CompilerOptions::default())),
        )
    }

    #[test]
    fn test_entry_paths_are_append_only() {
        let mut p = principal();
        assert!(p.add_entry_path(PathBuf::from("/a.ts")));
        assert!(!p.add_entry_path(PathBuf::from("/a.ts")));
        assert_eq!(p.entry_count(), 1);
    }

    #[test]
    fn test_reachability_closure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.ts");
        let b = dir.path().join("b.ts");
        let c = dir.path().join("c.ts");
        fs::write(&a, "import { x } from './b';\n").unwrap();
        fs::write(&b, "export const x = 1;\nimport './c';\n").unwrap();
        fs::write(&c, "export {};\n").unwrap();
        let orphan = dir.path().join("orphan.ts");
        fs::write(&orphan, "export const dead = 1;\n").unwrap();

        let mut p = principal();
        for path in [&a, &b, &c, &orphan] {
            p.add_project_path(path.clone());
        }
        p.add_entry_path(a.clone());

        p.analyze_source_file(&a).expect("analyze a");
        p.analyze_source_file(&b).expect("analyze b");
        p.analyze_source_file(&c).expect("analyze c");

        let used = p.get_used_resolved_files();
        assert!(used.contains(&a));
        assert!(used.contains(&b));
        assert!(used.contains(&c));
        assert_eq!(p.get_unreferenced_files(), vec![orphan]);
    }

    #[test]
    fn test_aggregated_imports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lib = dir.path().join("lib.ts");
        let one = dir.path().join("one.ts");
        let two = dir.path().join("two.ts");
        fs::write(&lib, "export const a = 1;\nexport const b = 2;\n").unwrap();
        fs::write(&one, "import { a } from './lib';\n").unwrap();
        fs::write(&two, "export { b } from './lib';\n").unwrap();

        let mut p = principal();
        p.analyze_source_file(&one).expect("analyze");
        p.analyze_source_file(&two).expect("analyze");

        let aggregated = p.imports_of(&lib).expect("aggregated");
        assert!(aggregated.identifiers.contains("a"));
        assert!(aggregated.identifiers.contains("b"));
        assert_eq!(aggregated.importers.len(), 2);
        assert!(aggregated.re_exported_by.contains(&two));
    }
}
