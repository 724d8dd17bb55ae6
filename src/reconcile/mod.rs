//! Symbol reconciliation.
//!
//! After reachability converges, every export of every analysed project
//! file is compared against the aggregated imports pointing at the file.
//! Entry files are roots and never analysed for unused exports. The
//! re-export chase is bounded by the finite file set; a visited set guards
//! cycles.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::issues::{Issue, IssueCollector, IssueKind, ReportSelectors};
use crate::parser::ExportKind;
use crate::principal::{Principal, PrincipalFactory};

/// Compare exports against imports across all principals and emit
/// unused-symbol issues.
pub fn reconcile(
    factory: &PrincipalFactory,
    selectors: &ReportSelectors,
    collector: &mut IssueCollector,
) {
    for pid in factory.ids() {
        let principal = factory.principal(pid);
        let mut files: Vec<&PathBuf> = principal.analyzed_files().collect();
        files.sort();

        for file in files {
            if principal.is_entry(file) || principal.should_skip_exports(file) {
                continue;
            }
            if !principal.is_project_path(file) {
                continue;
            }
            let Some(record) = principal.record(file) else {
                continue;
            };
            if record.exports.is_empty() {
                continue;
            }

            let aggregated = principal.imports_of(file);
            for (name, export) in &record.exports {
                if principal.is_public_export(export) {
                    continue;
                }

                if export.kind == ExportKind::Enum
                    && selectors.is_enabled(IssueKind::EnumMembers)
                    && !export.members.is_empty()
                {
                    for member in principal.find_unused_members(file, name, &export.members) {
                        collector.add(
                            Issue::new(IssueKind::EnumMembers, file.clone(), member)
                                .with_parent_symbol(name.clone())
                                .with_symbol_type(export.kind.as_str()),
                        );
                    }
                }
                if export.kind == ExportKind::Class
                    && selectors.is_enabled(IssueKind::ClassMembers)
                    && !export.members.is_empty()
                {
                    for member in principal.find_unused_members(file, name, &export.members) {
                        collector.add(
                            Issue::new(IssueKind::ClassMembers, file.clone(), member)
                                .with_parent_symbol(name.clone())
                                .with_symbol_type(export.kind.as_str()),
                        );
                    }
                }

                let directly_used = aggregated
                    .map(|agg| agg.identifiers.contains(name) || agg.has_wildcard())
                    .unwrap_or(false);
                if directly_used {
                    continue;
                }

                let namespaced = aggregated
                    .map(|agg| !agg.re_exported_by.is_empty() || !agg.star_imported_by.is_empty())
                    .unwrap_or(false);

                if namespaced {
                    if chase_re_exports(principal, file, name) {
                        continue;
                    }
                    if principal.has_external_references(file, name) {
                        continue;
                    }
                    trace!("Namespaced export {name} of {} is unused", file.display());
                    let kind = if export.kind.is_type_like() {
                        IssueKind::NsTypes
                    } else {
                        IssueKind::NsExports
                    };
                    collector.add(
                        Issue::new(kind, file.clone(), name.clone())
                            .with_symbol_type(export.kind.as_str()),
                    );
                } else {
                    let kind = if export.kind.is_type_like() {
                        IssueKind::Types
                    } else {
                        IssueKind::Exports
                    };
                    collector.add(
                        Issue::new(kind, file.clone(), name.clone())
                            .with_symbol_type(export.kind.as_str()),
                    );
                }
            }
        }
    }
}

/// Walk the re-export chain away from `file`. The symbol counts as used
/// when a hop is an entry file (namespace re-export from a root) or some
/// hop's own importers consume the name or the whole module object.
fn chase_re_exports(principal: &Principal, file: &Path, name: &str) -> bool {
    let mut visited: BTreeSet<PathBuf> = BTreeSet::new();
    let mut stack: Vec<PathBuf> = match principal.imports_of(file) {
        Some(agg) => agg
            .re_exported_by
            .iter()
            .chain(agg.star_imported_by.iter())
            .cloned()
            .collect(),
        None => return false,
    };

    while let Some(hop) = stack.pop() {
        if !visited.insert(hop.clone()) {
            continue;
        }
        if principal.is_entry(&hop) {
            return true;
        }
        if let Some(agg) = principal.imports_of(&hop) {
            if agg.identifiers.contains(name) || agg.has_wildcard() {
                return true;
            }
            stack.extend(agg.re_exported_by.iter().cloned());
            stack.extend(agg.star_imported_by.iter().cloned());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerOptions;
    use crate::parser::Scanner;
    use std::fs;

    fn analyzed_principal(files: &[(&str, &str)]) -> (tempfile::TempDir, Principal) {
        let dir = tempfile::tempdir().expect("tempdir");
        for (file, contents) in files {
            fs::write(dir.path().join(file), contents).unwrap();
        }
        let mut principal = Principal::new(
            "test".to_string(),
            Box::new(Scanner::new(CompilerOptions::default())),
        );
        for (file, _) in files {
            principal.add_project_path(dir.path().join(file));
        }
        for (file, _) in files {
            principal
                .analyze_source_file(&dir.path().join(file))
                .expect("analyze");
        }
        (dir, principal)
    }

    fn reconcile_single(principal: Principal) -> IssueCollector {
        let mut factory = PrincipalFactory::new();
        let pid = factory.get_principal(&CompilerOptions::default());
        *factory.principal_mut(pid) = principal;
        let mut collector = IssueCollector::new();
        reconcile(&factory, &ReportSelectors::default(), &mut collector);
        collector
    }

    #[test]
    fn test_unused_export_reported() {
        let (dir, mut principal) = analyzed_principal(&[
            ("index.ts", "import { used } from './lib';\nused();\n"),
            ("lib.ts", "export const used = 1;\nexport const unused = 2;\n"),
        ]);
        principal.add_entry_path(dir.path().join("index.ts"));

        let collector = reconcile_single(principal);
        let exports = collector.of_kind(IssueKind::Exports);
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].symbol, "unused");
    }

    #[test]
    fn test_type_export_reported_as_types() {
        let (dir, mut principal) = analyzed_principal(&[
            ("index.ts", "import { used } from './lib';\n"),
            ("lib.ts", "export const used = 1;\nexport interface Unused { x: number }\n"),
        ]);
        principal.add_entry_path(dir.path().join("index.ts"));

        let collector = reconcile_single(principal);
        assert_eq!(collector.count(IssueKind::Exports), 0);
        let types = collector.of_kind(IssueKind::Types);
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].symbol, "Unused");
        assert_eq!(types[0].symbol_type.as_deref(), Some("interface"));
    }

    #[test]
    fn test_public_export_never_reported() {
        let (dir, mut principal) = analyzed_principal(&[
            ("index.ts", "import './lib';\n"),
            ("lib.ts", "/** @public */\nexport const api = 1;\n"),
        ]);
        principal.add_entry_path(dir.path().join("index.ts"));

        let collector = reconcile_single(principal);
        assert_eq!(collector.count(IssueKind::Exports), 0);
    }

    #[test]
    fn test_entry_file_exports_skipped() {
        let (dir, mut principal) =
            analyzed_principal(&[("index.ts", "export const main = 1;\n")]);
        principal.add_entry_path(dir.path().join("index.ts"));

        let collector = reconcile_single(principal);
        assert_eq!(collector.total(), 0);
    }

    #[test]
    fn test_star_re_export_from_entry_counts_as_used() {
        let (dir, mut principal) = analyzed_principal(&[
            ("index.ts", "export * from './lib';\n"),
            ("lib.ts", "export const part = 1;\n"),
        ]);
        principal.add_entry_path(dir.path().join("index.ts"));

        let collector = reconcile_single(principal);
        assert_eq!(collector.count(IssueKind::NsExports), 0);
        assert_eq!(collector.count(IssueKind::Exports), 0);
    }

    #[test]
    fn test_dead_namespace_re_export_reported() {
        let (dir, mut principal) = analyzed_principal(&[
            ("index.ts", "import { other } from './barrel';\n"),
            ("barrel.ts", "export * from './lib';\nexport const other = 1;\n"),
            ("lib.ts", "export const hidden = 1;\n"),
        ]);
        principal.add_entry_path(dir.path().join("index.ts"));

        let collector = reconcile_single(principal);
        let ns = collector.of_kind(IssueKind::NsExports);
        assert_eq!(ns.len(), 1);
        assert_eq!(ns[0].symbol, "hidden");
    }

    #[test]
    fn test_enum_members() {
        let (dir, mut principal) = analyzed_principal(&[
            (
                "index.ts",
                "import { Color } from './color';\nconst c = Color.Red;\n",
            ),
            ("color.ts", "export enum Color { Red, Green }\n"),
        ]);
        principal.add_entry_path(dir.path().join("index.ts"));

        let collector = reconcile_single(principal);
        let members = collector.of_kind(IssueKind::EnumMembers);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].symbol, "Green");
        assert_eq!(members[0].parent_symbol.as_deref(), Some("Color"));
    }

    #[test]
    fn test_re_export_chase_cycle_terminates() {
        let (dir, mut principal) = analyzed_principal(&[
            ("a.ts", "export * from './b';\nexport const left = 1;\n"),
            ("b.ts", "export * from './a';\nexport const right = 1;\n"),
        ]);
        principal.add_project_path(dir.path().join("a.ts"));
        principal.add_project_path(dir.path().join("b.ts"));

        // No entry file: the chase must terminate and report both symbols.
        let collector = reconcile_single(principal);
        assert_eq!(collector.count(IssueKind::NsExports), 2);
    }
}
