//! Source parser seam.
//!
//! The engine never inspects syntax itself; it consumes the structures a
//! [`SourceParser`] returns for a single file. The default implementation is
//! the regex-based [`Scanner`], but anything able to produce a
//! [`ParsedModule`] (a real frontend, a test fake) plugs in behind the trait.

mod scanner;

pub use scanner::Scanner;

use miette::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Identifier recorded when a whole module object is consumed (dynamic
/// import, namespace object escaping). Suppresses unused-export findings
/// for the target.
pub const WILDCARD: &str = "*";

/// Kind attribute of an already-parsed export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Value,
    Type,
    Interface,
    Enum,
    Class,
    Other,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Value => "value",
            ExportKind::Type => "type",
            ExportKind::Interface => "interface",
            ExportKind::Enum => "enum",
            ExportKind::Class => "class",
            ExportKind::Other => "other",
        }
    }

    /// Enum, interface and type exports report under the `types` kinds.
    pub fn is_type_like(&self) -> bool {
        matches!(self, ExportKind::Type | ExportKind::Interface | ExportKind::Enum)
    }
}

/// One exported symbol of a file.
#[derive(Debug, Clone)]
pub struct ExportItem {
    pub name: String,
    pub kind: ExportKind,
    /// Enum or class members, for member-level reporting.
    pub members: Vec<String>,
    /// Carries a `@public` annotation; never reported as unused.
    pub is_public: bool,
    pub line: usize,
}

/// What one file imports from one resolved target.
#[derive(Debug, Clone, Default)]
pub struct ImportItems {
    /// The originating specifier as written in source.
    pub specifier: String,
    /// Identifiers consumed from the target ([`WILDCARD`] for "everything").
    pub identifiers: BTreeSet<String>,
    /// The target is re-exported (`export { x } from`, `export * from`).
    pub is_re_exported: bool,
    /// Wildcard form (`export * from`, escaped `import * as ns`).
    pub is_star: bool,
}

impl ImportItems {
    pub fn merge(&mut self, other: ImportItems) {
        self.identifiers.extend(other.identifiers);
        self.is_re_exported |= other.is_re_exported;
        self.is_star |= other.is_star;
        if self.specifier.is_empty() {
            self.specifier = other.specifier;
        }
    }
}

/// All imports of one file, pre-classified by the parser.
#[derive(Debug, Clone, Default)]
pub struct ModuleImports {
    /// Resolved-on-disk internal targets.
    pub internal: BTreeMap<PathBuf, ImportItems>,
    /// Bare and node-modules specifiers, classified further by the engine.
    pub external: BTreeSet<String>,
    /// Specifiers that resolved nowhere.
    pub unresolved: BTreeSet<String>,
}

/// The parse result for a single file.
#[derive(Debug, Clone, Default)]
pub struct ParsedModule {
    pub imports: ModuleImports,
    pub exports: BTreeMap<String, ExportItem>,
    /// Each clash lists every occurrence of the duplicated name.
    pub duplicate_exports: Vec<Vec<String>>,
}

/// A per-file syntactic parser.
pub trait SourceParser {
    /// Extract imports and exports from one file.
    fn parse(&self, path: &Path) -> Result<ParsedModule>;

    /// Which of `members` (of exported symbol `parent`) are referenced in
    /// any of `files`. Used for enum/class member-level findings.
    fn find_used_members(
        &self,
        files: &[PathBuf],
        parent: &str,
        members: &[String],
    ) -> BTreeSet<String>;
}
