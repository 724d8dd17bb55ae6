//! Default source scanner.
//!
//! A line-and-regex ES module scanner: static and dynamic imports,
//! `require`, named and star re-exports, export declarations with enum and
//! class member lists, and `@public` doc tags. Comments and string contents
//! are blanked before matching so offsets stay aligned with the original
//! text.

use miette::{IntoDiagnostic, Result, WrapErr};
use regex::Regex;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::trace;

use super::{ExportItem, ExportKind, ImportItems, ModuleImports, ParsedModule, SourceParser, WILDCARD};
use crate::compiler::CompilerOptions;
use crate::specifier::{classify, normalize, probe_module_file, resolve_relative, SpecifierKind};

pub struct Scanner {
    options: CompilerOptions,
    import_from: Regex,
    side_effect: Regex,
    export_star_from: Regex,
    export_brace: Regex,
    dynamic: Regex,
    export_decl: Regex,
    export_default: Regex,
    public_block: Regex,
    contents: RefCell<HashMap<PathBuf, String>>,
}

impl Scanner {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            import_from: Regex::new(
                r#"\bimport\s+(type\s+)?((?:[A-Za-z_$][\w$]*\s*,\s*)?(?:\*\s+as\s+[A-Za-z_$][\w$]*|\{[^}]*\}|[A-Za-z_$][\w$]*))\s+from\s*["']([^"']+)["']"#,
            )
            .expect("import regex"),
            side_effect: Regex::new(r#"\bimport\s*["']([^"']+)["']"#).expect("side-effect regex"),
            export_star_from: Regex::new(
                r#"\bexport\s+(type\s+)?\*(?:\s+as\s+([A-Za-z_$][\w$]*))?\s+from\s*["']([^"']+)["']"#,
            )
            .expect("export-star regex"),
            export_brace: Regex::new(
                r#"\bexport\s+(type\s+)?\{([^}]*)\}(?:\s*from\s*["']([^"']+)["'])?"#,
            )
            .expect("export-brace regex"),
            dynamic: Regex::new(r#"\b(?:import|require)\s*\(\s*["']([^"']+)["']\s*\)"#)
                .expect("dynamic import regex"),
            export_decl: Regex::new(
                r"(?m)^\s*export\s+(declare\s+)?(default\s+)?(async\s+function\*?|function\*?|const\s+enum|enum|abstract\s+class|class|interface|type|namespace|const|let|var)\s+([A-Za-z_$][\w$]*)",
            )
            .expect("export-decl regex"),
            export_default: Regex::new(r"(?m)^\s*export\s+default\b").expect("export-default regex"),
            public_block: Regex::new(r"(?s)/\*\*.*?\*/").expect("doc-block regex"),
            contents: RefCell::new(HashMap::new()),
        }
    }

    fn read(&self, path: &Path) -> Result<String> {
        if let Some(contents) = self.contents.borrow().get(path) {
            return Ok(contents.clone());
        }
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read source file: {}", path.display()))?;
        self.contents
            .borrow_mut()
            .insert(path.to_path_buf(), contents.clone());
        Ok(contents)
    }

    /// Route one specifier into the parse result.
    fn record_specifier(
        &self,
        path: &Path,
        specifier: &str,
        items: ImportItems,
        imports: &mut ModuleImports,
    ) {
        match classify(specifier) {
            SpecifierKind::Internal => {
                let candidate = if Path::new(specifier).is_absolute() {
                    normalize(Path::new(specifier))
                } else {
                    resolve_relative(path, specifier)
                };
                match probe_module_file(&candidate) {
                    Some(file) => {
                        imports.internal.entry(file).or_default().merge(items);
                    }
                    None => {
                        trace!("Unresolved internal specifier {specifier} in {}", path.display());
                        imports.unresolved.insert(specifier.to_string());
                    }
                }
            }
            SpecifierKind::Bare => {
                if let Some(file) = self.options.rewrite_alias(specifier) {
                    imports.internal.entry(file).or_default().merge(items);
                } else {
                    imports.external.insert(specifier.to_string());
                }
            }
            SpecifierKind::NodeModules => {
                imports.external.insert(specifier.to_string());
            }
            SpecifierKind::Unresolvable => {
                imports.unresolved.insert(specifier.to_string());
            }
        }
    }
}

impl SourceParser for Scanner {
    fn parse(&self, path: &Path) -> Result<ParsedModule> {
        let original = self.read(path)?;
        let text = blank_comments_and_strings(&original);

        let mut imports = ModuleImports::default();
        let mut export_occurrences: Vec<ExportItem> = Vec::new();
        let mut stmt_spans: Vec<(usize, usize)> = Vec::new();

        // Static imports with a binding clause.
        for caps in self.import_from.captures_iter(&text) {
            let whole = caps.get(0).expect("match");
            stmt_spans.push((whole.start(), whole.end()));
            let clause = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let specifier = spec_text(&original, caps.get(3).expect("specifier"));

            let mut items = ImportItems {
                specifier: specifier.clone(),
                ..Default::default()
            };
            parse_import_clause(clause, &mut items.identifiers);
            if let Some(alias) = star_alias(clause) {
                collect_namespace_usage(&text, alias, (whole.start(), whole.end()), &mut items.identifiers);
            }
            self.record_specifier(path, &specifier, items, &mut imports);
        }

        // Star re-exports: `export * from`, `export * as ns from`.
        for caps in self.export_star_from.captures_iter(&text) {
            let whole = caps.get(0).expect("match");
            stmt_spans.push((whole.start(), whole.end()));
            let specifier = spec_text(&original, caps.get(3).expect("specifier"));
            let items = ImportItems {
                specifier: specifier.clone(),
                is_re_exported: true,
                is_star: true,
                ..Default::default()
            };
            self.record_specifier(path, &specifier, items, &mut imports);
            if let Some(alias) = caps.get(2) {
                export_occurrences.push(ExportItem {
                    name: alias.as_str().to_string(),
                    kind: ExportKind::Other,
                    members: Vec::new(),
                    is_public: false,
                    line: line_of(&original, whole.start()),
                });
            }
        }

        // Brace exports: `export { a as b }` and `export { a } from './x'`.
        for caps in self.export_brace.captures_iter(&text) {
            let whole = caps.get(0).expect("match");
            stmt_spans.push((whole.start(), whole.end()));
            let is_type = caps.get(1).is_some();
            let list = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let from = caps.get(3).map(|m| spec_text(&original, m));
            let line = line_of(&original, whole.start());

            let mut consumed = BTreeSet::new();
            for (origin, exported) in parse_export_list(list) {
                consumed.insert(origin);
                export_occurrences.push(ExportItem {
                    name: exported,
                    kind: if is_type { ExportKind::Type } else { ExportKind::Value },
                    members: Vec::new(),
                    is_public: false,
                    line,
                });
            }
            if let Some(specifier) = from {
                let items = ImportItems {
                    specifier: specifier.clone(),
                    identifiers: consumed,
                    is_re_exported: true,
                    ..Default::default()
                };
                self.record_specifier(path, &specifier, items, &mut imports);
            }
        }

        // Side-effect imports: `import './polyfill'`.
        for caps in self.side_effect.captures_iter(&text) {
            let whole = caps.get(0).expect("match");
            if overlaps(&stmt_spans, whole.start()) {
                continue;
            }
            let specifier = spec_text(&original, caps.get(1).expect("specifier"));
            let items = ImportItems {
                specifier: specifier.clone(),
                ..Default::default()
            };
            self.record_specifier(path, &specifier, items, &mut imports);
        }

        // Dynamic `import()` and `require()`: the whole module is consumed.
        for caps in self.dynamic.captures_iter(&text) {
            let specifier = spec_text(&original, caps.get(1).expect("specifier"));
            let mut items = ImportItems {
                specifier: specifier.clone(),
                ..Default::default()
            };
            items.identifiers.insert(WILDCARD.to_string());
            self.record_specifier(path, &specifier, items, &mut imports);
        }

        // Export declarations with a name.
        let public_spans = self.public_spans(&original);
        let mut decl_spans: Vec<(usize, usize)> = Vec::new();
        for caps in self.export_decl.captures_iter(&text) {
            let whole = caps.get(0).expect("match");
            decl_spans.push((whole.start(), whole.end()));
            let is_default = caps.get(2).is_some();
            let keyword = caps.get(3).expect("keyword").as_str();
            let ident = caps.get(4).expect("name").as_str();
            let kind = export_kind_for(keyword);
            let members = match kind {
                ExportKind::Enum => enum_members(&text, whole.end()),
                ExportKind::Class => class_members(&text, whole.end()),
                _ => Vec::new(),
            };
            export_occurrences.push(ExportItem {
                name: if is_default { "default".to_string() } else { ident.to_string() },
                kind,
                members,
                is_public: is_public_at(&original, &public_spans, whole.start()),
                line: line_of(&original, whole.start()),
            });
        }

        // Anonymous default exports: `export default <expr>`.
        for m in self.export_default.find_iter(&text) {
            if decl_spans.iter().any(|(start, end)| m.start() >= *start && m.start() < *end) {
                continue;
            }
            export_occurrences.push(ExportItem {
                name: "default".to_string(),
                kind: ExportKind::Value,
                members: Vec::new(),
                is_public: is_public_at(&original, &public_spans, m.start()),
                line: line_of(&original, m.start()),
            });
        }

        let (exports, duplicate_exports) = dedupe_exports(export_occurrences);
        Ok(ParsedModule {
            imports,
            exports,
            duplicate_exports,
        })
    }

    fn find_used_members(
        &self,
        files: &[PathBuf],
        parent: &str,
        members: &[String],
    ) -> BTreeSet<String> {
        let mut used = BTreeSet::new();
        let parent_escaped = regex::escape(parent);
        let patterns: Vec<(String, Regex)> = members
            .iter()
            .filter_map(|member| {
                let escaped = regex::escape(member);
                let pattern = format!(
                    r#"(?:\b{parent_escaped}|\bthis)\s*[?!]?\.\s*{escaped}\b|\b{parent_escaped}\s*\[\s*["']{escaped}["']\s*\]"#
                );
                Regex::new(&pattern).ok().map(|re| (member.clone(), re))
            })
            .collect();

        for file in files {
            let Ok(contents) = self.read(file) else {
                continue;
            };
            let text = blank_comments_and_strings(&contents);
            for (member, pattern) in &patterns {
                if used.contains(member) {
                    continue;
                }
                if pattern.is_match(&text) {
                    used.insert(member.clone());
                }
            }
            if used.len() == members.len() {
                break;
            }
        }
        used
    }
}

impl Scanner {
    /// Spans of doc blocks carrying a `@public` tag, in the original text.
    fn public_spans(&self, original: &str) -> Vec<(usize, usize)> {
        self.public_block
            .find_iter(original)
            .filter(|m| m.as_str().contains("@public"))
            .map(|m| (m.start(), m.end()))
            .collect()
    }
}

/// Specifier text from the original content (strings are blanked in the
/// scan text, so captures read from the original at the same offsets).
fn spec_text(original: &str, m: regex::Match<'_>) -> String {
    original[m.start()..m.end()].to_string()
}

fn overlaps(spans: &[(usize, usize)], pos: usize) -> bool {
    spans.iter().any(|(start, end)| pos >= *start && pos < *end)
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].bytes().filter(|b| *b == b'\n').count() + 1
}

fn is_public_at(original: &str, public_spans: &[(usize, usize)], offset: usize) -> bool {
    public_spans.iter().any(|(_, end)| {
        *end <= offset && original[*end..offset].trim().is_empty()
    })
}

fn export_kind_for(keyword: &str) -> ExportKind {
    match keyword.trim() {
        "enum" | "const enum" => ExportKind::Enum,
        "class" | "abstract class" => ExportKind::Class,
        "interface" => ExportKind::Interface,
        "type" => ExportKind::Type,
        "namespace" => ExportKind::Other,
        _ => ExportKind::Value,
    }
}

/// Parse an import binding clause into consumed identifiers.
fn parse_import_clause(clause: &str, identifiers: &mut BTreeSet<String>) {
    let clause = clause.trim();
    if let Some(brace_start) = clause.find('{') {
        let before = clause[..brace_start].trim().trim_end_matches(',').trim();
        if !before.is_empty() {
            identifiers.insert("default".to_string());
        }
        let inner = clause[brace_start + 1..].trim_end_matches('}');
        for entry in inner.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let entry = entry.strip_prefix("type ").unwrap_or(entry).trim();
            let origin = entry.split_whitespace().next().unwrap_or(entry);
            identifiers.insert(origin.to_string());
        }
    } else if !clause.starts_with('*') && !clause.is_empty() {
        identifiers.insert("default".to_string());
    }
}

/// The namespace alias of a `* as ns` clause, if present.
fn star_alias(clause: &str) -> Option<&str> {
    let star = clause.find('*')?;
    let rest = clause[star + 1..].trim_start();
    let rest = rest.strip_prefix("as")?.trim_start();
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// Fold `ns.member` accesses into the identifier set. A bare use of the
/// namespace object (outside member access and the import statement itself)
/// consumes every export, recorded as the wildcard.
fn collect_namespace_usage(
    text: &str,
    alias: &str,
    import_span: (usize, usize),
    identifiers: &mut BTreeSet<String>,
) {
    let member_re = Regex::new(&format!(
        r"\b{}\s*[?!]?\.\s*([A-Za-z_$][\w$]*)",
        regex::escape(alias)
    ))
    .expect("namespace member regex");
    let mut member_spans: Vec<(usize, usize)> = Vec::new();
    for caps in member_re.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        member_spans.push((whole.start(), whole.end()));
        identifiers.insert(caps[1].to_string());
    }

    let bare_re = Regex::new(&format!(r"\b{}\b", regex::escape(alias))).expect("namespace regex");
    for m in bare_re.find_iter(text) {
        if m.start() >= import_span.0 && m.start() < import_span.1 {
            continue;
        }
        if member_spans.iter().any(|(start, end)| m.start() >= *start && m.start() < *end) {
            continue;
        }
        // Property access of another object (`foo.ns`) is not a use.
        if text[..m.start()].trim_end().ends_with('.') {
            continue;
        }
        identifiers.insert(WILDCARD.to_string());
        break;
    }
}

/// Parse an export brace list into `(origin, exported)` pairs.
fn parse_export_list(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let entry = entry.strip_prefix("type ").unwrap_or(entry).trim();
            let mut parts = entry.split_whitespace();
            let origin = parts.next()?.to_string();
            let exported = match (parts.next(), parts.next()) {
                (Some("as"), Some(alias)) => alias.to_string(),
                _ => origin.clone(),
            };
            Some((origin, exported))
        })
        .collect()
}

/// Extract the brace-balanced block starting at the first `{` after `from`.
fn block_after(text: &str, from: usize) -> Option<&str> {
    let open = from + text[from..].find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Enum member names: leading identifier of each top-level comma entry.
fn enum_members(text: &str, decl_end: usize) -> Vec<String> {
    let Some(block) = block_after(text, decl_end) else {
        return Vec::new();
    };
    let mut members = Vec::new();
    let mut depth = 0usize;
    let mut entry_start = 0usize;
    let bytes = block.as_bytes();
    for i in 0..=bytes.len() {
        let at_end = i == bytes.len();
        let b = if at_end { b',' } else { bytes[i] };
        match b {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                let entry = block[entry_start..i].trim();
                if let Some(name) = leading_identifier(entry) {
                    members.push(name.to_string());
                }
                entry_start = i + 1;
            }
            _ => {}
        }
    }
    members
}

fn leading_identifier(entry: &str) -> Option<&str> {
    let entry = entry.trim();
    let first = entry.chars().next()?;
    if !(first.is_alphabetic() || first == '_' || first == '$') {
        return None;
    }
    let end = entry
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(entry.len());
    Some(&entry[..end])
}

/// Non-private member names of a class body. Only lines at the top level of
/// the class block are considered, so method bodies never contribute. Lines
/// led by `private` or a `#name` never match; `constructor` is skipped.
fn class_members(text: &str, decl_end: usize) -> Vec<String> {
    let Some(block) = block_after(text, decl_end) else {
        return Vec::new();
    };
    let member_re = Regex::new(
        r"^\s*(?:(?:public|protected|static|readonly|async|override|abstract|get|set)\s+)*(?:\*\s*)?([A-Za-z_$][\w$]*)\s*[?!]?\s*[(:=<]",
    )
    .expect("class member regex");
    let mut members = Vec::new();
    let mut seen = BTreeSet::new();
    let mut depth = 0i32;
    for line in block.lines() {
        if depth == 0 {
            if let Some(caps) = member_re.captures(line) {
                let name = &caps[1];
                if name != "constructor" && name != "private" && seen.insert(name.to_string()) {
                    members.push(name.to_string());
                }
            }
        }
        for b in line.bytes() {
            match b {
                b'{' | b'(' | b'[' => depth += 1,
                b'}' | b')' | b']' => depth -= 1,
                _ => {}
            }
        }
    }
    members
}

/// Split occurrences into the export map plus duplicate clashes.
fn dedupe_exports(
    occurrences: Vec<ExportItem>,
) -> (std::collections::BTreeMap<String, ExportItem>, Vec<Vec<String>>) {
    let mut exports = std::collections::BTreeMap::new();
    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for item in occurrences {
        *counts.entry(item.name.clone()).or_default() += 1;
        exports.entry(item.name.clone()).or_insert(item);
    }
    let duplicates = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, count)| vec![name; count])
        .collect();
    (exports, duplicates)
}

/// Blank comments and string/template contents with spaces, preserving
/// offsets and the quote characters themselves.
fn blank_comments_and_strings(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    if bytes[i] != b'\n' {
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
            }
            quote @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        out[i] = b' ';
                        i += 1;
                        if i < bytes.len() {
                            out[i] = b' ';
                            i += 1;
                        }
                        continue;
                    }
                    if bytes[i] != b'\n' {
                        out[i] = b' ';
                    }
                    i += 1;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}
