use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::engine::Analysis;
use crate::issues::IssueKind;

/// Human-readable terminal output, grouped by issue kind.
pub struct TerminalReporter {
    cwd: PathBuf,
}

impl TerminalReporter {
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }

    pub fn report(&self, analysis: &Analysis) -> Result<()> {
        let mut reported = 0;

        for kind in IssueKind::ALL {
            if !analysis.selectors.is_enabled(kind) {
                continue;
            }
            let issues = analysis.issues.of_kind(kind);
            if issues.is_empty() {
                continue;
            }
            reported += issues.len();

            println!();
            println!(
                "{} {}",
                kind.title().yellow().bold(),
                format!("({})", issues.len()).dimmed()
            );
            for issue in issues {
                let location = self.relative(&issue.file_path);
                match kind {
                    IssueKind::Files => println!("  {}", location),
                    IssueKind::EnumMembers | IssueKind::ClassMembers => {
                        println!(
                            "  {}  {}.{}",
                            location,
                            issue.parent_symbol.as_deref().unwrap_or(""),
                            issue.symbol
                        );
                    }
                    _ => {
                        let symbol_type = issue
                            .symbol_type
                            .as_deref()
                            .map(|t| format!(" ({t})"))
                            .unwrap_or_default();
                        println!("  {}  {}{}", location, issue.symbol, symbol_type.dimmed());
                    }
                }
            }
        }

        println!();
        if reported == 0 {
            println!("{}", "No issues found.".green());
        } else {
            println!("{}", format!("{reported} issues").yellow());
        }
        println!(
            "{}",
            format!(
                "Processed {} files ({} total)",
                analysis.counters.processed, analysis.counters.total
            )
            .dimmed()
        );
        Ok(())
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.cwd)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}
