use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::engine::Analysis;
use crate::issues::{Counters, Issue};

/// JSON reporter for programmatic output
pub struct JsonReporter {
    output_path: Option<PathBuf>,
}

impl JsonReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    pub fn report(&self, analysis: &Analysis) -> Result<()> {
        let report = JsonReport::from_analysis(analysis);
        let json = serde_json::to_string_pretty(&report).into_diagnostic()?;

        if let Some(path) = &self.output_path {
            std::fs::write(path, &json).into_diagnostic()?;
            println!("Report written to: {}", path.display());
        } else {
            println!("{json}");
        }

        Ok(())
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    version: &'static str,
    issues: BTreeMap<&'static str, Vec<&'a Issue>>,
    counters: Counters,
}

impl<'a> JsonReport<'a> {
    fn from_analysis(analysis: &'a Analysis) -> Self {
        let mut issues: BTreeMap<&'static str, Vec<&'a Issue>> = BTreeMap::new();
        for kind in analysis.selectors.iter() {
            let of_kind = analysis.issues.of_kind(kind);
            if !of_kind.is_empty() {
                issues.insert(kind.as_str(), of_kind.iter().collect());
            }
        }
        Self {
            version: env!("CARGO_PKG_VERSION"),
            issues,
            counters: analysis.counters,
        }
    }
}
