mod json;
mod terminal;

pub use json::JsonReporter;
pub use terminal::TerminalReporter;

use miette::Result;
use std::path::PathBuf;

use crate::engine::Analysis;

/// Output format for reports
#[derive(Debug, Clone, Default)]
pub enum ReportFormat {
    #[default]
    Terminal,
    Json,
}

/// Reporter for the completed analysis
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
    cwd: PathBuf,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>, cwd: PathBuf) -> Self {
        Self {
            format,
            output_path,
            cwd,
        }
    }

    pub fn report(&self, analysis: &Analysis) -> Result<()> {
        match &self.format {
            ReportFormat::Terminal => {
                let reporter = TerminalReporter::new(self.cwd.clone());
                reporter.report(analysis)
            }
            ReportFormat::Json => {
                let reporter = JsonReporter::new(self.output_path.clone());
                reporter.report(analysis)
            }
        }
    }
}
