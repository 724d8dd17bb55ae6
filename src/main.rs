use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::PathBuf;
use tracing::info;

use deadwood::config::Config;
use deadwood::engine::{self, AnalysisOptions};
use deadwood::manifest::PackageManifest;
use deadwood::plugins::PluginRegistry;
use deadwood::report::{ReportFormat, Reporter};

/// deadwood - Find unused files, exports and dependencies in
/// JavaScript/TypeScript monorepos
#[derive(Parser, Debug)]
#[command(name = "deadwood")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the project root (the directory with the root manifest)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a compiler configuration file (tsconfig)
    #[arg(long, value_name = "FILE")]
    tsconfig: Option<PathBuf>,

    /// Production mode - only production entry points seed reachability
    #[arg(long)]
    production: bool,

    /// Strict mode - every workspace must declare everything it uses
    #[arg(long)]
    strict: bool,

    /// Do not respect gitignore files during glob expansion
    #[arg(long)]
    no_gitignore: bool,

    /// Issue kinds to report (can be specified multiple times)
    #[arg(long)]
    include: Vec<String>,

    /// Issue kinds to suppress (can be specified multiple times)
    #[arg(long)]
    exclude: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "terminal")]
    format: OutputFormat,

    /// Output file (for json format)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show a progress spinner while analysing
    #[arg(long)]
    progress: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug, Default)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terminal => ReportFormat::Terminal,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    info!("deadwood v{}", env!("CARGO_PKG_VERSION"));

    let cwd = cli
        .path
        .canonicalize()
        .into_diagnostic()
        .wrap_err_with(|| format!("No such directory: {}", cli.path.display()))?;

    let config = load_config(&cli, &cwd)?;

    let options = AnalysisOptions {
        cwd: cwd.clone(),
        compiler_config: cli.tsconfig.clone(),
        gitignore: !cli.no_gitignore,
        is_strict: cli.strict,
        is_production: cli.production,
        show_progress: cli.progress && !cli.quiet,
        config,
    };

    let analysis = engine::run(options, PluginRegistry::new())?;

    let reporter = Reporter::new(cli.format.into(), cli.output.clone(), cwd);
    reporter.report(&analysis)?;

    // A non-empty issue set is a non-fatal signal for the caller.
    if !analysis.issues.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli, cwd: &PathBuf) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        let manifest_path = cwd.join("package.json");
        let manifest = if manifest_path.is_file() {
            PackageManifest::from_path(&manifest_path)
                .into_diagnostic()
                .wrap_err("Failed to read root manifest")?
        } else {
            PackageManifest::default()
        };
        Config::from_default_locations(cwd, &manifest)?
    };

    // Override with CLI arguments
    if !cli.include.is_empty() {
        config.include.extend(cli.include.clone());
    }
    if !cli.exclude.is_empty() {
        config.exclude.extend(cli.exclude.clone());
    }

    Ok(config)
}
