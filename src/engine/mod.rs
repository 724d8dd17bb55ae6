//! Resolution and reachability engine.
//!
//! Three phases. Seeding expands entry and project globs per workspace and
//! replays plugin-contributed references. Classification routes every
//! `(containing_file, specifier)` pair: internal paths become reachability
//! roots, external packages go through the ledger, cross-workspace imports
//! inject entry paths into the target workspace's principal. Reachability
//! runs the fixed point per principal until no entry set grows and no new
//! file appears in any closure.

use indicatif::{ProgressBar, ProgressStyle};
use miette::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::compiler::CompilerOptions;
use crate::config::{all_patterns, production_patterns, Config};
use crate::discovery::expand_globs;
use crate::issues::{Counters, Issue, IssueCollector, IssueKind, ReportSelectors};
use crate::ledger::DependencyLedger;
use crate::manifest::PackageManifest;
use crate::parser::ParsedModule;
use crate::plugins::{PluginContext, PluginOutcome, PluginRegistry};
use crate::principal::{PrincipalFactory, PrincipalId};
use crate::reconcile::reconcile;
use crate::specifier::{
    classify, normalize, package_name, package_name_from_module_path, package_subpath,
    probe_module_file, resolve_relative, SpecifierKind,
};
use crate::workspaces::{Workspace, WorkspaceRegistry};

/// The invocation contract.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Project root; the root manifest lives here.
    pub cwd: PathBuf,
    /// Explicit compiler configuration file. Defaults to `tsconfig.json`
    /// discovery per workspace.
    pub compiler_config: Option<PathBuf>,
    /// Respect gitignore rules during glob expansion.
    pub gitignore: bool,
    /// Each workspace must declare everything it uses.
    pub is_strict: bool,
    /// Seed only production-scoped entry points.
    pub is_production: bool,
    /// Render a progress spinner while analysing.
    pub show_progress: bool,
    pub config: Config,
}

/// The completed run: selectors, issues grouped by kind, counters.
#[derive(Debug)]
pub struct Analysis {
    pub selectors: ReportSelectors,
    pub issues: IssueCollector,
    pub counters: Counters,
}

/// Run the full analysis pipeline.
pub fn run(options: AnalysisOptions, plugins: PluginRegistry) -> Result<Analysis> {
    Engine::new(options, plugins)?.run()
}

struct Engine {
    options: AnalysisOptions,
    registry: WorkspaceRegistry,
    ledger: DependencyLedger,
    factory: PrincipalFactory,
    principal_of_workspace: BTreeMap<String, PrincipalId>,
    plugins: PluginRegistry,
    collector: IssueCollector,
    analyzed: BTreeSet<PathBuf>,
}

impl Engine {
    fn new(options: AnalysisOptions, plugins: PluginRegistry) -> Result<Self> {
        let registry = WorkspaceRegistry::discover(&options.cwd, &options.config)?;

        let mut ignore_dependencies = options.config.ignore_dependencies.clone();
        for workspace in registry.iter() {
            ignore_dependencies.extend(workspace.config.ignore_dependencies.iter().cloned());
        }
        let mut ledger = DependencyLedger::new(&ignore_dependencies, options.is_strict)?;

        let mut factory = PrincipalFactory::new();
        let mut principal_of_workspace = BTreeMap::new();
        for workspace in registry.iter() {
            if workspace.enabled {
                ledger.add_workspace(workspace);
                let compiler_options = compiler_options_for(&options, workspace);
                let pid = factory.get_principal(&compiler_options);
                principal_of_workspace.insert(workspace.name.clone(), pid);
            }
        }
        info!(
            "{} workspaces, {} principals",
            registry.len(),
            factory.len()
        );

        Ok(Self {
            options,
            registry,
            ledger,
            factory,
            principal_of_workspace,
            plugins,
            collector: IssueCollector::new(),
            analyzed: BTreeSet::new(),
        })
    }

    fn run(mut self) -> Result<Analysis> {
        let workspaces: Vec<Workspace> = self
            .registry
            .enabled_workspaces()
            .cloned()
            .collect();

        // Phase A: seed entry and project paths, ancestors first.
        for workspace in &workspaces {
            self.seed_workspace(workspace)?;
        }

        // Phase B + C: the reachability fixed point, with classification
        // folded into each file's analysis.
        self.run_fixed_point();

        // Unreferenced project files.
        let mut unreferenced: BTreeSet<PathBuf> = BTreeSet::new();
        for pid in self.factory.ids() {
            unreferenced.extend(self.factory.principal(pid).get_unreferenced_files());
        }
        for file in &unreferenced {
            self.collector.add(Issue::new(
                IssueKind::Files,
                file.clone(),
                file.display().to_string(),
            ));
        }

        let counters = Counters {
            processed: self.analyzed.len(),
            total: self.analyzed.len() + unreferenced.len(),
        };
        info!(
            "Analyzed {} files ({} unreferenced)",
            counters.processed,
            unreferenced.len()
        );

        // Symbol reconciliation, then dependency settling.
        let selectors = ReportSelectors::from_patterns(
            &self.options.config.include,
            &self.options.config.exclude,
        );
        reconcile(&self.factory, &selectors, &mut self.collector);
        self.settle_dependencies();

        self.collector.sort();
        Ok(Analysis {
            selectors,
            issues: self.collector,
            counters,
        })
    }

    /// Phase A for one workspace: expand globs, consult the manifest and
    /// the plugins, and seed the principal.
    fn seed_workspace(&mut self, workspace: &Workspace) -> Result<()> {
        let pid = self.principal_of_workspace[&workspace.name];
        let config = &workspace.config;
        let gitignore = self.options.gitignore;

        // Nested workspaces seed themselves; keep their trees out of this
        // workspace's globs.
        let mut ignore = config.ignore.clone();
        for other in self.registry.iter() {
            if other.dir != workspace.dir && other.dir.starts_with(&workspace.dir) {
                if let Ok(nested) = other.dir.strip_prefix(&workspace.dir) {
                    ignore.push(format!("{}/**", nested.display()));
                }
            }
        }

        let entry_patterns = if self.options.is_production {
            production_patterns(&config.entry)
        } else {
            all_patterns(&config.entry)
        };
        let project_patterns = all_patterns(&config.project);

        let mut entry_files = expand_globs(&workspace.dir, &entry_patterns, &ignore, gitignore)?;
        for relative in workspace.manifest.entry_files() {
            if let Some(file) = probe_module_file(&normalize(&workspace.dir.join(&relative))) {
                entry_files.push(file);
            }
        }
        let project_files = expand_globs(&workspace.dir, &project_patterns, &ignore, gitignore)?;

        debug!(
            "Workspace {}: {} entry files, {} project files",
            workspace.name,
            entry_files.len(),
            project_files.len()
        );

        {
            let principal = self.factory.principal_mut(pid);
            for file in project_files {
                principal.add_project_path(file);
            }
            for file in entry_files {
                principal.add_entry_path(file);
            }
        }

        // Plugin pass: collect first (read-only), then apply.
        let outcomes = self.collect_plugin_outcomes(workspace, gitignore);
        for outcome in outcomes {
            self.apply_plugin_outcome(workspace, pid, outcome);
        }
        Ok(())
    }

    fn collect_plugin_outcomes(&self, workspace: &Workspace, gitignore: bool) -> Vec<PluginOutcome> {
        let dependencies = declared_dependencies(&workspace.manifest);
        let ctx = PluginContext {
            workspace_dir: &workspace.dir,
            manifest: &workspace.manifest,
            is_production: self.options.is_production,
        };

        let mut outcomes = Vec::new();
        for plugin in self.plugins.iter() {
            if !plugin.is_enabled(&dependencies) {
                continue;
            }
            let globs: Vec<String> = plugin.config_globs().iter().map(|s| s.to_string()).collect();
            let config_files = match expand_globs(&workspace.dir, &globs, &[], gitignore) {
                Ok(files) => files,
                Err(err) => {
                    debug!("Plugin {}: glob expansion failed: {err}", plugin.name());
                    continue;
                }
            };
            for config_file in config_files {
                match plugin.collect(&config_file, &ctx) {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(err) => {
                        debug!(
                            "Plugin {} failed on {}: {err}",
                            plugin.name(),
                            config_file.display()
                        );
                    }
                }
            }
        }
        outcomes
    }

    fn apply_plugin_outcome(
        &mut self,
        workspace: &Workspace,
        pid: PrincipalId,
        outcome: PluginOutcome,
    ) {
        self.ledger
            .add_peer_dependencies(&workspace.name, &outcome.peer_dependencies);
        self.ledger
            .set_installed_binaries(&workspace.name, outcome.installed_binaries);

        {
            let principal = self.factory.principal_mut(pid);
            for path in outcome.entry_paths {
                principal.skip_exports_analysis_for(path.clone());
                principal.add_entry_path(path);
            }
        }

        for (file, binary) in outcome.referenced_binaries {
            if !self.ledger.has_binary(&workspace.name, &binary)
                && !self.options.config.ignore_binaries.contains(&binary)
            {
                debug!(
                    "Binary {binary} referenced in {} is not installed",
                    file.display()
                );
            }
        }

        // Replay plugin-attributed references through the classifier so
        // they participate in ledger accounting.
        for (file, specifier) in outcome.referenced_dependencies {
            self.classify_specifier(&file, &specifier, &workspace.name, pid);
        }
    }

    /// Phase C: analyse newly reachable files until every principal's
    /// closure and entry set are stable. Termination: the universe of files
    /// is finite, the analysed set and every entry set are append-only.
    fn run_fixed_point(&mut self) {
        let progress = if self.options.show_progress {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .expect("spinner template"),
            );
            Some(bar)
        } else {
            None
        };

        loop {
            let mut changed = false;
            let pids: Vec<PrincipalId> = self.factory.ids().collect();
            for pid in pids {
                loop {
                    let files: Vec<PathBuf> = {
                        let principal = self.factory.principal(pid);
                        principal
                            .get_used_resolved_files()
                            .into_iter()
                            .filter(|file| !self.analyzed.contains(file))
                            .filter(|file| {
                                principal.is_entry(file) || principal.is_project_path(file)
                            })
                            .collect()
                    };
                    if files.is_empty() {
                        break;
                    }
                    for file in files {
                        self.analyzed.insert(file.clone());
                        changed = true;
                        if let Some(bar) = &progress {
                            bar.set_message(format!("Analyzing {}", file.display()));
                            bar.tick();
                        }
                        let parsed = match self.factory.principal_mut(pid).analyze_source_file(&file)
                        {
                            Ok(parsed) => parsed,
                            Err(err) => {
                                debug!("Failed to analyze {}: {err}", file.display());
                                continue;
                            }
                        };
                        self.handle_parsed(&file, parsed, pid);
                    }
                }
            }
            if !changed {
                break;
            }
        }

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }
    }

    /// Fold one file's parse result into the engine state.
    fn handle_parsed(&mut self, file: &Path, parsed: ParsedModule, pid: PrincipalId) {
        let workspace_name = self
            .registry
            .lookup_by_file_path(file)
            .map(|ws| ws.name.clone())
            .unwrap_or_else(|| ".".to_string());

        // Cross-workspace relative imports: inject the target into the
        // owning workspace's principal when it differs.
        for target in parsed.imports.internal.keys() {
            let target_pid = self
                .registry
                .lookup_by_file_path(target)
                .and_then(|ws| self.principal_of_workspace.get(&ws.name).copied());
            if let Some(target_pid) = target_pid {
                if target_pid != pid {
                    self.factory
                        .principal_mut(target_pid)
                        .add_entry_path(target.to_path_buf());
                }
            }
        }

        for specifier in &parsed.imports.external {
            self.classify_specifier(file, specifier, &workspace_name, pid);
        }

        for specifier in &parsed.imports.unresolved {
            self.collector.add(Issue::new(
                IssueKind::Unresolved,
                file.to_path_buf(),
                specifier.clone(),
            ));
        }

        for clash in &parsed.duplicate_exports {
            self.collector.add(
                Issue::new(IssueKind::Duplicates, file.to_path_buf(), clash.join("|"))
                    .with_symbols(clash.clone()),
            );
        }
    }

    /// Phase B: classify one `(containing_file, specifier)` pair.
    fn classify_specifier(
        &mut self,
        containing_file: &Path,
        specifier: &str,
        workspace_name: &str,
        pid: PrincipalId,
    ) {
        match classify(specifier) {
            SpecifierKind::Internal => {
                let candidate = if Path::new(specifier).is_absolute() {
                    normalize(Path::new(specifier))
                } else {
                    resolve_relative(containing_file, specifier)
                };
                match probe_module_file(&candidate) {
                    Some(file) => {
                        let target_pid = self
                            .registry
                            .lookup_by_file_path(&file)
                            .and_then(|ws| self.principal_of_workspace.get(&ws.name).copied())
                            .unwrap_or(pid);
                        self.factory.principal_mut(target_pid).add_entry_path(file);
                    }
                    None => {
                        self.collector.add(Issue::new(
                            IssueKind::Unresolved,
                            containing_file.to_path_buf(),
                            specifier.to_string(),
                        ));
                    }
                }
            }
            SpecifierKind::NodeModules => {
                match package_name_from_module_path(Path::new(specifier)) {
                    Some(package) => {
                        if !self.ledger.maybe_add_referenced(workspace_name, &package) {
                            self.collector.add(Issue::new(
                                IssueKind::Unlisted,
                                containing_file.to_path_buf(),
                                package,
                            ));
                        }
                    }
                    None => {
                        self.collector.add(Issue::new(
                            IssueKind::Unresolved,
                            containing_file.to_path_buf(),
                            specifier.to_string(),
                        ));
                    }
                }
            }
            SpecifierKind::Bare => {
                let Some(package) = package_name(specifier) else {
                    self.collector.add(Issue::new(
                        IssueKind::Unresolved,
                        containing_file.to_path_buf(),
                        specifier.to_string(),
                    ));
                    return;
                };

                if !self.ledger.maybe_add_referenced(workspace_name, &package) {
                    self.collector.add(Issue::new(
                        IssueKind::Unlisted,
                        containing_file.to_path_buf(),
                        package.clone(),
                    ));
                }

                // Workspace import, including self-references: resolve into
                // the target workspace and promote the file to an entry
                // path. The parser classified it as external; the target is
                // internal to the project.
                let target = self.registry.lookup_by_package_name(&package).map(|ws| {
                    (
                        ws.name.clone(),
                        ws.dir.clone(),
                        Arc::clone(&ws.manifest),
                    )
                });
                if let Some((target_name, target_dir, target_manifest)) = target {
                    let subpath = package_subpath(specifier);
                    match target_manifest.resolve_subpath(&target_dir, subpath) {
                        Some(file) if file.starts_with(&target_dir) => {
                            if let Some(&target_pid) =
                                self.principal_of_workspace.get(&target_name)
                            {
                                self.factory.principal_mut(target_pid).add_entry_path(file);
                            }
                        }
                        _ => {
                            debug!(
                                "Failed to resolve {specifier} into workspace {target_name}"
                            );
                        }
                    }
                }
            }
            SpecifierKind::Unresolvable => {
                self.collector.add(Issue::new(
                    IssueKind::Unresolved,
                    containing_file.to_path_buf(),
                    specifier.to_string(),
                ));
            }
        }
    }

    /// Dependency settling: declared-minus-referenced per workspace.
    fn settle_dependencies(&mut self) {
        for settled in self.ledger.settle() {
            for package in settled.unused_dependencies {
                self.collector.add(Issue::new(
                    IssueKind::Dependencies,
                    settled.manifest_path.clone(),
                    package,
                ));
            }
            for package in settled.unused_dev_dependencies {
                self.collector.add(Issue::new(
                    IssueKind::DevDependencies,
                    settled.manifest_path.clone(),
                    package,
                ));
            }
        }
    }
}

/// Compiler options for one workspace: the explicit override, else the
/// workspace's own `tsconfig.json`, else the root's, else defaults.
fn compiler_options_for(options: &AnalysisOptions, workspace: &Workspace) -> CompilerOptions {
    let candidates = [
        options
            .compiler_config
            .as_ref()
            .map(|path| options.cwd.join(path)),
        Some(workspace.dir.join("tsconfig.json")),
        Some(options.cwd.join("tsconfig.json")),
    ];
    for candidate in candidates.into_iter().flatten() {
        if candidate.is_file() {
            match CompilerOptions::from_config_file(&candidate) {
                Ok(compiler_options) => return compiler_options,
                Err(err) => {
                    debug!("Ignoring invalid compiler config {}: {err}", candidate.display());
                }
            }
        }
    }
    CompilerOptions::default()
}

fn declared_dependencies(manifest: &PackageManifest) -> BTreeSet<String> {
    manifest
        .dependencies
        .keys()
        .chain(manifest.dev_dependencies.keys())
        .chain(manifest.peer_dependencies.keys())
        .chain(manifest.optional_dependencies.keys())
        .cloned()
        .collect()
}
