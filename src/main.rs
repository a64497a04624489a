//! Halldyll Plan CLI entrypoint.
//!
//! This is the main entrypoint for the halldyll-plan command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use halldyll_plan::cli::{Cli, Commands, OutputFormatter, QueryWorld};
use halldyll_plan::config::{ConfigParser, ConfigValidator, PlanDocument, find_config_file};
use halldyll_plan::error::{ConfigError, Result};
use halldyll_plan::provider::{DryRunProvider, StateSource};
use halldyll_plan::reconciler::Reconciler;
use halldyll_plan::store::{LocalPlanStore, PlanStore, STORE_DIR};

use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error [{}]: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// A loaded plan document and the services built around it.
struct Workspace {
    document: PlanDocument,
    parser: ConfigParser,
    state_source: Box<dyn StateSource>,
    store: LocalPlanStore,
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan { detailed, save } => {
            cmd_plan(cli.config.as_ref(), detailed, save, &formatter).await
        }
        Commands::Apply { yes, from_saved } => {
            cmd_apply(cli.config.as_ref(), yes, from_saved, &formatter).await
        }
        Commands::Changes => cmd_changes(cli.config.as_ref(), &formatter).await,
        Commands::Query { world, pattern } => {
            cmd_query(cli.config.as_ref(), world, &pattern, &formatter).await
        }
        Commands::Graph => cmd_graph(cli.config.as_ref(), &formatter).await,
        Commands::Show => cmd_show(cli.config.as_ref(), &formatter).await,
    }
}

/// Validate the plan document.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    let parser = ConfigParser::new().with_base_path(base_dir(&config_file));
    parser.load_dotenv()?;

    let document = parser.load_with_env(&config_file)?;
    let result = ConfigValidator::new().check(&document);
    emit(&formatter.format_validation(&document, &result, show_warnings))?;

    match result.errors.first() {
        Some(first) => Err(ConfigError::ValidationError {
            message: first.message.clone(),
            field: Some(first.field.clone()),
        }
        .into()),
        None => Ok(()),
    }
}

/// Show the change plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    save: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = load_workspace(config_path)?;
    let provider = DryRunProvider::new();
    let reconciler = reconciler(&workspace, &provider);

    let outcome = reconciler.plan(save).await?;
    emit(&formatter.format_plan(&outcome, detailed))?;

    if save {
        eprintln!("Plan saved to {}", workspace.store.location());
    }

    Ok(())
}

/// Apply the change plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    from_saved: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = load_workspace(config_path)?;
    let provider = DryRunProvider::new();
    let reconciler = reconciler(&workspace, &provider);

    if from_saved {
        if let Some(record) = workspace.store.load().await? {
            emit(&formatter.format_saved(Some(&record), &[]))?;
        }
        if !auto_approve && !confirm("Do you want to apply the saved plan?")? {
            eprintln!("Apply cancelled.");
            return Ok(());
        }
        let result = reconciler.apply_saved().await?;
        return emit(&formatter.format_reconciliation(&result));
    }

    let outcome = reconciler.plan(false).await?;
    if outcome.plan.is_empty() {
        eprintln!("No changes to apply.");
        return Ok(());
    }

    emit(&formatter.format_plan(&outcome, false))?;

    if !auto_approve && !confirm("Do you want to apply this plan?")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let result = reconciler.execute(&outcome.plan).await?;
    emit(&formatter.format_reconciliation(&result))
}

/// Show pending changes.
async fn cmd_changes(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let workspace = load_workspace(config_path)?;
    let provider = DryRunProvider::new();

    let report = reconciler(&workspace, &provider).check_changes().await?;
    emit(&formatter.format_changes(&report))
}

/// Query one world.
async fn cmd_query(
    config_path: Option<&PathBuf>,
    world: QueryWorld,
    pattern: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let workspace = load_workspace(config_path)?;
    let patterns = workspace.parser.parse_patterns(pattern)?;
    let provider = DryRunProvider::new();

    let engine = reconciler(&workspace, &provider).engine().await?;
    let solutions = engine.query(world.into(), &patterns)?;
    emit(&formatter.format_query(&solutions))
}

/// Show the dependency graph.
async fn cmd_graph(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let workspace = load_workspace(config_path)?;
    let provider = DryRunProvider::new();

    let engine = reconciler(&workspace, &provider).engine().await?;
    emit(&formatter.format_graph(&engine.graph()?))
}

/// Show the saved plan and history.
async fn cmd_show(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let workspace = load_workspace(config_path)?;

    let record = workspace.store.load().await?;
    let history = workspace.store.history().await?;
    emit(&formatter.format_saved(record.as_ref(), &history))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the plan document path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Directory holding the plan document.
fn base_dir(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Loads and validates the plan document and opens its store.
fn load_workspace(config_path: Option<&PathBuf>) -> Result<Workspace> {
    let config_file = resolve_config_path(config_path)?;
    let dir = base_dir(&config_file);
    debug!("Loading plan document from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(&dir);
    parser.load_dotenv()?;

    let document = parser.load_with_env(&config_file)?;
    let result = ConfigValidator::new().validate(&document)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    let state_source = document.state_source(Some(&dir));
    let store = LocalPlanStore::with_base_dir(dir.join(STORE_DIR));

    Ok(Workspace {
        document,
        parser,
        state_source,
        store,
    })
}

/// Builds a reconciler over a workspace.
fn reconciler<'a>(
    workspace: &'a Workspace,
    provider: &'a DryRunProvider,
) -> Reconciler<'a, LocalPlanStore> {
    Reconciler::new(
        &workspace.document,
        workspace.state_source.as_ref(),
        &workspace.store,
        provider,
    )
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{output}")?;
    stdout.flush()?;
    Ok(())
}

/// Asks for confirmation on stderr.
fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}
