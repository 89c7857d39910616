use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use difftriage::core::DiffCategory;
use difftriage::{
    BackendKind, CategorySet, Config, DiffFilter, DiffQuery, ExcludeClause, FilterDiffOutput,
    FilteredDiffInputs, PathStyle, RequireClause,
};

#[derive(Parser)]
#[command(name = "difftriage")]
#[command(about = "Categorize changes against a base ref and filter them by category")]
#[command(version)]
struct Cli {
    /// Files to consider, relative to --cwd. Defaults to every changed file.
    files: Vec<PathBuf>,

    #[arg(long, help = "Working directory (defaults to the current directory)")]
    cwd: Option<PathBuf>,

    #[arg(long, help = "Base ref to compare against (defaults to HEAD)")]
    base: Option<String>,

    #[arg(
        long,
        value_delimiter = ',',
        conflicts_with = "require_at_least",
        help = "Keep only changes whose categories are exactly these"
    )]
    require_exactly: Option<Vec<DiffCategory>>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Keep only changes that have at least these categories"
    )]
    require_at_least: Option<Vec<DiffCategory>>,

    #[arg(
        long,
        value_delimiter = ',',
        conflicts_with = "exclude_contains",
        help = "Drop changes whose categories are exactly these"
    )]
    exclude_exactly: Option<Vec<DiffCategory>>,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Drop changes that have any of these categories"
    )]
    exclude_contains: Option<Vec<DiffCategory>>,

    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    #[arg(long, value_enum)]
    path_style: Option<PathStyle>,

    #[arg(long)]
    max_concurrency: Option<usize>,

    #[arg(long, default_value = "json")]
    output_format: OutputFormat,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Paths,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cwd = match &cli.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir()?,
    };

    let mut config = Config::load(&cwd)?;
    let cli_filter = filter_from_cli(&cli, &config.filter);
    config.merge_with_cli(cli.base.clone(), cli_filter, cli.backend);
    if let Some(path_style) = cli.path_style {
        config.path_style = path_style;
    }
    if let Some(max_concurrency) = cli.max_concurrency {
        config.max_concurrency = max_concurrency;
    }
    config.normalize();

    let inputs = FilteredDiffInputs::new(config.filter.clone())
        .with_cwd(cwd)
        .with_base_ref(config.base_ref.clone())
        .with_files(cli.files.clone());

    let query = DiffQuery::new(config);
    let output = query.get_filtered_diff(inputs).await?;
    info!(
        backend = ?query.config().backend,
        included = output.included.len(),
        "diff query complete"
    );

    match cli.output_format {
        OutputFormat::Json => output_json(&output)?,
        OutputFormat::Paths => output_paths(&output),
    }

    Ok(())
}

/// Overrides the configured clauses with any given on the command line.
/// Returns `None` when no category flag was passed.
fn filter_from_cli(cli: &Cli, configured: &DiffFilter) -> Option<DiffFilter> {
    let to_set =
        |categories: &[DiffCategory]| -> CategorySet { categories.iter().copied().collect() };
    let exclude = match (&cli.exclude_exactly, &cli.exclude_contains) {
        (Some(categories), _) => Some(ExcludeClause::Exactly(to_set(categories))),
        (None, Some(categories)) => Some(ExcludeClause::Contains(to_set(categories))),
        (None, None) => None,
    };
    let require = match (&cli.require_exactly, &cli.require_at_least) {
        (Some(categories), _) => Some(RequireClause::Exactly(to_set(categories))),
        (None, Some(categories)) => Some(RequireClause::AtLeast(to_set(categories))),
        (None, None) => None,
    };

    if exclude.is_none() && require.is_none() {
        return None;
    }

    Some(DiffFilter {
        exclude: exclude.or_else(|| configured.exclude.clone()),
        require: require.or_else(|| configured.require.clone()),
    })
}

fn output_json(output: &FilterDiffOutput) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

fn output_paths(output: &FilterDiffOutput) {
    for change in &output.included {
        println!("{}", change.file_path().display());
    }
}
