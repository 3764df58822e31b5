//! Takeoff runner
//!
//! Indexes a standards catalog, extracts items from rendered drawing pages,
//! validates materials, merges duplicates and writes the run report as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use takeoff::ai::OpenAI;
use takeoff::{
    ApiKeys, MemoryVectorIndex, Orchestrator, PageImage, RunInput, StandardsStore, TakeoffConfig,
    TavilyWebSearcher, WebSearcherExt,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "takeoff")]
#[command(about = "Utility takeoff: extract, validate and deduplicate drawing items")]
struct Cli {
    /// Directory of standards catalog JSON files
    #[arg(long)]
    catalog: PathBuf,

    /// Rendered page images, in drawing order
    #[arg(required = true)]
    pages: Vec<PathBuf>,

    /// Extra notes appended to the extraction instruction
    #[arg(long)]
    hint: Option<String>,

    /// Where to write the report (stdout when omitted)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Chat and vision model
    #[arg(long, default_value = "gpt-4o")]
    model: String,

    /// External search requests per second
    #[arg(long, default_value_t = 2)]
    search_rps: u32,
}

fn load_page(page_number: u32, path: &Path) -> Result<PageImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("page-{page_number}"));
    let media_type = path
        .extension()
        .map(|e| PageImage::media_type_for_extension(&e.to_string_lossy()))
        .unwrap_or("image/png");

    Ok(PageImage::new(page_number, bytes)
        .with_name(name)
        .with_media_type(media_type))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,takeoff=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = TakeoffConfig::from_env().context("Failed to load configuration")?;
    let keys = ApiKeys::from_env();

    let store = StandardsStore::from_dir(&cli.catalog)
        .with_context(|| format!("Failed to load catalog from {}", cli.catalog.display()))?;
    let stats = store.stats();
    tracing::info!(
        documents = stats.total,
        abbreviations = stats.abbreviations,
        disciplines = ?store.disciplines(),
        categories = ?store.categories(),
        "Catalog loaded"
    );

    let pages = cli
        .pages
        .iter()
        .zip(1u32..)
        .map(|(path, n)| load_page(n, path))
        .collect::<Result<Vec<_>>>()?;
    if pages.is_empty() {
        bail!("No pages given");
    }

    let ai = Arc::new(OpenAI::new(keys.require_openai()?.clone()).with_model(&cli.model));
    let searcher =
        Arc::new(TavilyWebSearcher::new(keys.require_tavily()?.clone()).rate_limited(cli.search_rps));

    let orchestrator = Orchestrator::build(
        Arc::new(store),
        Arc::clone(&ai),
        Arc::new(MemoryVectorIndex::new()),
        searcher,
        ai,
        &config,
    )
    .await
    .context("Failed to index catalog")?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            on_ctrl_c.cancel();
        }
    });

    let mut input = RunInput::new(pages);
    if let Some(hint) = cli.hint {
        input = input.with_hint(hint);
    }

    let report = orchestrator
        .run_with_cancel(input, &cancel)
        .await
        .context("Takeoff run failed")?;

    let json = report.to_json_pretty()?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{json}"),
    }

    tracing::info!(
        items = report.summary.total,
        review = report.materials.iter().filter(|m| m.status.needs_review()).count(),
        alerts = report.alerts.len(),
        warnings = report.warnings.len(),
        "Takeoff complete"
    );
    Ok(())
}
