//! # grosserrat
//!
//! Harvests the public records of the Grosser Rat Basel-Stadt (the cantonal
//! parliament): members, the business items ("Geschäfte") they filed, and the
//! documents attached to those items.
//!
//! ## Features
//!
//! - Bounded-concurrency fetching with per-request timeouts and isolated
//!   failures
//! - Structural extraction of member, business and document tables
//! - Reconciliation of listing and detail pages, including a table of manual
//!   identifier corrections
//! - Download and metadata tagging of document PDFs
//! - SQLite persistence of every record set
//!
//! ## Usage
//!
//! ```sh
//! grosserrat run
//! grosserrat --db data/gr.sqlite business --member 42 --save-cache
//! ```
//!
//! ## Architecture
//!
//! 1. **Members**: member search POST, then every member page
//! 2. **Business**: member pages' listings, then business detail pages,
//!    reconciled into business items and documents
//! 3. **PDFs**: document payloads, tagged and filed by category

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod fetch;
mod models;
mod outputs;
mod pipeline;
mod reconcile;
mod scrapers;
mod store;
mod utils;

use cli::{BusinessArgs, Cli, Command, MembersArgs, PdfsArgs};
use config::{FetchSettings, TypeLookup};
use fetch::{BoundedFetcher, HttpSource};
use store::SqliteStore;
use url::Url;
use utils::ensure_writable_dir;

/// Everything a stage needs besides its own arguments.
struct Context {
    fetcher: BoundedFetcher<HttpSource>,
    store: SqliteStore,
    origin: Url,
    lookup: TypeLookup,
}

async fn run_members(ctx: &mut Context, args: &MembersArgs) -> Result<(), Box<dyn Error>> {
    let count = pipeline::members_stage(&ctx.fetcher, &mut ctx.store, &ctx.origin, &args.search()).await?;
    info!(count, "Stored members");
    Ok(())
}

async fn run_business(ctx: &mut Context, args: &BusinessArgs) -> Result<(), Box<dyn Error>> {
    let reconciled = pipeline::business_stage(
        &ctx.fetcher,
        &mut ctx.store,
        &ctx.origin,
        &ctx.lookup,
        &args.members,
        &args.cache(),
    )
    .await?;
    let report = &reconciled.report;
    info!(
        business = reconciled.business.len(),
        documents = reconciled.documents.len(),
        corrections = report.corrections,
        malformed = report.malformed_ids.len(),
        dropped = report.detail_documents_dropped,
        orphans = report.orphan_documents.len(),
        excluded = report.excluded_documents,
        "Stored business items and documents"
    );
    Ok(())
}

async fn run_pdfs(ctx: &mut Context, args: &PdfsArgs) -> Result<(), Box<dyn Error>> {
    // Early check: ensure the PDF dir is writable
    if let Err(e) = ensure_writable_dir(&args.pdf_dir).await {
        error!(
            path = %args.pdf_dir.display(),
            error = %e,
            "PDF output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    let outcome =
        pipeline::pdfs_stage(&ctx.fetcher, &mut ctx.store, &ctx.lookup, args.pdf_dir.clone()).await?;
    info!(
        written = outcome.files.len(),
        failed = outcome.failed,
        skipped = outcome.skipped,
        excluded = outcome.excluded,
        "Stored tagged files"
    );
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn dispatch(ctx: &mut Context, command: &Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Members(args) => run_members(ctx, args).await,
        Command::Business(args) => run_business(ctx, args).await,
        Command::Pdfs(args) => run_pdfs(ctx, args).await,
        Command::Run {
            members,
            business,
            pdfs,
        } => {
            run_members(ctx, members).await?;
            run_business(ctx, business).await?;
            run_pdfs(ctx, pdfs).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("grosserrat starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.command, db = %args.global.db.display(), "Parsed CLI arguments");

    let g = &args.global;
    let settings = FetchSettings::new(&g.origin, &g.user_agent, g.concurrency, g.timeout_secs)?;
    info!(
        origin = %settings.origin,
        concurrency = settings.concurrency,
        timeout_secs = g.timeout_secs,
        "Fetch settings"
    );

    let mut ctx = Context {
        fetcher: BoundedFetcher::new(HttpSource::new(&settings)?, &settings),
        store: SqliteStore::connect(&g.db)?,
        origin: settings.origin.clone(),
        lookup: TypeLookup::load(g.types.as_deref())?,
    };

    if let Err(e) = dispatch(&mut ctx, &args.command).await {
        error!(error = %e, "Harvest failed");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
