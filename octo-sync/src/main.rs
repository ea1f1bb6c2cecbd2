use anyhow::Result;
use clap::Parser;
use consumption_store::PgStore;
use octo_sync::{
    config::AppConfig,
    observability,
    octopus::{Fetcher, HttpTransport},
    sync::{self, SyncReport, SyncRequest},
    timefmt::parse_cli_timestamp,
};
use time::OffsetDateTime;

/// Fetch electricity consumption from the Octopus API and store it in Postgres.
#[derive(Debug, Parser)]
#[command(name = "octo-sync", version)]
struct Cli {
    /// Start of the window (ISO-8601). Defaults to 1970-01-01, or the latest stored reading with --infer.
    #[arg(long, value_parser = parse_cli_timestamp)]
    period_start: Option<OffsetDateTime>,

    /// End of the window (ISO-8601). Defaults to now.
    #[arg(long, value_parser = parse_cli_timestamp)]
    period_end: Option<OffsetDateTime>,

    /// Infer --period-start from the latest interval_end already stored.
    #[arg(long)]
    infer: bool,

    /// Fetch and display records without writing them.
    #[arg(long, visible_alias = "dry-run")]
    verify_only: bool,

    /// Records to display in verify-only mode (default: all).
    #[arg(long)]
    limit: Option<usize>,
}

impl Cli {
    fn request(&self) -> SyncRequest {
        SyncRequest {
            period_start: self.period_start,
            period_end: self.period_end,
            infer: self.infer,
            verify_only: self.verify_only,
            limit: self.limit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();
    let cfg = AppConfig::load()?;
    let request = cli.request();

    // Connect before any fetch so an unreachable database fails the run early.
    let store = if request.needs_store() {
        let store = PgStore::connect(&cfg.database.uri, cfg.database.max_connections)
            .await?
            .with_batch_size(cfg.database.batch_size);
        Some(store)
    } else {
        tracing::info!("verify-only mode: no database connection");
        None
    };

    let transport = HttpTransport::new(cfg.octopus.api_key.clone(), cfg.octopus.timeout)?;
    let fetcher = Fetcher::new(transport, &cfg.octopus.mpan, &cfg.octopus.serial)?
        .with_base_url(&cfg.octopus.base_url)?
        .with_page_size(cfg.octopus.page_size);

    let report = sync::run(&request, &fetcher, store.as_ref()).await?;

    match report {
        SyncReport::NoData => tracing::warn!("run finished with no data"),
        SyncReport::Verified { fetched, displayed } => {
            tracing::info!(fetched, displayed, "verification finished")
        }
        SyncReport::Committed {
            records,
            pages,
            skipped,
        } => tracing::info!(records, pages, skipped, "sync finished"),
    }

    Ok(())
}
