use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use consumption_store::{db::consumption_queries, PgStore, Reading};
use octo_sync::{
    config::AppConfig,
    observability,
    sync::display_line,
    timefmt::{format_api_timestamp, parse_cli_timestamp},
};
use time::OffsetDateTime;

/// Reporting and maintenance over stored consumption readings.
#[derive(Debug, Parser)]
#[command(name = "consumption-report", version)]
struct Cli {
    /// Meter point to report on.
    #[arg(long, env = "OCTOPUS_ELECTRICITY_MPAN", global = true)]
    mpan: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Totals per UTC day and unit, newest first.
    Daily,
    /// Every reading for the meter point, newest first.
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Readings with interval_start in [from, to).
    Period {
        #[arg(long, value_parser = parse_cli_timestamp)]
        from: OffsetDateTime,
        #[arg(long, value_parser = parse_cli_timestamp)]
        to: OffsetDateTime,
    },
    /// One reading by storage id.
    Show {
        #[arg(long)]
        id: i64,
    },
    /// Remove one reading by storage id.
    Delete {
        #[arg(long)]
        id: i64,
    },
}

fn print_readings(readings: &[Reading], limit: Option<usize>) {
    let shown = limit.filter(|&l| l > 0).unwrap_or(readings.len());
    for (i, r) in readings.iter().take(shown).enumerate() {
        println!("{}", display_line(i + 1, r));
    }
    tracing::info!(
        shown = shown.min(readings.len()),
        total = readings.len(),
        "readings listed"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();
    let db = AppConfig::load_database()?;
    let store = PgStore::connect(&db.uri, db.max_connections).await?;
    let pool = store.pool();

    let mpan = || match cli.mpan.as_deref() {
        Some(m) => Ok(m),
        None => bail!("--mpan or OCTOPUS_ELECTRICITY_MPAN is required for this report"),
    };

    match &cli.command {
        Command::Daily => {
            let days = consumption_queries::daily_aggregation(pool, mpan()?).await?;
            for d in &days {
                println!(
                    "{} | {:>10.3} {} | {:>3} readings | {} → {}",
                    d.date,
                    d.total_consumption,
                    d.unit.as_deref().unwrap_or(consumption_store::domain::DEFAULT_UNIT),
                    d.reading_count,
                    format_api_timestamp(d.first_reading),
                    format_api_timestamp(d.last_reading),
                );
            }
            tracing::info!(days = days.len(), "daily aggregation listed");
        }
        Command::List { limit } => {
            let readings = consumption_queries::by_meter_point(pool, mpan()?).await?;
            print_readings(&readings, *limit);
        }
        Command::Period { from, to } => {
            if from >= to {
                bail!("--from must be before --to");
            }
            let readings = consumption_queries::by_period(pool, mpan()?, *from, *to).await?;
            print_readings(&readings, None);
        }
        Command::Show { id } => match consumption_queries::by_id(pool, *id).await? {
            Some(r) => println!("{}", display_line(1, &r)),
            None => bail!("no reading with id {id}"),
        },
        Command::Delete { id } => {
            if !consumption_queries::delete(pool, *id).await? {
                bail!("no reading with id {id}");
            }
            tracing::info!(id, "reading deleted");
        }
    }

    Ok(())
}
