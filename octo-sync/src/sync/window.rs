use consumption_store::{ReadingStore, StoreError};

use crate::{
    octopus::SyncWindow,
    sync::{SyncError, SyncRequest},
    timefmt::format_api_timestamp,
};

/// Decide the fetch window for this run.
///
/// An explicit start always wins. Otherwise, with `infer`, the window starts
/// at the latest stored `interval_end` for the meter point; a missing table
/// is created and, like an empty one, falls back to the epoch default.
pub async fn resolve_window<S>(
    request: &SyncRequest,
    meter_point_id: &str,
    store: Option<&S>,
) -> Result<SyncWindow, SyncError>
where
    S: ReadingStore + ?Sized,
{
    let to = request.period_end;

    if let Some(start) = request.period_start {
        if request.infer {
            tracing::debug!("explicit period start given, skipping inference");
        }
        return Ok(SyncWindow::new(Some(start), to));
    }

    if !request.infer {
        return Ok(SyncWindow::new(None, to));
    }

    let store = store.ok_or(SyncError::StoreRequired)?;
    tracing::info!(mpan = meter_point_id, "inferring period_start from latest stored data");

    let from = match store.latest_interval_end(meter_point_id).await {
        Ok(Some(latest)) => {
            tracing::info!(
                latest = %format_api_timestamp(latest),
                "found latest consumption data, fetching from that point onwards"
            );
            Some(latest)
        }
        Ok(None) => {
            tracing::info!("no consumption data found in database, fetching from 1970-01-01");
            None
        }
        Err(StoreError::TableMissing) => {
            tracing::info!("table does not exist yet, creating it and fetching from 1970-01-01");
            store.ensure_schema().await?;
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "error inferring period_start");
            return Err(e.into());
        }
    };

    Ok(SyncWindow::new(from, to))
}
