use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use consumption_store::{Reading, ReadingStore, StoreError};
use reqwest::Url;
use time::{OffsetDateTime, UtcOffset};

use crate::octopus::{ApiResponse, ApiTransport, FetchError, PageHandler};

/// Shared, ordered record of requests and page callbacks.
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn json_response(status: u16, body: serde_json::Value) -> ApiResponse {
    ApiResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: serde_json::to_vec(&body).unwrap(),
        request_timestamp: OffsetDateTime::now_utc(),
    }
}

/// Replays canned responses in order and logs every GET.
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<ApiResponse>>,
    events: EventLog,
}

impl ScriptedTransport {
    pub(crate) fn new(events: EventLog, responses: Vec<ApiResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            events,
        }
    }

    pub(crate) fn requested_urls(events: &EventLog) -> Vec<String> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix("GET ").map(str::to_string))
            .collect()
    }
}

#[async_trait::async_trait]
impl ApiTransport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<ApiResponse, FetchError> {
        self.events.lock().unwrap().push(format!("GET {url}"));
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| panic!("unexpected request to {url}")))
    }
}

/// Page handler that logs and keeps a copy of every page.
pub(crate) struct RecordingHandler {
    events: EventLog,
    pub(crate) pages: Vec<Vec<Reading>>,
}

impl RecordingHandler {
    pub(crate) fn new(events: EventLog) -> Self {
        Self {
            events,
            pages: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl PageHandler for RecordingHandler {
    async fn on_page(&mut self, readings: &[Reading]) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("page {}", readings.len()));
        self.pages.push(readings.to_vec());
        Ok(())
    }
}

type Key = (String, String, OffsetDateTime);

#[derive(Default)]
struct MemoryState {
    table_exists: bool,
    schema_calls: usize,
    next_id: i64,
    rows: HashMap<Key, Reading>,
}

/// In-memory stand-in with the same upsert semantics as the Postgres store.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub(crate) fn with_table() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().table_exists = true;
        store
    }

    pub(crate) fn schema_calls(&self) -> usize {
        self.state.lock().unwrap().schema_calls
    }

    pub(crate) fn table_exists(&self) -> bool {
        self.state.lock().unwrap().table_exists
    }

    pub(crate) fn rows(&self) -> Vec<Reading> {
        let mut rows: Vec<_> = self.state.lock().unwrap().rows.values().cloned().collect();
        rows.sort_by_key(|r| r.interval_start);
        rows
    }

    fn key(r: &Reading) -> Key {
        (
            r.meter_point_id.clone(),
            r.meter_serial.clone(),
            r.interval_start.to_offset(UtcOffset::UTC),
        )
    }

    fn upsert_locked(state: &mut MemoryState, reading: &Reading) -> Reading {
        let key = Self::key(reading);
        match state.rows.get_mut(&key) {
            Some(stored) => {
                stored.consumption = reading.consumption;
                stored.interval_end = reading.interval_end;
                stored.unit = reading.unit.clone();
                stored.clone()
            }
            None => {
                state.next_id += 1;
                let mut stored = reading.clone();
                stored.storage_id = Some(state.next_id);
                stored.created_at = Some(OffsetDateTime::now_utc());
                state.rows.insert(key, stored.clone());
                stored
            }
        }
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.schema_calls += 1;
        state.table_exists = true;
        Ok(())
    }

    async fn upsert(&self, reading: &Reading) -> Result<Reading, StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.table_exists {
            return Err(StoreError::TableMissing);
        }
        Ok(Self::upsert_locked(&mut state, reading))
    }

    async fn upsert_batch(&self, readings: &[Reading]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        if !state.table_exists {
            return Err(StoreError::TableMissing);
        }
        let mut touched = HashSet::new();
        for r in readings {
            touched.insert(Self::key(r));
            Self::upsert_locked(&mut state, r);
        }
        Ok(touched.len() as u64)
    }

    async fn latest_interval_end(
        &self,
        meter_point_id: &str,
    ) -> Result<Option<OffsetDateTime>, StoreError> {
        let state = self.state.lock().unwrap();
        if !state.table_exists {
            return Err(StoreError::TableMissing);
        }
        Ok(state
            .rows
            .values()
            .filter(|r| r.meter_point_id == meter_point_id)
            .map(|r| r.interval_end)
            .max())
    }
}
