//! Blocking HTTP client for the remote telemetry/event store.
//!
//! - The store speaks a Firebase-RTDB-style REST dialect: topics are JSON
//!   documents addressed as `{base}/{topic}.json`, filtered with
//!   `orderBy`/`limitToLast`/`endAt` query parameters; POST appends a record
//!   under a server-assigned, sortable push key.
//! - Blocking client using `ureq` (no async); one shared agent whose
//!   timeout bounds every request.
//! - Decode failures report the JSON path via `serde_path_to_error`.

use crate::models::history::HistoryEvent;
use crate::models::telemetry::LiveSnapshot;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Topic the field controllers write reading snapshots to.
pub const LIVE_TOPIC: &str = "live_data";
/// Topic transition events are appended to.
pub const HISTORY_TOPIC: &str = "history";

#[derive(Debug)]
pub enum StoreClientError {
    Transport(String),
    Http { status: u16, message: String },
    Decode(String),
}

impl core::fmt::Display for StoreClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreClientError::Transport(s) => write!(f, "transport error: {}", s),
            StoreClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            StoreClientError::Decode(s) => write!(f, "decode error: {}", s),
        }
    }
}

impl std::error::Error for StoreClientError {}

/// The store operations the monitoring engine needs. `StoreClient` is the
/// production implementation; tests substitute an in-memory store.
pub trait TelemetryStore {
    /// Single most recent reading snapshot, or `None` when the topic is empty.
    fn latest_snapshot(&self) -> Result<Option<LiveSnapshot>, StoreClientError>;
    /// Append one immutable record to the event log.
    fn append_event(&self, event: &HistoryEvent) -> Result<(), StoreClientError>;
    /// Keys of every event with `timestamp <= cutoff_millis`.
    fn expired_event_keys(&self, cutoff_millis: i64) -> Result<Vec<String>, StoreClientError>;
    /// Remove one event by key. Deleting an absent key is a server-side no-op.
    fn delete_event(&self, key: &str) -> Result<(), StoreClientError>;
}

pub struct StoreClient {
    agent: ureq::Agent,
    base_url: String,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        StoreClient { agent, base_url }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/{}.json", self.base_url, topic)
    }

    fn record_url(&self, topic: &str, key: &str) -> String {
        format!("{}/{}/{}.json", self.base_url, topic, key)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, StoreClientError> {
        let mut req = self.agent.get(url).set("Accept", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }
        match req.call() {
            Ok(res) => {
                let mut de = serde_json::Deserializer::from_reader(res.into_reader());
                serde_path_to_error::deserialize(&mut de)
                    .map_err(|e| StoreClientError::Decode(e.to_string()))
            }
            Err(e) => Err(request_error(e)),
        }
    }

    /// Most recent raw record on the live topic together with its
    /// server-assigned key. Requests only the last entry to bound bandwidth.
    pub fn latest_snapshot_entry(&self) -> Result<Option<(String, Value)>, StoreClientError> {
        let batch: Option<BTreeMap<String, Value>> = self.get_json(
            &self.topic_url(LIVE_TOPIC),
            &[
                ("orderBy", "\"$key\"".to_string()),
                ("limitToLast", "1".to_string()),
            ],
        )?;
        // limitToLast already narrows to one entry; taking the last key keeps
        // the "newest wins" rule even if the server returns more.
        Ok(batch.and_then(|records| records.into_iter().next_back()))
    }
}

impl TelemetryStore for StoreClient {
    fn latest_snapshot(&self) -> Result<Option<LiveSnapshot>, StoreClientError> {
        match self.latest_snapshot_entry()? {
            None => Ok(None),
            Some((_, value)) => serde_path_to_error::deserialize(value)
                .map(Some)
                .map_err(|e| StoreClientError::Decode(e.to_string())),
        }
    }

    fn append_event(&self, event: &HistoryEvent) -> Result<(), StoreClientError> {
        let url = self.topic_url(HISTORY_TOPIC);
        match self
            .agent
            .post(&url)
            .set("Accept", "application/json")
            .send_json(event)
        {
            Ok(_) => Ok(()),
            Err(e) => Err(request_error(e)),
        }
    }

    fn expired_event_keys(&self, cutoff_millis: i64) -> Result<Vec<String>, StoreClientError> {
        let batch: Option<BTreeMap<String, Value>> = self.get_json(
            &self.topic_url(HISTORY_TOPIC),
            &[
                ("orderBy", "\"timestamp\"".to_string()),
                ("endAt", cutoff_millis.to_string()),
            ],
        )?;
        Ok(batch.map(|records| records.into_keys().collect()).unwrap_or_default())
    }

    fn delete_event(&self, key: &str) -> Result<(), StoreClientError> {
        match self.agent.delete(&self.record_url(HISTORY_TOPIC, key)).call() {
            Ok(_) => Ok(()),
            Err(e) => Err(request_error(e)),
        }
    }
}

fn request_error(e: ureq::Error) -> StoreClientError {
    match e {
        ureq::Error::Transport(t) => StoreClientError::Transport(t.to_string()),
        ureq::Error::Status(status, res) => {
            let message = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
            StoreClientError::Http { status, message }
        }
    }
}
