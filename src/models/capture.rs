use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A persisted still waiting for extraction. Produced once by the capture
/// controller and consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl CaptureEvent {
    pub fn new(path: PathBuf, timestamp: DateTime<Utc>) -> Self {
        Self { path, timestamp }
    }
}
