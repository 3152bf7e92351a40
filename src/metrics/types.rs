use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_captures: u64,
    pub successful_extractions: u64,
    pub failed_extractions: u64,
    pub started_at: DateTime<Utc>,
    pub runtime_secs: f64,
}

impl StatsSnapshot {
    /// Captures still being extracted (or queued).
    pub fn in_flight(&self) -> u64 {
        self.total_captures
            .saturating_sub(self.successful_extractions + self.failed_extractions)
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "captures: {}, succeeded: {}, failed: {}, in flight: {}, runtime: {:.1}s",
            self.total_captures,
            self.successful_extractions,
            self.failed_extractions,
            self.in_flight(),
            self.runtime_secs
        )
    }
}
