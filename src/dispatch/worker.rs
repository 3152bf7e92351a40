use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

use crate::error::{ExtractionError, JobError};
use crate::extraction::{parse_fields, InferenceBackend};
use crate::models::{CaptureEvent, ExtractionRecord};
use crate::store::ResultStore;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Turns one captured still into one stored row.
pub struct ExtractionWorker {
    backend: Arc<dyn InferenceBackend>,
    store: ResultStore,
    prompt: String,
    timeout: Duration,
}

impl ExtractionWorker {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        store: ResultStore,
        prompt: String,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            prompt,
            timeout,
        }
    }

    /// Returns the data-row offset the record was stored at. The still is
    /// never retried here.
    pub async fn process(&self, event: &CaptureEvent) -> Result<usize, JobError> {
        log_info!("extracting fields from {}", event.path.display());

        let extraction = self.backend.extract(&event.path, &self.prompt);
        let text = tokio::time::timeout(self.timeout, extraction)
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout.as_secs()))??;
        log_debug!("model output for {}: {}", event.path.display(), text);

        let fields = parse_fields(&text)?;
        let record = ExtractionRecord::new(fields, event.path.display().to_string(), Local::now());
        let row = self.store.append(record).await?;
        Ok(row)
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::extraction::ModelStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::Path;

    struct Canned {
        answer: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl InferenceBackend for Canned {
        async fn extract(&self, _image: &Path, _prompt: &str) -> Result<String, ExtractionError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.answer.to_string())
        }

        async fn health_check(&self) -> Result<ModelStatus, ExtractionError> {
            unreachable!("not used by the worker")
        }
    }

    fn worker(answer: &'static str, delay: Duration, dir: &Path) -> ExtractionWorker {
        let store = ResultStore::new(dir.join("results.csv"), None).unwrap();
        ExtractionWorker::new(
            Arc::new(Canned { answer, delay }),
            store,
            "Extract fields as JSON".into(),
            Duration::from_millis(200),
        )
    }

    fn event() -> CaptureEvent {
        CaptureEvent::new("shots/shot_1.jpg".into(), Utc::now())
    }

    #[tokio::test]
    async fn good_answer_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(r#"{"total": "8.40"}"#, Duration::ZERO, dir.path());

        assert_eq!(worker.process(&event()).await.unwrap(), 0);
        assert_eq!(worker.store().row_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unparsable_answer_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker("no idea", Duration::ZERO, dir.path());

        let err = worker.process(&event()).await.unwrap_err();
        assert!(matches!(err, JobError::Extraction(ExtractionError::Parse(_))));
        assert_eq!(worker.store().row_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker("{}", Duration::from_secs(5), dir.path());

        let err = worker.process(&event()).await.unwrap_err();
        assert!(matches!(err, JobError::Extraction(ExtractionError::Timeout(_))));
    }

    #[tokio::test]
    async fn store_failure_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let worker = worker(r#"{"a": 1}"#, Duration::ZERO, dir.path());
        worker.store().shutdown();

        let err = worker.process(&event()).await.unwrap_err();
        assert!(matches!(err, JobError::Store(StoreError::WorkerGone)));
    }
}
