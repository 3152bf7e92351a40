use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use log::{error, info};
use tokio::sync::oneshot;

mod table;

pub use table::ResultTable;

use crate::error::StoreError;
use crate::models::ExtractionRecord;

type StoreTask = Box<dyn FnOnce(&mut ResultTable) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StoreInner {
    fn stop(&self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to result store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join result store thread: {join_err:?}");
            }
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Shared tabular artifact. One dedicated thread owns the file, so appends
/// from any number of workers run strictly one at a time, in arrival order.
#[derive(Clone)]
pub struct ResultStore {
    inner: Arc<StoreInner>,
    path: Arc<PathBuf>,
}

impl ResultStore {
    pub fn new(path: PathBuf, columns: Option<Vec<String>>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create results directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let mut table = ResultTable::new(path.clone(), columns);

        let worker = thread::Builder::new()
            .name("docucam-store".into())
            .spawn(move || {
                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => task(&mut table),
                        StoreCommand::Shutdown => break,
                    }
                }
                info!("Result store thread shutting down");
            })
            .with_context(|| "failed to spawn result store thread")?;

        info!("Result store ready at {}", path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut ResultTable) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |table| {
            let result = task(table);
            if reply_tx.send(result).is_err() {
                error!("Result store caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|_| StoreError::WorkerGone)?;

        reply_rx.await.map_err(|_| StoreError::WorkerGone)?
    }

    /// Appends one record; returns the data-row offset it was written at.
    pub async fn append(&self, record: ExtractionRecord) -> Result<usize, StoreError> {
        self.execute(move |table| table.append(&record)).await
    }

    pub async fn row_count(&self) -> Result<usize, StoreError> {
        self.execute(|table| table.row_count()).await
    }

    /// Finishes queued appends, then stops the writer thread. Later calls
    /// fail with `WorkerGone`.
    pub fn shutdown(&self) {
        self.inner.stop();
    }
}
