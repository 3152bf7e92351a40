//! Error kinds for each pipeline component.
//!
//! Every kind is caught at its component boundary and turned into a log line
//! plus a counter update. Only an unrecoverable [`DeviceError`] is allowed to
//! end the capture loop.

use std::path::PathBuf;

/// Camera open/read failures.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to open camera {device_id}: {message}")]
    Open { device_id: u32, message: String },

    #[error("frame read failed: {0}")]
    Read(String),

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("camera session is not open")]
    NotOpen,

    #[error("no camera backend is available on this platform")]
    Unsupported,
}

/// Foreground mask computation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DetectionError {
    #[error("detection frame is {actual:?}, background model expects {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("detection frame is empty")]
    EmptyFrame,
}

/// Writing a captured frame to disk failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to persist frame to {path}: {source}")]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: image::ImageError,
}

/// Inference call or output parsing failures.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("inference response had no content")]
    EmptyResponse,

    #[error("model output is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model output is JSON but not an object")]
    NotAnObject,

    #[error("inference timed out after {0}s")]
    Timeout(u64),
}

/// Tabular artifact failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("result file {0} has no header row")]
    MissingHeader(PathBuf),

    #[error("result store worker is not running")]
    WorkerGone,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        StoreError::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Job submission failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher is shut down and no longer accepts captures")]
    Closed,
}

/// Why one extraction job ended without a stored row.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
