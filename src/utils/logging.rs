//! Logging setup plus conditional logging macros that check a module-level
//! `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("This will log if ENABLE_LOGS is true");
//! ```

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
const LOG_GENERATIONS: u32 = 5;

/// Macro for conditional info logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Macro for conditional warn logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Macro for conditional error logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Macro for conditional debug logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Writes every log line to stdout and to the log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        self.file.flush()
    }
}

/// Initialize env_logger (reads RUST_LOG, defaults to info) writing to stdout
/// and `log_file`.
pub fn init(log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    rotate_if_oversized(log_file, MAX_LOG_BYTES, LOG_GENERATIONS)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .try_init()
        .context("logger already initialized")?;
    Ok(())
}

/// Shifts `log` -> `log.1` -> ... -> `log.<generations>` once `log` reaches
/// `max_bytes`. The oldest generation is overwritten.
fn rotate_if_oversized(log_file: &Path, max_bytes: u64, generations: u32) -> Result<()> {
    let size = match fs::metadata(log_file) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", log_file.display()))
        }
    };
    if size < max_bytes || generations == 0 {
        return Ok(());
    }

    for generation in (1..generations).rev() {
        let from = generation_path(log_file, generation);
        if from.exists() {
            fs::rename(&from, generation_path(log_file, generation + 1))
                .with_context(|| format!("failed to rotate {}", from.display()))?;
        }
    }
    fs::rename(log_file, generation_path(log_file, 1))
        .with_context(|| format!("failed to rotate {}", log_file.display()))?;
    Ok(())
}

fn generation_path(log_file: &Path, generation: u32) -> PathBuf {
    let mut name = log_file.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}
