use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    pub device_id: u32,
    pub high_res: (u32, u32),
    pub detect_res: (u32, u32),
    /// Consecutive failed reads tolerated before the device is reopened.
    #[serde(default = "default_read_failure_budget")]
    pub read_failure_budget: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    pub motion_threshold: u32,
    pub stable_frames_trigger: u32,
    pub capture_interval_sec: f64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    pub max_workers: usize,
    #[serde(default = "default_stats_interval_sec")]
    pub stats_interval_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub endpoint: String,
    pub name: String,
    pub prompt: String,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    pub shots_dir: PathBuf,
    pub results_file: PathBuf,
    pub log_file: PathBuf,
    /// Fixed header for a new results file. Falls back to the first
    /// record's fields when absent.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub processing: ProcessingSettings,
    pub model: ModelSettings,
    pub output: OutputSettings,
}

/// Still names carry millisecond timestamps; captures may not be closer.
const MIN_CAPTURE_INTERVAL_SEC: f64 = 0.001;

fn default_read_failure_budget() -> u32 {
    30
}

fn default_jpeg_quality() -> u8 {
    95
}

fn default_stats_interval_sec() -> u64 {
    60
}

fn default_timeout_sec() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    256
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config = Self::from_json(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let (hw, hh) = self.camera.high_res;
        if hw == 0 || hh == 0 {
            bail!("camera.high_res must be non-zero, got {hw}x{hh}");
        }
        let (dw, dh) = self.camera.detect_res;
        if dw == 0 || dh == 0 {
            bail!("camera.detect_res must be non-zero, got {dw}x{dh}");
        }
        if self.camera.read_failure_budget == 0 {
            bail!("camera.read_failure_budget must be at least 1");
        }
        if self.detection.stable_frames_trigger == 0 {
            bail!("detection.stable_frames_trigger must be at least 1");
        }
        if !self.detection.capture_interval_sec.is_finite()
            || self.detection.capture_interval_sec < MIN_CAPTURE_INTERVAL_SEC
        {
            bail!(
                "detection.capture_interval_sec must be at least {}, got {}",
                MIN_CAPTURE_INTERVAL_SEC,
                self.detection.capture_interval_sec
            );
        }
        if !(1..=100).contains(&self.detection.jpeg_quality) {
            bail!("detection.jpeg_quality must be within 1..=100");
        }
        if self.processing.max_workers == 0 {
            bail!("processing.max_workers must be at least 1");
        }
        if self.model.prompt.trim().is_empty() {
            bail!("model.prompt must not be empty");
        }
        if self.model.endpoint.trim().is_empty() {
            bail!("model.endpoint must not be empty");
        }
        if self.model.timeout_sec == 0 {
            bail!("model.timeout_sec must be at least 1");
        }
        Ok(())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs_f64(self.detection.capture_interval_sec)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.processing.stats_interval_sec.max(1))
    }
}
