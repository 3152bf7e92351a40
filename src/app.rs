use std::{fs, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::camera::{platform_camera, CameraDevice, DeviceSession};
use crate::dispatch::{Dispatcher, ExtractionWorker};
use crate::extraction::{HttpBackend, InferenceBackend, ModelStatus};
use crate::metrics::{Stats, StatsSnapshot};
use crate::sensing::{
    BackgroundModel, CaptureController, CaptureLoop, LoopStatus, MotionDetector, MotionGate,
    SensingController,
};
use crate::settings::AppConfig;
use crate::store::ResultStore;

/// Capture events buffered between the loop and the dispatcher. Anything
/// beyond this stalls the loop until a worker slot frees up.
const CAPTURE_QUEUE_DEPTH: usize = 1;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub stats: StatsSnapshot,
    pub loop_status: Option<LoopStatus>,
}

impl RunSummary {
    /// A run whose camera could not be (re)opened is an error once it has
    /// drained, so supervisors see a failed exit.
    pub fn into_result(self) -> Result<Self> {
        if let Some(err) = self
            .loop_status
            .as_ref()
            .and_then(|status| status.device_error.as_deref())
        {
            bail!("capture stopped after a camera failure: {err} ({})", self.stats);
        }
        Ok(self)
    }
}

/// Creates the output locations and asks the model backend what it serves.
pub async fn check(config: &AppConfig) -> Result<ModelStatus> {
    prepare_output(config)?;
    let backend = http_backend(config)?;
    let status = backend
        .health_check()
        .await
        .with_context(|| format!("model backend at {} is unreachable", config.model.endpoint))?;
    Ok(status)
}

/// Runs the pipeline against the platform camera until SIGINT/SIGTERM or a
/// fatal camera failure.
pub async fn run(config: AppConfig) -> Result<RunSummary> {
    let status = check(&config).await?;
    if !status.model_loaded {
        bail!(
            "model {} is not served by {} (available: {})",
            status.model_name,
            status.endpoint,
            status.available.join(", ")
        );
    }
    info!("model {} is ready at {}", status.model_name, status.endpoint);

    let camera = platform_camera().context("no usable camera backend")?;
    let backend: Arc<dyn InferenceBackend> = Arc::new(http_backend(&config)?);

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    run_pipeline(&config, camera, BackgroundModel::new(), backend, cancel)
        .await?
        .into_result()
}

/// Wires camera, motion detector and backend into the full pipeline and
/// drives it to completion. Returns once `cancel` fires (or the capture loop
/// stops on its own) and every accepted capture has been counted.
pub async fn run_pipeline<D, M>(
    config: &AppConfig,
    camera: D,
    detector: M,
    backend: Arc<dyn InferenceBackend>,
    cancel: CancellationToken,
) -> Result<RunSummary>
where
    D: CameraDevice + 'static,
    M: MotionDetector + 'static,
{
    prepare_output(config)?;

    let store = ResultStore::new(
        config.output.results_file.clone(),
        config.output.columns.clone(),
    )?;
    let stats = Stats::new();
    let worker = ExtractionWorker::new(
        backend,
        store.clone(),
        config.model.prompt.clone(),
        Duration::from_secs(config.model.timeout_sec),
    );
    let dispatcher = Dispatcher::new(worker, config.processing.max_workers, stats.clone());

    let (events_tx, events_rx) = mpsc::channel(CAPTURE_QUEUE_DEPTH);
    let capture_loop = CaptureLoop::new(
        DeviceSession::new(camera, config.camera.device_id, config.camera.high_res),
        MotionGate::new(
            detector,
            config.camera.detect_res,
            config.detection.motion_threshold,
            config.detection.stable_frames_trigger,
        ),
        CaptureController::new(
            config.output.shots_dir.clone(),
            config.capture_interval(),
            config.detection.jpeg_quality,
        ),
        config.camera.read_failure_budget,
        events_tx,
        cancel.clone(),
    );

    let mut sensing = SensingController::new(cancel.clone());
    sensing.start_sensing(capture_loop)?;
    let reporter = spawn_stats_reporter(stats.clone(), config.stats_interval(), cancel.clone());

    info!(
        "pipeline running: {} worker(s), results in {}",
        dispatcher.max_workers(),
        store.path().display()
    );

    // Returns once the loop has exited and dropped its sender.
    dispatcher.run_intake(events_rx).await;

    let loop_status = match sensing.join().await {
        Ok(status) => status,
        Err(err) => {
            error!("{err:#}");
            None
        }
    };
    if let Some(status) = &loop_status {
        info!(
            "capture loop finished in state {:?}: {} frames, {} captures, device open: {}",
            status.state, status.frame_count, status.capture_count, status.device_open
        );
    }

    // The loop may have stopped by itself; make sure everything else stops too.
    sensing.cancel();
    dispatcher.shutdown(true).await;
    if let Err(err) = reporter.await {
        warn!("stats reporter ended abnormally: {err}");
    }

    let stats = stats.snapshot();
    info!("final stats - {stats}");

    tokio::task::spawn_blocking(move || store.shutdown())
        .await
        .context("result store shutdown failed")?;

    Ok(RunSummary { stats, loop_status })
}

/// Creates the shots directory and the results file's parent.
pub fn prepare_output(config: &AppConfig) -> Result<()> {
    let shots = &config.output.shots_dir;
    fs::create_dir_all(shots)
        .with_context(|| format!("failed to create shots directory {}", shots.display()))?;

    if let Some(parent) = config
        .output
        .results_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create results directory {}", parent.display()))?;
    }
    Ok(())
}

fn http_backend(config: &AppConfig) -> Result<HttpBackend> {
    HttpBackend::new(
        &config.model.endpoint,
        &config.model.name,
        config.model.max_tokens,
    )
    .context("failed to build model client")
}

fn spawn_signal_listener(cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let terminated = terminate.recv();
        #[cfg(not(unix))]
        let terminated = std::future::pending::<Option<()>>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!("failed to listen for Ctrl-C: {err}");
                    return;
                }
                info!("interrupt received, shutting down");
            }
            _ = terminated => info!("termination requested, shutting down"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
    Ok(())
}

fn spawn_stats_reporter(
    stats: Stats,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if every.is_zero() {
            cancel.cancelled().await;
            return;
        }

        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => info!("stats - {}", stats.snapshot()),
                _ = cancel.cancelled() => break,
            }
        }
    })
}
