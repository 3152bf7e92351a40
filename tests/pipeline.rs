use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use image::{GrayImage, Rgb, RgbImage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use docucam_lib::app::run_pipeline;
use docucam_lib::camera::{CameraDevice, DeviceSession};
use docucam_lib::dispatch::{Dispatcher, ExtractionWorker};
use docucam_lib::error::{DetectionError, DeviceError, ExtractionError};
use docucam_lib::extraction::{InferenceBackend, ModelStatus};
use docucam_lib::metrics::Stats;
use docucam_lib::models::{CaptureEvent, Frame};
use docucam_lib::sensing::{
    BackgroundModel, CaptureController, CaptureLoop, Classification, LoopState, MotionDetector,
    MotionGate,
};
use docucam_lib::settings::AppConfig;
use docucam_lib::store::ResultStore;

const STILL: u32 = 0;
const BUSY: u32 = 500;

/// Camera that plays back a script of good (`true`) and failed (`false`)
/// reads, then keeps producing frames.
struct ScriptedCamera {
    reads: VecDeque<bool>,
    opens: Arc<AtomicU32>,
    pace: Duration,
}

impl ScriptedCamera {
    fn new(reads: Vec<bool>) -> (Self, Arc<AtomicU32>) {
        let opens = Arc::new(AtomicU32::new(0));
        let camera = Self {
            reads: reads.into(),
            opens: opens.clone(),
            pace: Duration::ZERO,
        };
        (camera, opens)
    }
}

impl CameraDevice for ScriptedCamera {
    fn open(&mut self, _device_id: u32, _resolution: (u32, u32)) -> Result<(), DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self) -> Result<RgbImage, DeviceError> {
        if !self.pace.is_zero() {
            std::thread::sleep(self.pace);
        }
        match self.reads.pop_front() {
            Some(false) => Err(DeviceError::Read("dropped frame".into())),
            _ => Ok(RgbImage::from_pixel(32, 24, Rgb([200, 200, 200]))),
        }
    }

    fn release(&mut self) {}
}

/// Motion detector that reports scripted foreground counts, then stillness.
struct ScriptedMotion {
    counts: Arc<Mutex<VecDeque<u32>>>,
}

impl ScriptedMotion {
    fn new(counts: Vec<u32>) -> (Self, Arc<Mutex<VecDeque<u32>>>) {
        let counts = Arc::new(Mutex::new(VecDeque::from(counts)));
        (
            Self {
                counts: counts.clone(),
            },
            counts,
        )
    }
}

impl MotionDetector for ScriptedMotion {
    fn foreground_pixel_count(&mut self, _small: &GrayImage) -> Result<u32, DetectionError> {
        Ok(self.counts.lock().unwrap().pop_front().unwrap_or(STILL))
    }
}

/// Backend whose answer and latency depend on the still's file name.
struct FakeModel {
    slow: Duration,
}

#[async_trait]
impl InferenceBackend for FakeModel {
    async fn extract(&self, image: &Path, _prompt: &str) -> Result<String, ExtractionError> {
        let name = image.file_stem().unwrap().to_string_lossy().into_owned();
        if name.contains("slow") {
            tokio::time::sleep(self.slow).await;
        }
        if name.contains("broken") {
            return Err(ExtractionError::EmptyResponse);
        }
        Ok(format!(
            "Sure! Here is the data:\n{{\"document\": \"{name}\", \"total\": 12.5}}\nDone."
        ))
    }

    async fn health_check(&self) -> Result<ModelStatus, ExtractionError> {
        Ok(ModelStatus {
            model_loaded: true,
            model_name: "fake".into(),
            endpoint: "memory".into(),
            available: vec!["fake".into()],
        })
    }
}

fn dispatcher(
    backend: FakeModel,
    max_workers: usize,
    results: PathBuf,
) -> (Dispatcher, ResultStore) {
    let store = ResultStore::new(results, None).unwrap();
    let worker = ExtractionWorker::new(
        Arc::new(backend),
        store.clone(),
        "Return the fields as JSON".into(),
        Duration::from_secs(5),
    );
    (Dispatcher::new(worker, max_workers, Stats::new()), store)
}

fn event(name: &str) -> CaptureEvent {
    CaptureEvent::new(PathBuf::from(format!("shots/{name}.jpg")), Utc::now())
}

fn image_paths(results: &Path) -> Vec<String> {
    let mut reader = csv::Reader::from_path(results).unwrap();
    let column = reader
        .headers()
        .unwrap()
        .iter()
        .position(|h| h == "image_path")
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap()[column].to_string())
        .collect()
}

#[test]
fn stable_scene_captures_once_per_interval() {
    let dir = tempfile::tempdir().unwrap();
    let (camera, _opens) = ScriptedCamera::new(vec![]);
    let mut counts = vec![BUSY; 10];
    counts.extend([STILL; 10]);
    let (motion, script) = ScriptedMotion::new(counts);
    let (tx, mut rx) = mpsc::channel(8);

    let mut capture_loop = CaptureLoop::new(
        DeviceSession::new(camera, 0, (32, 24)),
        MotionGate::new(motion, (8, 6), 10, 5),
        CaptureController::new(dir.path().to_path_buf(), Duration::from_millis(400), 90),
        30,
        tx,
        CancellationToken::new(),
    );
    assert_eq!(capture_loop.tick(), LoopState::Running);

    for _ in 0..10 {
        capture_loop.tick();
    }
    assert!(rx.try_recv().is_err(), "moving frames never capture");

    for _ in 0..4 {
        capture_loop.tick();
    }
    assert!(rx.try_recv().is_err(), "four stable frames are not enough");
    capture_loop.tick();
    let first = rx.try_recv().expect("capture on the fifth stable frame");
    assert!(first.path.exists());

    for _ in 0..5 {
        capture_loop.tick();
    }
    assert!(rx.try_recv().is_err(), "still inside the capture interval");
    assert_eq!(capture_loop.status().capture_count, 1);

    std::thread::sleep(Duration::from_millis(450));
    script.lock().unwrap().extend([STILL; 5]);
    capture_loop.tick();
    let second = rx.try_recv().expect("capture once the interval has passed");
    assert_ne!(first.path, second.path);
    assert_eq!(capture_loop.status().capture_count, 2);
}

#[test]
fn motion_resets_the_stable_run() {
    let dir = tempfile::tempdir().unwrap();
    let (camera, _opens) = ScriptedCamera::new(vec![]);
    let (motion, _script) =
        ScriptedMotion::new(vec![STILL, STILL, BUSY, STILL, STILL, STILL]);
    let (tx, mut rx) = mpsc::channel(8);

    let mut capture_loop = CaptureLoop::new(
        DeviceSession::new(camera, 0, (32, 24)),
        MotionGate::new(motion, (8, 6), 10, 3),
        CaptureController::new(dir.path().to_path_buf(), Duration::ZERO, 90),
        30,
        tx,
        CancellationToken::new(),
    );
    capture_loop.tick();
    for _ in 0..5 {
        capture_loop.tick();
        assert!(rx.try_recv().is_err());
    }
    capture_loop.tick();
    assert!(rx.try_recv().is_ok());
}

#[test]
fn background_model_settles_on_a_static_scene() {
    let (w, h) = (16, 12);
    let mut gate = MotionGate::new(BackgroundModel::new(), (w, h), 4, 2);
    let scene = RgbImage::from_pixel(w, h, Rgb([90, 120, 30]));

    assert_eq!(gate.classify(&Frame::new(scene.clone())), Classification::Moving);
    assert_eq!(gate.classify(&Frame::new(scene.clone())), Classification::Stable);
    assert!(!gate.is_ready());
    assert_eq!(gate.classify(&Frame::new(scene.clone())), Classification::Stable);
    assert!(gate.is_ready());

    let hand = RgbImage::from_pixel(w, h, Rgb([250, 250, 250]));
    assert_eq!(gate.classify(&Frame::new(hand)), Classification::Moving);
    assert!(!gate.is_ready());
}

#[test]
fn reconnect_waits_for_the_full_failure_budget() {
    let dir = tempfile::tempdir().unwrap();
    let (camera, opens) = ScriptedCamera::new(vec![false; 59]);
    let (motion, _script) = ScriptedMotion::new(vec![]);
    let (tx, _rx) = mpsc::channel(8);

    let mut capture_loop = CaptureLoop::new(
        DeviceSession::new(camera, 0, (32, 24)),
        MotionGate::new(motion, (8, 6), 10, 1000),
        CaptureController::new(dir.path().to_path_buf(), Duration::ZERO, 90),
        30,
        tx,
        CancellationToken::new(),
    );
    capture_loop.tick();

    for _ in 0..29 {
        assert_eq!(capture_loop.tick(), LoopState::Running);
    }
    assert_eq!(opens.load(Ordering::SeqCst), 1, "29 failures stay within budget");

    assert_eq!(capture_loop.tick(), LoopState::Reconnecting);
    assert_eq!(capture_loop.tick(), LoopState::Running);
    assert_eq!(opens.load(Ordering::SeqCst), 2);

    // 29 more failures after the reconnect, then a good frame resets the count.
    for _ in 0..30 {
        assert_eq!(capture_loop.tick(), LoopState::Running);
    }
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(capture_loop.status().frame_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_extraction_is_counted_and_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.csv");
    let (dispatcher, store) = dispatcher(FakeModel { slow: Duration::ZERO }, 2, results.clone());

    dispatcher.submit(event("shot_broken")).await.unwrap();
    dispatcher.shutdown(true).await;

    let stats = dispatcher.stats().snapshot();
    assert_eq!(stats.total_captures, 1);
    assert_eq!(stats.successful_extractions, 0);
    assert_eq!(stats.failed_extractions, 1);
    assert_eq!(store.row_count().await.unwrap(), 0);
    assert!(!results.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rows_land_in_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.csv");
    let (dispatcher, _store) = dispatcher(
        FakeModel {
            slow: Duration::from_millis(300),
        },
        2,
        results.clone(),
    );

    dispatcher.submit(event("shot_1_slow")).await.unwrap();
    dispatcher.submit(event("shot_2")).await.unwrap();
    dispatcher.shutdown(true).await;

    assert_eq!(
        image_paths(&results),
        vec!["shots/shot_2.jpg", "shots/shot_1_slow.jpg"]
    );
    assert_eq!(dispatcher.stats().snapshot().successful_extractions, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_write_one_row_each() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.csv");
    let (dispatcher, store) = dispatcher(FakeModel { slow: Duration::ZERO }, 8, results.clone());

    const M: usize = 40;
    for n in 0..M {
        dispatcher.submit(event(&format!("shot_{n}"))).await.unwrap();
    }
    dispatcher.shutdown(true).await;

    let mut paths = image_paths(&results);
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), M);
    assert_eq!(store.row_count().await.unwrap(), M);

    let mut reader = csv::Reader::from_path(&results).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, ["document", "total", "image_path", "extracted_time"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_drains_every_accepted_capture() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let config = AppConfig::from_json(
        &serde_json::json!({
            "camera": { "device_id": 0, "high_res": [32, 24], "detect_res": [8, 6] },
            "detection": { "motion_threshold": 10, "stable_frames_trigger": 1, "capture_interval_sec": 0.001 },
            "processing": { "max_workers": 2 },
            "model": { "endpoint": "http://unused", "name": "fake", "prompt": "p" },
            "output": {
                "shots_dir": root.join("shots"),
                "results_file": root.join("out").join("results.csv"),
                "log_file": root.join("docucam.log")
            }
        })
        .to_string(),
    )
    .unwrap();

    let (mut camera, _opens) = ScriptedCamera::new(vec![]);
    camera.pace = Duration::from_millis(5);
    let (motion, _script) = ScriptedMotion::new(vec![]);
    // Every still counts as slow so jobs are still running at cancel time.
    let backend = Arc::new(SlowEverything {
        delay: Duration::from_millis(150),
    });

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            cancel.cancel();
        })
    };

    let summary = run_pipeline(&config, camera, motion, backend, cancel)
        .await
        .unwrap();
    canceller.await.unwrap();

    let stats = summary.stats;
    assert!(stats.total_captures >= 1);
    assert_eq!(
        stats.total_captures,
        stats.successful_extractions + stats.failed_extractions
    );
    assert_eq!(stats.in_flight(), 0);

    let rows = image_paths(&root.join("out").join("results.csv")).len() as u64;
    assert_eq!(rows, stats.successful_extractions);

    let loop_status = summary.loop_status.unwrap();
    assert_eq!(loop_status.state, LoopState::Stopped);
    assert!(!loop_status.device_open);
}

struct SlowEverything {
    delay: Duration,
}

#[async_trait]
impl InferenceBackend for SlowEverything {
    async fn extract(&self, _image: &Path, _prompt: &str) -> Result<String, ExtractionError> {
        tokio::time::sleep(self.delay).await;
        Ok(r#"{"pages": 1}"#.into())
    }

    async fn health_check(&self) -> Result<ModelStatus, ExtractionError> {
        unreachable!("startup checks are not part of the pipeline")
    }
}
