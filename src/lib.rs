pub mod actuator;
pub mod assistant;
pub mod audio;
pub mod camera;
pub mod geometry;
pub mod settings;
pub mod status;
pub mod tracker;
mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use log::{error, info, warn};

use actuator::{Actuator, ActuatorController, LoggingActuator};
use assistant::{Assistant, Responder, Transcriber, WakeWordDetector};
use audio::{AudioQueue, Synthesizer, VoiceSink};
use camera::{FrameSource, LandmarkExtractor, SimulatedCamera, SimulatedFaceMesh};
use settings::{SettingsStore, TrackerSettings, UserSettings};
use status::StatusWriter;
use tracker::{SessionController, SessionReport};

const ASSISTANT_GRACE: Duration = Duration::from_secs(3);
const AUDIO_DRAIN: Duration = Duration::from_secs(10);

/// The voice assistant's input side.
pub struct AssistantParts {
    pub wake: Box<dyn WakeWordDetector>,
    pub transcriber: Box<dyn Transcriber>,
    pub responder: Box<dyn Responder>,
}

/// Hardware and cloud seams a session runs against.
pub struct Services {
    pub source: Box<dyn FrameSource>,
    pub extractor: Box<dyn LandmarkExtractor>,
    pub actuator: Arc<dyn Actuator>,
    pub synthesizer: Option<Box<dyn Synthesizer>>,
    pub assistant: Option<AssistantParts>,
}

impl Services {
    /// Simulated camera and subject, logging servo, text-only voice.
    pub fn simulated(tracker: &TrackerSettings) -> Self {
        Self {
            source: Box::new(SimulatedCamera::new(Duration::from_secs_f64(
                tracker.frame_period_secs,
            ))),
            extractor: Box::new(SimulatedFaceMesh::new(tracker.nominal_fps())),
            actuator: Arc::new(LoggingActuator::new()),
            synthesizer: None,
            assistant: None,
        }
    }
}

/// `FOCUSWATCH_HOME`, or `./focuswatch-data`.
pub fn data_dir() -> PathBuf {
    std::env::var_os("FOCUSWATCH_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("focuswatch-data"))
}

pub fn run() -> Result<()> {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("FocusWatch starting up...");

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let store = SettingsStore::new(data_dir.join("settings.json"))?;
    store.ensure_persisted()?;
    let settings = store.snapshot();
    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", store.path().display()))?;

    let services = Services::simulated(&settings.tracker);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run_session(&data_dir, settings, services))?;

    Ok(())
}

/// Runs one tracking session to completion. The status snapshot defaults to
/// `data_dir/focus_status.txt`.
pub async fn run_session(
    data_dir: &Path,
    settings: UserSettings,
    services: Services,
) -> Result<SessionReport> {
    let Services {
        mut source,
        mut extractor,
        actuator,
        synthesizer,
        assistant,
    } = services;

    let audio = Arc::new(AudioQueue::new(synthesizer, settings.voice.clone())?);
    let voice: Arc<dyn VoiceSink> = audio.clone();

    let status_path = settings
        .status_file
        .clone()
        .unwrap_or_else(|| data_dir.join("focus_status.txt"));
    let status = match StatusWriter::new(status_path) {
        Ok(writer) => Some(writer),
        Err(err) => {
            warn!("status file disabled: {err:#}");
            None
        }
    };

    let controller = SessionController::new(
        settings.tracker.clone(),
        ActuatorController::new(actuator, settings.actuator.clone()),
        Arc::clone(&voice),
        status,
    )?;
    let stop = controller.stop_handle();

    let ctrl_c_stop = stop.clone();
    let ctrl_c = tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("Ctrl-C received; stopping session");
                    ctrl_c_stop.cancel();
                }
                Err(err) => warn!("failed to listen for Ctrl-C: {err}"),
            },
            _ = ctrl_c_stop.cancelled() => {}
        }
    });

    info!("session started");

    let assistant_task = assistant.map(|parts| {
        let cancel = stop.clone();
        let mut assistant = Assistant::new(
            parts.wake,
            parts.transcriber,
            parts.responder,
            Arc::clone(&voice),
            settings.voice.clone(),
        );
        tokio::task::spawn_blocking(move || assistant.run(&cancel))
    });

    let report =
        tokio::task::spawn_blocking(move || controller.run(source.as_mut(), extractor.as_mut()))
            .await
            .context("frame loop panicked")?;

    stop.cancel();
    if let Some(task) = assistant_task {
        match tokio::time::timeout(ASSISTANT_GRACE, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => warn!("assistant stopped with error: {err:#}"),
            Ok(Err(err)) => error!("assistant task panicked: {err}"),
            Err(_) => warn!("assistant still busy after {ASSISTANT_GRACE:?}; not waiting"),
        }
    }
    if let Err(err) = ctrl_c.await {
        warn!("Ctrl-C listener ended abnormally: {err}");
    }

    let drain = Arc::clone(&audio);
    let drained = tokio::task::spawn_blocking(move || drain.wait_until_idle(AUDIO_DRAIN))
        .await
        .unwrap_or(false);
    if !drained {
        warn!("audio queue still busy at exit; pending clips dropped");
    }

    Ok(report)
}
