use std::{
    ops::ControlFlow,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use anyhow::Context;
use crossbeam_channel::{Sender, TrySendError, bounded, tick};
use thiserror::Error;

use crate::{
    config::{AppConfig, LoopConfig, OverlayStyle, TickFailurePolicy},
    gesture::GestureClassifier,
    model_download::{ModelDownloadEvent, ModelKind, ensure_model_ready},
    pipeline::{
        camera::{FrameSource, LatestFrameSource, available_cameras, pick_camera, start_camera_stream},
        detection_loop::{DetectionLoop, TickOutput},
        detector::{OrtHandDetector, PoseDetector},
    },
    types::{AppState, Frame},
};

/// Banner text shown when the pipeline cannot be loaded.
pub const LOAD_ERROR_MESSAGE: &str =
    "Failed to load hand pose model. Please check your camera and model files.";

/// Lifecycle notifications from the session thread to the UI.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Download(ModelDownloadEvent),
    ModelLoaded,
    LoadFailed(String),
    LoopHalted(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no camera available")]
    NoCamera,
    #[error("failed to open camera: {0}")]
    Camera(String),
    #[error("failed to prepare {model} model: {message}")]
    Model {
        model: &'static str,
        message: String,
    },
    #[error("failed to initialize hand detector: {0}")]
    Detector(String),
    #[error("load cancelled")]
    Cancelled,
}

/// What a successful load hands to the detection loop.
pub struct Pipeline<S, D> {
    pub source: S,
    pub detector: D,
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), LoadError> {
        if self.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Owns the session thread. Dropping it cancels the session. A running loop
/// is joined; a load still in progress is left to wind down on its own.
#[derive(Debug)]
pub struct SessionHandle {
    cancel: CancelToken,
    loading: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SessionHandle {
    #[allow(dead_code)]
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.loading.load(Ordering::SeqCst) && !handle.is_finished() {
            // Blocking downloads only notice the token between chunks.
            log::debug!("session still loading, not waiting for it");
            return;
        }
        if handle.join().is_err() {
            log::error!("session thread panicked");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl AppState {
    pub fn apply(&self, event: &SessionEvent) -> AppState {
        match event {
            SessionEvent::ModelLoaded => self.with_model_loaded(),
            SessionEvent::LoadFailed(message) => self.with_load_error(message.clone()),
            SessionEvent::Download(_) | SessionEvent::LoopHalted(_) => self.clone(),
        }
    }
}

/// Runs `loader` once on a new thread, then drives the detection loop on
/// a timer until cancelled. The loader gets the session's cancel token and
/// should return `LoadError::Cancelled` once it fires.
pub fn spawn_session<S, D, C, L>(
    loader: L,
    classifier: C,
    loop_cfg: LoopConfig,
    style: OverlayStyle,
    events: Sender<SessionEvent>,
    ticks: Sender<TickOutput>,
) -> anyhow::Result<SessionHandle>
where
    S: FrameSource,
    D: PoseDetector,
    C: GestureClassifier,
    L: FnOnce(&Sender<SessionEvent>, &CancelToken) -> Result<Pipeline<S, D>, LoadError>
        + Send
        + 'static,
{
    let cancel = CancelToken::default();
    let token = cancel.clone();
    let loading = Arc::new(AtomicBool::new(true));
    let loading_flag = loading.clone();

    let handle = thread::Builder::new()
        .name("gesture-session".into())
        .spawn(move || {
            let loaded = loader(&events, &token);
            loading_flag.store(false, Ordering::SeqCst);
            let pipeline = match loaded {
                Ok(pipeline) => pipeline,
                Err(LoadError::Cancelled) => {
                    log::debug!("pipeline load cancelled");
                    return;
                }
                Err(err) => {
                    log::error!("pipeline load failed: {err}");
                    let _ = events.send(SessionEvent::LoadFailed(LOAD_ERROR_MESSAGE.to_string()));
                    return;
                }
            };
            if token.is_cancelled() {
                return;
            }
            let _ = events.send(SessionEvent::ModelLoaded);
            log::info!("pipeline ready, detecting every {:?}", loop_cfg.refresh_interval);

            let mut detection = DetectionLoop::new(
                pipeline.source,
                pipeline.detector,
                classifier,
                style,
                loop_cfg.match_confidence,
            );
            run_loop(&mut detection, &loop_cfg, &token, &events, &ticks);
        })
        .context("failed to spawn session thread")?;

    Ok(SessionHandle {
        cancel,
        loading,
        handle: Some(handle),
    })
}

fn run_loop<S, D, C>(
    detection: &mut DetectionLoop<S, D, C>,
    loop_cfg: &LoopConfig,
    cancel: &CancelToken,
    events: &Sender<SessionEvent>,
    ticks: &Sender<TickOutput>,
) where
    S: FrameSource,
    D: PoseDetector,
    C: GestureClassifier,
{
    let timer = tick(loop_cfg.refresh_interval);

    while !cancel.is_cancelled() {
        if timer.recv().is_err() || cancel.is_cancelled() {
            break;
        }

        if let Some(fault) = detection.take_source_fault() {
            log::error!("camera capture stopped: {fault}");
            let _ = events.send(SessionEvent::LoopHalted(format!(
                "camera capture stopped: {fault}"
            )));
            break;
        }

        match detection.tick() {
            Ok(Some(output)) => {
                if let Err(TrySendError::Disconnected(_)) = ticks.try_send(output) {
                    log::debug!("tick receiver gone, stopping detection loop");
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => match loop_cfg.failure_policy {
                TickFailurePolicy::Continue => log::warn!("detection tick failed: {err:#}"),
                TickFailurePolicy::Halt => {
                    log::error!("detection loop halted: {err:#}");
                    let _ = events.send(SessionEvent::LoopHalted(format!("{err:#}")));
                    break;
                }
            },
        }
    }
}

/// Opens the camera, makes sure both models are on disk and builds the
/// ONNX sessions. Camera frames are shared with the UI through `ui_frames`.
pub fn load_pipeline(
    config: &AppConfig,
    ui_frames: Sender<Frame>,
    events: &Sender<SessionEvent>,
    cancel: &CancelToken,
) -> Result<Pipeline<LatestFrameSource, OrtHandDetector>, LoadError> {
    let devices = available_cameras().map_err(|err| LoadError::Camera(format!("{err:#}")))?;
    let device = pick_camera(&devices, config.camera.preferred_index).ok_or(LoadError::NoCamera)?;
    log::info!("using camera {}", device.label);

    let (detector_tx, detector_rx) = bounded(1);
    let stream = start_camera_stream(
        device.index.clone(),
        &config.camera,
        vec![ui_frames, detector_tx],
    )
    .map_err(|err| LoadError::Camera(format!("{err:#}")))?;
    let source = LatestFrameSource::with_stream(detector_rx, stream);
    cancel.check()?;

    let ensure = |kind: ModelKind| {
        ensure_model_ready(kind, &config.detector.model_dir, |event| {
            let _ = events.send(SessionEvent::Download(event));
            if cancel.is_cancelled() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .map_err(|err| {
            if cancel.is_cancelled() {
                LoadError::Cancelled
            } else {
                LoadError::Model {
                    model: kind.label(),
                    message: format!("{err:#}"),
                }
            }
        })
    };
    let palm_model = ensure(ModelKind::PalmDetector)?;
    cancel.check()?;
    let landmark_model = ensure(ModelKind::HandLandmarks)?;
    cancel.check()?;

    let detector = OrtHandDetector::new(&palm_model, &landmark_model, &config.detector)
        .map_err(|err| LoadError::Detector(format!("{err:#}")))?;

    Ok(Pipeline { source, detector })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use anyhow::anyhow;
    use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};

    use super::*;
    use crate::{
        pipeline::{
            detection_loop::tests::{KeyedClassifier, ScriptedDetector, StaticSource},
            overlay::tests::sample_hand,
        },
        types::{DisplayedGesture, GestureCandidate, GestureName, HandDetection},
    };

    const WAIT: Duration = Duration::from_secs(2);

    fn thumbs_up_classifier() -> KeyedClassifier {
        KeyedClassifier {
            answers: vec![(
                10.0,
                vec![GestureCandidate {
                    name: GestureName::ThumbsUp,
                    confidence: 8.5,
                }],
            )],
        }
    }

    fn fast_loop(policy: TickFailurePolicy) -> LoopConfig {
        LoopConfig {
            refresh_interval: Duration::from_millis(1),
            failure_policy: policy,
            ..LoopConfig::default()
        }
    }

    fn start(
        results: Vec<anyhow::Result<Vec<HandDetection>>>,
        policy: TickFailurePolicy,
    ) -> (SessionHandle, Receiver<SessionEvent>, Receiver<TickOutput>) {
        start_with_source(StaticSource::with_frame(64, 48), results, policy)
    }

    fn start_with_source(
        source: StaticSource,
        results: Vec<anyhow::Result<Vec<HandDetection>>>,
        policy: TickFailurePolicy,
    ) -> (SessionHandle, Receiver<SessionEvent>, Receiver<TickOutput>) {
        let (events_tx, events_rx) = unbounded();
        let (ticks_tx, ticks_rx) = bounded(1);
        let handle = spawn_session(
            move |_: &Sender<SessionEvent>, _: &CancelToken| {
                Ok(Pipeline {
                    source,
                    detector: ScriptedDetector::new(results),
                })
            },
            thumbs_up_classifier(),
            fast_loop(policy),
            OverlayStyle::default(),
            events_tx,
            ticks_tx,
        )
        .unwrap();
        (handle, events_rx, ticks_rx)
    }

    #[test]
    fn rejected_load_reports_error_and_never_ticks() {
        let (events_tx, events_rx) = unbounded();
        let (ticks_tx, ticks_rx) = bounded(1);
        let handle = spawn_session(
            |_: &Sender<SessionEvent>,
             _: &CancelToken|
             -> Result<Pipeline<StaticSource, ScriptedDetector>, LoadError> {
                Err(LoadError::NoCamera)
            },
            KeyedClassifier::default(),
            fast_loop(TickFailurePolicy::Continue),
            OverlayStyle::default(),
            events_tx,
            ticks_tx,
        )
        .unwrap();

        let event = events_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(event, SessionEvent::LoadFailed(LOAD_ERROR_MESSAGE.to_string()));

        let state = AppState::default().apply(&event);
        assert_eq!(state.load_error.as_deref(), Some(LOAD_ERROR_MESSAGE));
        assert!(!state.model_loaded);
        assert!(!state.is_loading());

        handle.stop();
        assert!(ticks_rx.try_recv().is_err());
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn loaded_session_publishes_ticks() {
        let (handle, events_rx, ticks_rx) =
            start(vec![Ok(vec![sample_hand(10.0)])], TickFailurePolicy::Continue);

        assert_eq!(events_rx.recv_timeout(WAIT).unwrap(), SessionEvent::ModelLoaded);
        let output = ticks_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(
            output.displayed_gesture,
            DisplayedGesture::Gesture(GestureName::ThumbsUp)
        );
        drop(handle);
    }

    #[test]
    fn continue_policy_survives_a_failed_tick() {
        let (handle, events_rx, ticks_rx) = start(
            vec![Err(anyhow!("inference failed")), Ok(vec![sample_hand(10.0)])],
            TickFailurePolicy::Continue,
        );

        assert_eq!(events_rx.recv_timeout(WAIT).unwrap(), SessionEvent::ModelLoaded);
        let output = ticks_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(
            output.displayed_gesture,
            DisplayedGesture::Gesture(GestureName::ThumbsUp)
        );
        handle.stop();
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn halt_policy_stops_after_first_failure() {
        let (handle, events_rx, ticks_rx) = start(
            vec![Err(anyhow!("inference failed")), Ok(vec![sample_hand(10.0)])],
            TickFailurePolicy::Halt,
        );

        assert_eq!(events_rx.recv_timeout(WAIT).unwrap(), SessionEvent::ModelLoaded);
        match events_rx.recv_timeout(WAIT).unwrap() {
            SessionEvent::LoopHalted(message) => assert!(message.contains("inference failed")),
            other => panic!("unexpected event {other:?}"),
        }
        handle.stop();
        assert!(ticks_rx.try_recv().is_err());
    }

    #[test]
    fn camera_fault_halts_the_loop() {
        let source = StaticSource {
            fault: Some("camera 0 stopped delivering frames".to_string()),
            ..StaticSource::with_frame(64, 48)
        };
        let (handle, events_rx, ticks_rx) = start_with_source(
            source,
            vec![Ok(vec![sample_hand(10.0)])],
            TickFailurePolicy::Continue,
        );

        assert_eq!(events_rx.recv_timeout(WAIT).unwrap(), SessionEvent::ModelLoaded);
        match events_rx.recv_timeout(WAIT).unwrap() {
            SessionEvent::LoopHalted(message) => {
                assert!(message.contains("stopped delivering frames"))
            }
            other => panic!("unexpected event {other:?}"),
        }
        handle.stop();
        assert!(ticks_rx.try_recv().is_err());
    }

    #[test]
    fn dropping_while_loading_does_not_wait_for_the_loader() {
        let (events_tx, _events_rx) = unbounded();
        let (ticks_tx, _ticks_rx) = bounded(1);
        let handle = spawn_session(
            |_: &Sender<SessionEvent>,
             _: &CancelToken|
             -> Result<Pipeline<StaticSource, ScriptedDetector>, LoadError> {
                thread::sleep(Duration::from_secs(3));
                Err(LoadError::NoCamera)
            },
            KeyedClassifier::default(),
            fast_loop(TickFailurePolicy::Continue),
            OverlayStyle::default(),
            events_tx,
            ticks_tx,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        drop(handle);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn cancelled_load_ends_quietly() {
        let (events_tx, events_rx) = unbounded();
        let (ticks_tx, ticks_rx) = bounded(1);
        let handle = spawn_session(
            |_: &Sender<SessionEvent>,
             cancel: &CancelToken|
             -> Result<Pipeline<StaticSource, ScriptedDetector>, LoadError> {
                while !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                cancel.check()?;
                Ok(Pipeline {
                    source: StaticSource::with_frame(64, 48),
                    detector: ScriptedDetector::default(),
                })
            },
            KeyedClassifier::default(),
            fast_loop(TickFailurePolicy::Continue),
            OverlayStyle::default(),
            events_tx,
            ticks_tx,
        )
        .unwrap();

        handle.stop();
        // The thread exits without reporting a load failure or a loaded model.
        assert_eq!(
            events_rx.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        );
        assert!(ticks_rx.try_recv().is_err());
    }

    #[test]
    fn reducer_tracks_lifecycle_events() {
        let state = AppState::default();
        assert!(state.is_loading());

        let loaded = state.apply(&SessionEvent::ModelLoaded);
        assert!(loaded.model_loaded);
        assert_eq!(loaded.load_error, None);

        let halted = loaded.apply(&SessionEvent::LoopHalted("boom".into()));
        assert_eq!(halted, loaded);

        let download = state.apply(&SessionEvent::Download(ModelDownloadEvent::Finished {
            model: ModelKind::PalmDetector,
        }));
        assert_eq!(download, state);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::default();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
