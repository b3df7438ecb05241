use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
};

use super::rgba_converter;
use crate::{config::CameraConfig, types::Frame};

// Built-in macOS cameras often reject YUYV even though it is reported.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

const REQUESTED_FPS: u32 = 30;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);
/// About two seconds of failed reads before the device is given up on.
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 40;

/// Provides the newest camera frame to the detection loop.
pub trait FrameSource: Send + 'static {
    /// True once at least one frame has arrived.
    fn ready(&mut self) -> bool;
    fn current_frame(&self) -> Option<&Frame>;

    /// A capture failure after which no more frames will arrive. Reported once.
    fn take_fault(&mut self) -> Option<String> {
        None
    }
}

/// Frame source fed by a channel. Older frames are discarded on every poll.
pub struct LatestFrameSource {
    rx: Receiver<Frame>,
    latest: Option<Frame>,
    stream: Option<CameraStream>,
}

impl LatestFrameSource {
    pub fn new(rx: Receiver<Frame>) -> Self {
        Self {
            rx,
            latest: None,
            stream: None,
        }
    }

    /// Keeps the capture thread alive for as long as this source exists.
    pub fn with_stream(rx: Receiver<Frame>, stream: CameraStream) -> Self {
        Self {
            stream: Some(stream),
            ..Self::new(rx)
        }
    }
}

impl FrameSource for LatestFrameSource {
    fn ready(&mut self) -> bool {
        if let Some(frame) = self.rx.try_iter().last() {
            self.latest = Some(frame);
        }
        self.latest.is_some()
    }

    fn current_frame(&self) -> Option<&Frame> {
        self.latest.as_ref()
    }

    fn take_fault(&mut self) -> Option<String> {
        self.stream.as_ref().and_then(CameraStream::fault)
    }
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    faults: Receiver<String>,
}

impl CameraStream {
    fn fault(&self) -> Option<String> {
        self.faults.try_recv().ok()
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto).context("failed to enumerate cameras")?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: info.human_name(),
        })
        .collect())
}

/// The configured device when it exists, otherwise the first one.
pub fn pick_camera(devices: &[CameraDevice], preferred: Option<u32>) -> Option<&CameraDevice> {
    preferred
        .and_then(|wanted| {
            devices
                .iter()
                .find(|device| matches!(device.index, CameraIndex::Index(i) if i == wanted))
        })
        .or_else(|| devices.first())
}

fn requested_formats(config: &CameraConfig) -> Vec<RequestedFormat<'static>> {
    let target = CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::MJPEG,
        REQUESTED_FPS,
    );

    vec![
        RequestedFormat::with_formats(
            RequestedFormatType::Closest(target),
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Anything nokhwa can decode, still preferring frame rate over the driver default.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

fn build_camera(index: &CameraIndex, config: &CameraConfig) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats(config) {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => {
                    log::info!(
                        "camera {index} opened at {}",
                        camera.camera_format()
                    );
                    return Ok(camera);
                }
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Starts the capture thread. Every frame is offered to each sender and
/// dropped for consumers that are still busy with the previous one.
pub fn start_camera_stream(
    index: CameraIndex,
    config: &CameraConfig,
    senders: Vec<Sender<Frame>>,
) -> Result<CameraStream> {
    // Fail fast before spawning the capture thread.
    drop(build_camera(&index, config)?);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let (fault_tx, faults) = bounded(1);
    let config = config.clone();

    let handle = thread::Builder::new()
        .name("camera-capture".into())
        .spawn(move || {
            let mut camera = match build_camera(&index, &config) {
                Ok(camera) => camera,
                Err(err) => {
                    log::error!("failed to reopen camera {index}: {err:?}");
                    let _ = fault_tx.try_send(format!("failed to reopen camera {index}: {err:#}"));
                    return;
                }
            };

            let mut read_errors = 0;
            while !stop_flag.load(Ordering::Relaxed) {
                let buffer = match camera.frame() {
                    Ok(buffer) => {
                        read_errors = 0;
                        buffer
                    }
                    Err(err) => {
                        read_errors += 1;
                        log::warn!("camera frame read failed ({read_errors} in a row): {err:?}");
                        if read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                            let _ = fault_tx.try_send(format!(
                                "camera {index} stopped delivering frames: {err}"
                            ));
                            break;
                        }
                        thread::sleep(READ_RETRY_DELAY);
                        continue;
                    }
                };

                let frame = match rgba_converter::convert_camera_frame(&buffer, config.mirrored) {
                    Ok(frame) => frame,
                    Err(err) => {
                        log::warn!("failed to decode camera frame: {err:?}");
                        continue;
                    }
                };

                if let Some((last, rest)) = senders.split_last() {
                    for tx in rest {
                        let _ = tx.try_send(frame.clone());
                    }
                    let _ = last.try_send(frame);
                }
            }

            if let Err(err) = camera.stop_stream() {
                log::debug!("camera stop failed: {err:?}");
            }
        })
        .context("failed to spawn camera thread")?;

    Ok(CameraStream {
        stop,
        handle: Some(handle),
        faults,
    })
}
