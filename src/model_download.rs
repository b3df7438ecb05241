use std::{
    fs,
    io::{Read, Write},
    ops::ControlFlow,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

const MODEL_BASE_URL: &str =
    "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    PalmDetector,
    HandLandmarks,
}

impl ModelKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm_detection_mediapipe_2023feb.onnx",
            ModelKind::HandLandmarks => "handpose_estimation_mediapipe_2023feb.onnx",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm detector",
            ModelKind::HandLandmarks => "hand landmark",
        }
    }

    pub fn url(self) -> String {
        format!("{MODEL_BASE_URL}/{}", self.file_name())
    }

    pub fn path_in(self, model_dir: &Path) -> PathBuf {
        model_dir.join(self.file_name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
}

impl ModelDownloadEvent {
    pub fn model(&self) -> ModelKind {
        match self {
            ModelDownloadEvent::AlreadyPresent { model }
            | ModelDownloadEvent::Started { model, .. }
            | ModelDownloadEvent::Progress { model, .. }
            | ModelDownloadEvent::Finished { model } => *model,
        }
    }
}

/// Makes sure `kind` exists under `model_dir`, downloading it when missing.
/// Returns the model path. The download is abandoned as soon as `on_event`
/// returns `ControlFlow::Break`.
pub fn ensure_model_ready<F>(
    kind: ModelKind,
    model_dir: &Path,
    mut on_event: F,
) -> anyhow::Result<PathBuf>
where
    F: FnMut(ModelDownloadEvent) -> ControlFlow<()>,
{
    let model_path = kind.path_in(model_dir);
    if model_path.exists() {
        log::debug!("{} model found at {}", kind.label(), model_path.display());
        let _ = on_event(ModelDownloadEvent::AlreadyPresent { model: kind });
        let _ = on_event(ModelDownloadEvent::Finished { model: kind });
        return Ok(model_path);
    }

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model directory {}", model_dir.display()))?;

    let mut progress: Option<ProgressBar> = None;
    download_to_path(kind, &kind.url(), &model_path, &mut |event| {
        match &event {
            ModelDownloadEvent::Started { total, .. } => {
                progress = Some(create_progress_bar(*total));
            }
            ModelDownloadEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            ModelDownloadEvent::Finished { model } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} model ready", model.label()));
                }
            }
            ModelDownloadEvent::AlreadyPresent { .. } => {}
        }
        on_event(event)
    })
    .with_context(|| {
        format!(
            "failed to download {} model to {}",
            kind.label(),
            model_path.display()
        )
    })?;

    Ok(model_path)
}

fn download_to_path<F>(
    model: ModelKind,
    url: &str,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent) -> ControlFlow<()>,
{
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let mut response = Client::new()
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total = response.content_length();
    if on_event(ModelDownloadEvent::Started { model, total }).is_break() {
        bail!("download of {} model cancelled", model.label());
    }

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .context("failed while writing model to disk")?;
        downloaded += read as u64;
        let flow = on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total,
        });
        if flow.is_break() {
            drop(file);
            let _ = fs::remove_file(&tmp_path);
            bail!(
                "download of {} model cancelled after {downloaded} bytes",
                model.label()
            );
        }
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    let _ = on_event(ModelDownloadEvent::Finished { model });
    Ok(())
}

fn create_progress_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.green} downloading model")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_paths_live_under_the_model_dir() {
        let dir = Path::new("models");
        assert_eq!(
            ModelKind::PalmDetector.path_in(dir),
            PathBuf::from("models/palm_detection_mediapipe_2023feb.onnx")
        );
        assert!(
            ModelKind::HandLandmarks
                .url()
                .ends_with("/models/handpose_estimation_mediapipe_2023feb.onnx")
        );
    }

    #[test]
    fn present_model_is_not_downloaded() {
        let dir = std::env::temp_dir().join(format!("gesture-lens-models-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = ModelKind::PalmDetector.path_in(&dir);
        fs::write(&path, b"onnx").unwrap();

        let mut events = Vec::new();
        let resolved = ensure_model_ready(ModelKind::PalmDetector, &dir, |evt| {
            events.push(evt);
            ControlFlow::Break(())
        })
        .unwrap();

        assert_eq!(resolved, path);
        assert_eq!(
            events,
            vec![
                ModelDownloadEvent::AlreadyPresent {
                    model: ModelKind::PalmDetector
                },
                ModelDownloadEvent::Finished {
                    model: ModelKind::PalmDetector
                },
            ]
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
