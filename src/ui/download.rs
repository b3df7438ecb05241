use crate::model_download::{ModelDownloadEvent, ModelKind};

const BAR_LEN: usize = 30;

/// Model download progress as reported by the session thread.
#[derive(Clone, Debug, Default)]
pub(super) struct DownloadStatus {
    model: Option<ModelKind>,
    downloaded: u64,
    total: Option<u64>,
    active: bool,
}

impl DownloadStatus {
    pub(super) fn update(&mut self, event: &ModelDownloadEvent) {
        self.model = Some(event.model());
        match *event {
            ModelDownloadEvent::Started { total, .. } => {
                self.downloaded = 0;
                self.total = total;
                self.active = true;
            }
            ModelDownloadEvent::Progress {
                downloaded, total, ..
            } => {
                self.downloaded = downloaded;
                self.total = total;
                self.active = true;
            }
            ModelDownloadEvent::AlreadyPresent { .. } | ModelDownloadEvent::Finished { .. } => {
                self.active = false;
            }
        }
    }

    /// Heading and bar for a running download, `None` otherwise.
    pub(super) fn describe(&self) -> Option<(String, String)> {
        if !self.active {
            return None;
        }
        let label = self.model.map_or("model", ModelKind::label);
        Some((
            format!("Downloading {label} model..."),
            progress_bar_string(self.downloaded, self.total),
        ))
    }
}

pub(super) fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(BAR_LEN - filled),
                pct * 100.0
            )
        }
        _ => format!("[{}] {} KB", "-".repeat(BAR_LEN), downloaded / 1024),
    }
}
