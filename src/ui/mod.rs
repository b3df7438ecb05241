use std::sync::Arc;

use crossbeam_channel::{Receiver, bounded, unbounded};
use gpui::{
    App, AppContext, Context, Render, RenderImage, TitlebarOptions, Window, WindowOptions,
};
use gpui_component::Root;

use crate::{
    config::AppConfig,
    gesture::FingerPoseEstimator,
    pipeline::{detection_loop::TickOutput, overlay::Overlay},
    session::{LOAD_ERROR_MESSAGE, SessionEvent, SessionHandle, load_pipeline, spawn_session},
    types::{AppState, Frame},
};

mod download;
mod main_view;
mod render_util;

use download::DownloadStatus;
use render_util::composite_to_image;

pub fn launch_ui(app: &mut App, config: AppConfig) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("AI Gesture Recognition".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    state: AppState,
    download: DownloadStatus,
    loop_error: Option<String>,
    hands_in_view: usize,
    frame_rx: Receiver<Frame>,
    events_rx: Receiver<SessionEvent>,
    ticks_rx: Receiver<TickOutput>,
    latest_frame: Option<Frame>,
    latest_overlay: Option<Arc<Overlay>>,
    latest_image: Option<Arc<RenderImage>>,
    // Dropped with the view, which cancels the loop and joins the thread.
    _session: Option<SessionHandle>,
}

impl AppView {
    /// Starts the session exactly once, when the view is first mounted.
    fn new(config: AppConfig) -> Self {
        let (ui_frame_tx, frame_rx) = bounded(1);
        let (events_tx, events_rx) = unbounded();
        let (ticks_tx, ticks_rx) = bounded(1);

        let loader_config = config.clone();
        let spawned = spawn_session(
            move |events, cancel| load_pipeline(&loader_config, ui_frame_tx, events, cancel),
            FingerPoseEstimator::default(),
            config.detection_loop.clone(),
            config.overlay.clone(),
            events_tx,
            ticks_tx,
        );

        let (session, state) = match spawned {
            Ok(handle) => (Some(handle), AppState::default()),
            Err(err) => {
                log::error!("failed to start session: {err:#}");
                (None, AppState::default().with_load_error(LOAD_ERROR_MESSAGE))
            }
        };

        Self {
            state,
            download: DownloadStatus::default(),
            loop_error: None,
            hands_in_view: 0,
            frame_rx,
            events_rx,
            ticks_rx,
            latest_frame: None,
            latest_overlay: None,
            latest_image: None,
            _session: session,
        }
    }

    fn poll_session(&mut self) {
        for event in self.events_rx.try_iter() {
            match &event {
                SessionEvent::Download(download) => self.download.update(download),
                SessionEvent::LoopHalted(message) => self.loop_error = Some(message.clone()),
                SessionEvent::ModelLoaded | SessionEvent::LoadFailed(_) => {}
            }
            self.state = self.state.apply(&event);
        }

        if let Some(output) = self.ticks_rx.try_iter().last() {
            self.state = self.state.with_displayed_gesture(output.displayed_gesture);
            self.hands_in_view = output.hands.len();
            self.latest_overlay = Some(output.overlay);
        }
    }

    fn poll_camera(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let Some(frame) = self.frame_rx.try_iter().last() else {
            return;
        };
        if let Some(image) = composite_to_image(&frame, self.latest_overlay.as_deref()) {
            if let Some(old_image) = self.latest_image.replace(image) {
                // Release the previous texture, otherwise the sprite atlas keeps every frame.
                cx.drop_image(old_image, Some(window));
            }
        }
        self.latest_frame = Some(frame);
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.poll_session();
        self.poll_camera(window, cx);
        self.render_main(cx)
    }
}
