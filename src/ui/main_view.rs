use gpui::{
    AnyElement, Context, IntoElement, ObjectFit, ParentElement, Styled, StyledImage, div, img,
    prelude::FluentBuilder, px,
};
use gpui_component::{ActiveTheme, StyledExt, h_flex, tag::Tag, v_flex};

use super::AppView;
use crate::types::GestureName;

const CAMERA_WIDTH: f32 = 640.0;
const DEFAULT_CAMERA_RATIO: f32 = 4.0 / 3.0;

impl AppView {
    pub(super) fn render_main(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();

        let header = v_flex()
            .items_center()
            .gap_1()
            .child(
                div()
                    .text_2xl()
                    .font_semibold()
                    .text_color(theme.foreground)
                    .child("AI Gesture Recognition"),
            )
            .child(
                div()
                    .text_sm()
                    .text_color(theme.muted_foreground)
                    .child("Show your hand to the camera and make gestures!"),
            );

        let loading = self.state.is_loading().then(|| {
            let mut card = v_flex()
                .gap_2()
                .p_4()
                .rounded_lg()
                .border_1()
                .border_color(theme.border)
                .bg(theme.group_box)
                .child(
                    div()
                        .text_color(theme.foreground)
                        .child("⟳ Loading AI model..."),
                );
            if let Some((heading, bar)) = self.download.describe() {
                card = card
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child(heading),
                    )
                    .child(
                        div()
                            .px_3()
                            .py_2()
                            .rounded_md()
                            .bg(theme.muted)
                            .font_family(theme.mono_font_family.clone())
                            .text_color(theme.foreground)
                            .child(bar),
                    );
            }
            card
        });

        let error_banner = self.state.load_error.clone().map(|message| {
            h_flex()
                .gap_2()
                .items_center()
                .p_3()
                .rounded_lg()
                .bg(gpui::rgba(0xef444433))
                .border_1()
                .border_color(gpui::rgba(0xef4444ff))
                .child(div().child("⚠️"))
                .child(
                    div()
                        .text_sm()
                        .text_color(gpui::rgb(0xfca5a5))
                        .child(message),
                )
        });

        let ratio = self
            .latest_frame
            .as_ref()
            .filter(|frame| frame.height > 0)
            .map_or(DEFAULT_CAMERA_RATIO, |frame| {
                frame.width as f32 / frame.height as f32
            });

        let frame_view: AnyElement = match &self.latest_image {
            Some(image) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            None => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element(),
        };

        let camera = div()
            .w(px(CAMERA_WIDTH))
            .h(px(CAMERA_WIDTH / ratio))
            .overflow_hidden()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(gpui::rgb(0x000000))
            .child(frame_view);

        let detected = h_flex()
            .gap_2()
            .items_center()
            .child(
                div()
                    .text_color(theme.muted_foreground)
                    .child("Detected Gesture:"),
            )
            .child(
                div()
                    .text_xl()
                    .font_semibold()
                    .text_color(theme.success)
                    .child(self.state.displayed_gesture.display_text()),
            )
            .when(self.hands_in_view > 1, |this| {
                this.child(
                    div()
                        .text_sm()
                        .text_color(theme.muted_foreground)
                        .child(format!("({} hands in view)", self.hands_in_view)),
                )
            });

        let legend = h_flex().gap_3().flex_wrap().justify_center().children(
            GestureName::ALL.iter().map(|gesture| {
                div()
                    .px_3()
                    .py_1()
                    .rounded_md()
                    .bg(theme.muted)
                    .text_sm()
                    .text_color(theme.foreground)
                    .child(format!("{} {}", gesture.emoji(), gesture.display_name()))
            }),
        );

        v_flex()
            .size_full()
            .items_center()
            .gap_4()
            .p_6()
            .bg(theme.background)
            .child(header)
            .children(loading)
            .children(error_banner)
            .when_some(self.loop_error.clone(), |this, message| {
                this.child(
                    Tag::danger()
                        .rounded_full()
                        .child(format!("Detection stopped: {message}")),
                )
            })
            .child(camera)
            .child(detected)
            .child(
                v_flex()
                    .items_center()
                    .gap_2()
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child("Supported gestures"),
                    )
                    .child(legend),
            )
            .into_any_element()
    }
}
