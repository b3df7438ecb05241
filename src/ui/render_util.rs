use std::sync::Arc;

use gpui::RenderImage;
use image::{Frame as ImageFrame, ImageBuffer, Rgba};
use rayon::prelude::*;

use crate::{pipeline::overlay::Overlay, types::Frame};

/// Builds a GPU image of `frame` with `overlay` blended on top when both
/// have the same dimensions.
pub(super) fn composite_to_image(
    frame: &Frame,
    overlay: Option<&Overlay>,
) -> Option<Arc<RenderImage>> {
    let mut rgba = frame.rgba.clone();
    if let Some(overlay) = overlay {
        blend_overlay(&mut rgba, frame.width, frame.height, overlay);
    }

    // GPUI expects BGRA; converting here avoids the async asset pipeline and flicker.
    rgba.par_chunks_exact_mut(4).for_each(|px| px.swap(0, 2));

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

/// Source-over blend of a transparent overlay onto an opaque RGBA frame.
/// Returns false, leaving the frame untouched, on a size mismatch.
pub(super) fn blend_overlay(rgba: &mut [u8], width: u32, height: u32, overlay: &Overlay) -> bool {
    if overlay.width != width || overlay.height != height || overlay.rgba.len() != rgba.len() {
        return false;
    }

    rgba.par_chunks_exact_mut(4)
        .zip(overlay.rgba.par_chunks_exact(4))
        .for_each(|(dst, src)| {
            let alpha = src[3] as u32;
            if alpha == 0 {
                return;
            }
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha)) / 255) as u8;
            }
            dst[3] = 255;
        });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(width: u32, height: u32, rgba: Vec<u8>) -> Overlay {
        Overlay {
            width,
            height,
            rgba,
        }
    }

    #[test]
    fn opaque_overlay_pixels_replace_the_frame() {
        let mut frame = vec![10, 20, 30, 255, 10, 20, 30, 255];
        let layer = overlay(2, 1, vec![0, 255, 0, 255, 0, 0, 0, 0]);
        assert!(blend_overlay(&mut frame, 2, 1, &layer));
        assert_eq!(frame, vec![0, 255, 0, 255, 10, 20, 30, 255]);
    }

    #[test]
    fn translucent_overlay_pixels_mix() {
        let mut frame = vec![0, 0, 0, 255];
        let layer = overlay(1, 1, vec![255, 255, 255, 51]);
        assert!(blend_overlay(&mut frame, 1, 1, &layer));
        assert_eq!(frame, vec![51, 51, 51, 255]);
    }

    #[test]
    fn mismatched_overlay_is_skipped() {
        let mut frame = vec![1, 2, 3, 255];
        let layer = overlay(2, 1, vec![0, 255, 0, 255, 0, 255, 0, 255]);
        assert!(!blend_overlay(&mut frame, 1, 1, &layer));
        assert_eq!(frame, vec![1, 2, 3, 255]);
    }
}
