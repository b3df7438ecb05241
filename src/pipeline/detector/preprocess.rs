use anyhow::{Context, Result, anyhow, ensure};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, Landmark, NUM_LANDMARKS};

pub const PALM_INPUT_SIZE: u32 = 192;
pub const LANDMARK_INPUT_SIZE: u32 = 224;

/// Where a frame ended up inside a square, letterboxed model input.
#[derive(Clone, Debug)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// A square, rotated region of the frame resampled to the model input size.
#[derive(Clone, Copy, Debug)]
pub struct HandCrop {
    pub center: (f32, f32),
    pub side: f32,
    /// Radians. Zero keeps the frame's orientation.
    pub angle: f32,
}

/// Maps model-input coordinates of a [`HandCrop`] back into frame pixels.
#[derive(Clone, Debug)]
pub struct CropTransform {
    crop: HandCrop,
    output_size: u32,
    orig_w: u32,
    orig_h: u32,
}

impl CropTransform {
    fn scale(&self) -> f32 {
        self.crop.side / self.output_size as f32
    }

    /// Rotates and scales a crop-space offset around the crop center.
    fn to_frame(&self, dx: f32, dy: f32) -> (f32, f32) {
        let (sin, cos) = self.crop.angle.sin_cos();
        (
            self.crop.center.0 + dx * cos - dy * sin,
            self.crop.center.1 + dx * sin + dy * cos,
        )
    }

    /// Projects one model-space landmark. Depth is scaled with x/y and the
    /// point is clamped to the frame.
    pub fn project(&self, point: Landmark) -> Landmark {
        let half = self.output_size as f32 / 2.0;
        let scale = self.scale();
        let (x, y) = self.to_frame((point[0] - half) * scale, (point[1] - half) * scale);
        [
            x.clamp(0.0, self.orig_w.saturating_sub(1) as f32),
            y.clamp(0.0, self.orig_h.saturating_sub(1) as f32),
            point[2] * scale,
        ]
    }
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    ensure!(
        frame.rgba.len() == expected,
        "frame buffer size mismatch: got {}, expected {expected}",
        frame.rgba.len()
    );
    Ok(())
}

/// Resizes the frame to fit a `size`x`size` square, pads with black and
/// normalizes to NHWC floats in `[0, 1]`.
pub fn letterbox_frame(frame: &Frame, size: u32) -> Result<(Array4<f32>, Letterbox)> {
    check_frame(frame)?;

    let scale = size as f32 / frame.width.max(frame.height) as f32;
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, size);

    let src = fir::images::ImageRef::new(frame.width, frame.height, &frame.rgba, fir::PixelType::U8x4)
        .context("frame does not form a valid image")?;
    let mut dst = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("fast resize failed")?;
    let resized = dst.into_vec();

    let side = size as usize;
    let pad_x = (side - new_w as usize) / 2;
    let pad_y = (side - new_h as usize) / 2;
    let src_stride = new_w as usize * 4;

    let mut data = vec![0.0f32; side * side * 3];
    data.par_chunks_exact_mut(side * 3)
        .enumerate()
        .skip(pad_y)
        .take(new_h as usize)
        .for_each(|(y, row)| {
            let src_row = &resized[(y - pad_y) * src_stride..(y - pad_y + 1) * src_stride];
            for (dst_px, src_px) in row[pad_x * 3..]
                .chunks_exact_mut(3)
                .zip(src_row.chunks_exact(4))
            {
                for c in 0..3 {
                    dst_px[c] = src_px[c] as f32 / 255.0;
                }
            }
        });

    let input = Array4::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build letterbox tensor: {err}"))?;

    Ok((
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

/// Samples `crop` into an `output_size` square NHWC tensor with bilinear filtering.
pub fn crop_rotated(
    frame: &Frame,
    crop: HandCrop,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        crop,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let side = output_size as usize;
    let half = output_size as f32 / 2.0;
    let scale = transform.scale();

    let mut data = vec![0.0f32; side * side * 3];
    data.par_chunks_exact_mut(side * 3)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = (y as f32 + 0.5 - half) * scale;
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let dx = (x as f32 + 0.5 - half) * scale;
                let (sx, sy) = transform.to_frame(dx, dy);
                px.copy_from_slice(&sample_bilinear(frame, sx, sy));
            }
        });

    let input = Array4::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build crop tensor: {err}"))?;
    Ok((input, transform))
}

fn sample_bilinear(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }

    let pixel = |ix: i64, iy: i64| -> [f32; 3] {
        if ix < 0 || iy < 0 || ix >= frame.width as i64 || iy >= frame.height as i64 {
            return [0.0; 3];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(rgb) => [
                rgb[0] as f32 / 255.0,
                rgb[1] as f32 / 255.0,
                rgb[2] as f32 / 255.0,
            ],
            None => [0.0; 3],
        }
    };

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (ix, iy) = (x0 as i64, y0 as i64);
    let top = [pixel(ix, iy), pixel(ix + 1, iy)];
    let bottom = [pixel(ix, iy + 1), pixel(ix + 1, iy + 1)];

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| {
        lerp(
            lerp(top[0][c], top[1][c], fx),
            lerp(bottom[0][c], bottom[1][c], fx),
            fy,
        )
    })
}

/// Reads the first 21 (x, y, z) triples of a flat landmark output.
pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<Landmark>> {
    ensure!(
        flat.len() >= NUM_LANDMARKS * 3,
        "unexpected landmarks length: got {}, need {}",
        flat.len(),
        NUM_LANDMARKS * 3
    );
    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame {
            rgba: (0..width * height)
                .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
                .collect(),
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn wide_frames_are_padded_vertically() {
        let frame = solid_frame(64, 32, [255, 255, 255]);
        let (input, letterbox) = letterbox_frame(&frame, 16).unwrap();
        assert_eq!(input.shape(), &[1, 16, 16, 3]);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 4.0);
        assert_eq!(input[[0, 0, 8, 0]], 0.0);
        assert!((input[[0, 8, 8, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let mut frame = solid_frame(8, 8, [0, 0, 0]);
        frame.rgba.truncate(10);
        assert!(letterbox_frame(&frame, 16).is_err());
        assert!(crop_rotated(&frame, HandCrop { center: (4.0, 4.0), side: 4.0, angle: 0.0 }, 8).is_err());
    }

    #[test]
    fn unrotated_crop_projects_back_to_frame_pixels() {
        let frame = solid_frame(200, 100, [0, 0, 0]);
        let crop = HandCrop {
            center: (100.0, 50.0),
            side: 80.0,
            angle: 0.0,
        };
        let (_, transform) = crop_rotated(&frame, crop, 40).unwrap();
        let center = transform.project([20.0, 20.0, 1.0]);
        assert!((center[0] - 100.0).abs() < 1e-3);
        assert!((center[1] - 50.0).abs() < 1e-3);
        assert!((center[2] - 2.0).abs() < 1e-4);

        let corner = transform.project([0.0, 0.0, 0.0]);
        assert!((corner[0] - 60.0).abs() < 1e-3);
        assert!((corner[1] - 10.0).abs() < 1e-3);
    }

    #[test]
    fn quarter_turn_rotates_offsets() {
        let frame = solid_frame(200, 200, [0, 0, 0]);
        let crop = HandCrop {
            center: (100.0, 100.0),
            side: 20.0,
            angle: std::f32::consts::FRAC_PI_2,
        };
        let (_, transform) = crop_rotated(&frame, crop, 20).unwrap();
        // Straight up in the crop maps to the right in the frame.
        let up = transform.project([10.0, 0.0, 0.0]);
        assert!((up[0] - 110.0).abs() < 1e-3);
        assert!((up[1] - 100.0).abs() < 1e-3);
    }

    #[test]
    fn landmarks_need_63_values() {
        assert!(decode_landmarks(&[0.0; 62]).is_err());
        let decoded = decode_landmarks(&(0..66).map(|v| v as f32).collect::<Vec<_>>()).unwrap();
        assert_eq!(decoded.len(), 21);
        assert_eq!(decoded[20], [60.0, 61.0, 62.0]);
    }
}
