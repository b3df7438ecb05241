use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Decodes a camera buffer into an RGBA [`Frame`], optionally flipped left-to-right.
pub fn convert_camera_frame(buffer: &Buffer, mirrored: bool) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (mut width, mut height) = (resolution.width_x, resolution.height_y);
    let data = buffer.buffer();

    let mut rgba = match buffer.source_frame_format() {
        FrameFormat::NV12 => nv12_to_rgba(data, width, height)?,
        FrameFormat::YUYV => yuyv_to_rgba(data, width, height)?,
        FrameFormat::MJPEG => {
            let (rgba, w, h) = mjpeg_to_rgba(data)?;
            // Trust the JPEG header over the negotiated resolution.
            width = w;
            height = h;
            rgba
        }
        FrameFormat::RAWRGB => packed_rgb_to_rgba(data, width, height, false)?,
        FrameFormat::RAWBGR => packed_rgb_to_rgba(data, width, height, true)?,
        FrameFormat::GRAY => gray_to_rgba(data, width, height)?,
    };

    if mirrored {
        mirror_horizontal(&mut rgba, width, height);
    }

    Ok(Frame {
        rgba,
        width,
        height,
        timestamp: Instant::now(),
    })
}

/// Flips an RGBA image around its vertical axis in place.
pub fn mirror_horizontal(rgba: &mut [u8], width: u32, height: u32) {
    let row_len = width as usize * 4;
    if row_len == 0 || rgba.len() < row_len * height as usize {
        return;
    }

    rgba.par_chunks_exact_mut(row_len)
        .take(height as usize)
        .for_each(|row| {
            let (mut left, mut right) = (0usize, width as usize - 1);
            while left < right {
                for channel in 0..4 {
                    row.swap(left * 4 + channel, right * 4 + channel);
                }
                left += 1;
                right -= 1;
            }
        });
}

fn ensure_len(kind: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        bail!(
            "{kind} buffer too small: got {}, expected {expected}",
            data.len()
        );
    }
    Ok(())
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let luma_len = pixel_count(width, height);
    let chroma_len = luma_len / 2;
    ensure_len("NV12", data, luma_len + chroma_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..luma_len],
        y_stride: width,
        uv_plane: &data[luma_len..luma_len + chroma_len],
        uv_stride: width,
        width,
        height,
    };

    let mut rgba = vec![0u8; luma_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    ensure_len("YUYV", data, pixel_count(width, height) * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder returned no image info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?;
    let height = u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?;
    ensure_len("MJPEG output", &rgba, pixel_count(width, height) * 4)?;

    Ok((rgba, width, height))
}

fn packed_rgb_to_rgba(data: &[u8], width: u32, height: u32, bgr: bool) -> Result<Vec<u8>> {
    ensure_len(if bgr { "BGR" } else { "RGB" }, data, pixel_count(width, height) * 3)?;

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = if bgr { (src[2], src[0]) } else { (src[0], src[2]) };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });

    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let count = pixel_count(width, height);
    ensure_len("GRAY", data, count)?;

    let mut rgba = vec![0u8; count * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(data[..count].par_iter())
        .for_each(|(dst, &value)| dst.copy_from_slice(&[value, value, value, 255]));

    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_swaps_pixels_within_each_row() {
        // 3x2 image, each pixel tagged by its index.
        let mut rgba: Vec<u8> = (0..6u8).flat_map(|i| [i, i, i, 255]).collect();
        mirror_horizontal(&mut rgba, 3, 2);
        let tags: Vec<u8> = rgba.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(tags, vec![2, 1, 0, 5, 4, 3]);
        assert!(rgba.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn mirror_twice_restores_the_image() {
        let original: Vec<u8> = (0..(4 * 3 * 4)).map(|v| v as u8).collect();
        let mut rgba = original.clone();
        mirror_horizontal(&mut rgba, 4, 3);
        assert_ne!(rgba, original);
        mirror_horizontal(&mut rgba, 4, 3);
        assert_eq!(rgba, original);
    }

    #[test]
    fn bgr_channels_are_reordered() {
        let rgba = packed_rgb_to_rgba(&[10, 20, 30, 40, 50, 60], 2, 1, true).unwrap();
        assert_eq!(rgba, vec![30, 20, 10, 255, 60, 50, 40, 255]);
        let rgba = packed_rgb_to_rgba(&[10, 20, 30], 1, 1, false).unwrap();
        assert_eq!(rgba, vec![10, 20, 30, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(gray_to_rgba(&[1, 2, 3], 2, 2).is_err());
        assert!(packed_rgb_to_rgba(&[0; 5], 2, 1, false).is_err());
        assert!(yuyv_to_rgba(&[0; 7], 2, 2).is_err());
    }

    #[test]
    fn gray_expands_to_opaque_rgba() {
        let rgba = gray_to_rgba(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgba, vec![7, 7, 7, 255, 200, 200, 200, 255]);
    }
}
