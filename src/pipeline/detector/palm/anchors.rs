use std::sync::LazyLock;

use super::super::preprocess::PALM_INPUT_SIZE;

/// SSD layer strides of the MediaPipe palm detector.
const STRIDES: [u32; 4] = [8, 16, 16, 16];
const ANCHORS_PER_LAYER: usize = 2;

/// Normalized (x, y) anchor centers in model output order.
pub static ANCHORS: LazyLock<Vec<[f32; 2]>> = LazyLock::new(generate_anchors);

fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    let mut layer = 0;

    while layer < STRIDES.len() {
        let stride = STRIDES[layer];
        // Consecutive layers sharing a stride emit their anchors per cell together.
        let mut per_cell = 0;
        while layer < STRIDES.len() && STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let grid = PALM_INPUT_SIZE.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }

    anchors
}
