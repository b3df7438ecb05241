use crate::{config::OverlayStyle, types::HandDetection};

/// Bone segments drawn for one hand: four per finger plus three across the palm.
pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

/// A 2-D drawing target for the landmark overlay.
pub trait DrawSurface {
    fn clear(&mut self);
    fn fill_circle(&mut self, center: (f32, f32), radius: i32, color: [u8; 4]);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: i32, color: [u8; 4]);
}

/// Draws every detection. The caller clears the surface beforehand.
pub fn render_overlay<S: DrawSurface>(
    surface: &mut S,
    detections: &[HandDetection],
    style: &OverlayStyle,
) {
    for detection in detections {
        render_hand(surface, detection, style);
    }
}

pub fn render_hand<S: DrawSurface>(surface: &mut S, detection: &HandDetection, style: &OverlayStyle) {
    for point in &detection.landmarks {
        surface.fill_circle((point[0], point[1]), style.point_radius, style.color);
    }

    for &(a, b) in HAND_CONNECTIONS {
        if let (Some(pa), Some(pb)) = (detection.landmarks.get(a), detection.landmarks.get(b)) {
            surface.stroke_line((pa[0], pa[1]), (pb[0], pb[1]), style.line_width, style.color);
        }
    }
}

/// Immutable copy of the overlay canvas handed to the UI.
#[derive(Clone, Debug)]
pub struct Overlay {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Transparent RGBA canvas sized to the camera frame.
#[derive(Debug, Default)]
pub struct OverlayCanvas {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl OverlayCanvas {
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.buffer = vec![0u8; (width as usize) * (height as usize) * 4];
    }

    pub fn snapshot(&self) -> Overlay {
        Overlay {
            width: self.width,
            height: self.height,
            rgba: self.buffer.clone(),
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = ((uy as usize) * (self.width as usize) + ux as usize) * 4;
        if idx + 3 < self.buffer.len() {
            self.buffer[idx..idx + 4].copy_from_slice(&color);
        }
    }
}

impl DrawSurface for OverlayCanvas {
    fn clear(&mut self) {
        self.buffer.fill(0);
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: i32, color: [u8; 4]) {
        let (cx, cy) = (center.0 as i32, center.1 as i32);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: i32, color: [u8; 4]) {
        let (mut x0, mut y0) = (from.0 as i32, from.1 as i32);
        let (x1, y1) = (to.0 as i32, to.1 as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let brush = width.max(1) / 2;

        loop {
            for ox in -brush..=brush {
                for oy in -brush..=brush {
                    if ox.abs() + oy.abs() <= brush {
                        self.put_pixel(x0 + ox, y0 + oy, color);
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }
}
