pub mod camera;
pub mod detection_loop;
pub mod detector;
pub mod overlay;
pub mod rgba_converter;
