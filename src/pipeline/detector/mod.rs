mod ort;
mod palm;
mod preprocess;

use std::path::Path;

use ::ort::session::{Session, builder::GraphOptimizationLevel};
use anyhow::{Context, Result};

use crate::types::{Frame, HandDetection};

pub use self::ort::OrtHandDetector;

/// Finds hands in a frame and returns their landmarks in frame pixel space.
pub trait PoseDetector: Send + 'static {
    fn estimate_hands(&mut self, frame: &Frame) -> Result<Vec<HandDetection>>;
}

fn build_session(model_path: &Path, what: &str) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load {what} from {}", model_path.display()))
}
