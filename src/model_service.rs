use crate::{config::InferenceConfig, detection::Detection};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelServiceError {
    #[error("Invalid input image: {0}")]
    InvalidImage(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Unexpected model output: {0}")]
    Output(String),
}

/// A loaded detector. `detect` is blocking and must be safe to call from
/// several threads at once.
pub trait ModelService: Send + Sync + 'static {
    /// Returns detections with confidence at or above
    /// `config.min_probability`, highest confidence first.
    fn detect(
        &self,
        image: &RgbImage,
        config: &InferenceConfig,
    ) -> Result<Vec<Detection>, ModelServiceError>;
}
