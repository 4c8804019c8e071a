use crate::{
    model_service::{ModelService, ModelServiceError},
    prediction::PredictionResponse,
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("{0}")]
    Model(#[from] ModelServiceError),
    #[error("Prediction task failed: {0}")]
    Task(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match &self {
            PredictError::MissingFile | PredictError::EmptyFile | PredictError::ImageDecode(_) => {
                StatusCode::BAD_REQUEST
            }
            PredictError::Multipart(err) => err.status(),
            PredictError::Model(ModelServiceError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            PredictError::Model(_) | PredictError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Prediction failed: {}", self);
        } else {
            tracing::warn!("Rejected prediction request: {}", self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Picks the `file` field, falling back to the first field carrying a filename.
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, PredictError> {
    let mut fallback = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await?);
        }
        if fallback.is_none() && field.file_name().is_some() {
            fallback = Some(field.bytes().await?);
        }
    }
    fallback.ok_or(PredictError::MissingFile)
}

fn decode_image(image_data: &[u8]) -> Result<RgbImage, PredictError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PredictError::ImageDecode(image::ImageError::IoError(e)))?;

    Ok(image_reader.decode()?.to_rgb8())
}

#[instrument(skip(state, multipart))]
pub async fn predict_image<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, PredictError> {
    let image_data = read_upload(multipart).await?;
    if image_data.is_empty() {
        return Err(PredictError::EmptyFile);
    }
    tracing::debug!("Received upload of {} bytes", image_data.len());

    let model_service = state.model_service.clone();
    let inference = state.inference;
    let detections = tokio::task::spawn_blocking(move || {
        let image = decode_image(&image_data)?;
        Ok::<_, PredictError>(model_service.detect(&image, &inference)?)
    })
    .await
    .map_err(|e| PredictError::Task(e.to_string()))??;

    let response = PredictionResponse::from_detections(&state.catalog, &detections);
    tracing::debug!(
        "{} detections, prediction={} confidence={:.4}",
        detections.len(),
        response.prediction,
        response.confidence
    );

    Ok(Json(response))
}
