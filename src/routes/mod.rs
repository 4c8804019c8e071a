mod classes;
mod health;
mod predict;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub use predict::PredictError;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(health::healthcheck))
        .route("/predict", post(predict::predict_image::<M>))
        .route("/classes", get(classes::list_classes::<M>))
}
