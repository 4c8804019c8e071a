use crate::{model_service::ModelService, server::SharedState};
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct ClassList {
    classes: Vec<String>,
}

pub async fn list_classes<M: ModelService>(State(state): State<SharedState<M>>) -> Json<ClassList> {
    Json(ClassList {
        classes: state.catalog.names().to_vec(),
    })
}
