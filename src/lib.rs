mod routes;
mod server;

pub mod app;
pub mod catalog;
pub mod config;
pub mod detection;
pub mod model_service;
pub mod ort_service;
pub mod prediction;

pub use app::start_app;
pub use routes::PredictError;
pub use server::{build_router, HttpServer, SharedState};
