use crate::{
    catalog::ClassCatalog,
    config::{Config, InferenceConfig},
    model_service::ModelService,
    routes::api_routes,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};

/// Read-only context shared by every request handler.
pub struct SharedState<M: ModelService> {
    pub model_service: Arc<M>,
    pub catalog: Arc<ClassCatalog>,
    pub inference: InferenceConfig,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            catalog: self.catalog.clone(),
            inference: self.inference,
        }
    }
}

pub fn build_router<M: ModelService>(state: SharedState<M>, max_upload_bytes: usize) -> Router {
    api_routes::<M>()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        model_service: M,
        catalog: ClassCatalog,
        config: &Config,
    ) -> std::io::Result<Self> {
        let state = SharedState {
            model_service: Arc::new(model_service),
            catalog: Arc::new(catalog),
            inference: config.inference,
        };
        let router = build_router(state, config.server.max_upload_bytes);
        let listener = TcpListener::bind(config.server.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> std::io::Result<()> {
        tracing::info!("Listening on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown");
            })
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
