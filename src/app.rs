use crate::{
    catalog::ClassCatalog, config::Config, ort_service::OrtModelService, server::HttpServer,
};
use std::error::Error;

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let model_service = match OrtModelService::new(&config.model) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(
                "Failed to load model {:?}: {:?}",
                config.model.get_path(),
                e
            );
            return Err(Box::new(e));
        }
    };

    let metadata = model_service.class_names_metadata()?;
    let labels_path = config.labels.as_ref().map(|labels| labels.get_path());
    let catalog = match ClassCatalog::resolve(
        metadata.as_deref(),
        labels_path.as_deref(),
        model_service.num_classes(),
    ) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!("Failed to load class catalog: {:?}", e);
            return Err(Box::new(e));
        }
    };

    tracing::info!(
        "YOLOv8 model loaded with {} classes: {:?}",
        catalog.len(),
        catalog.names()
    );

    let server = HttpServer::new(model_service, catalog, &config).await?;
    server.run().await?;

    Ok(())
}
