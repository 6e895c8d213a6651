//! Shared application state handed to every request handler.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackendConfig, EngineConfig};
use crate::convert::{ConversionPipeline, ConverterBackend, GotenbergBackend, SofficeBackend};
use crate::generators::DocumentService;
use crate::templates::{cached_or_plain, FsTemplateStore};

#[derive(Clone)]
pub struct AppState {
    pub service: DocumentService,
    pub config: Arc<EngineConfig>,
}

impl AppState {
    pub fn new(config: EngineConfig) -> anyhow::Result<Self> {
        let backend = build_backend(&config)?;
        let pipeline = Arc::new(ConversionPipeline::new(backend, config.pipeline_options()));
        let templates = cached_or_plain(
            FsTemplateStore::new(&config.template_dir),
            config.template_cache_capacity,
        );

        log::info!(
            "Templates from {} (cache capacity {}), converter '{}' with {} slot(s)",
            config.template_dir.display(),
            config.template_cache_capacity,
            pipeline.backend_name(),
            config.converter_concurrency
        );

        let service = DocumentService::new(templates, pipeline).with_policy(config.unresolved_tokens);
        Ok(Self {
            service,
            config: Arc::new(config),
        })
    }

    /// Stop accepting conversions; queued callers fail fast.
    pub fn shutdown(&self) {
        self.service.pipeline().shutdown();
    }
}

fn build_backend(config: &EngineConfig) -> anyhow::Result<Arc<dyn ConverterBackend>> {
    Ok(match &config.backend {
        BackendConfig::Soffice { binary } => Arc::new(SofficeBackend::new(binary.clone())),
        BackendConfig::Gotenberg { url } => {
            let client = reqwest::Client::builder()
                .pool_idle_timeout(Duration::from_secs(900))
                .connect_timeout(Duration::from_secs(10))
                .user_agent(concat!("pestdocs-server/", env!("CARGO_PKG_VERSION")))
                .build()?;
            Arc::new(GotenbergBackend::new(client, url.clone()))
        }
    })
}
