use actix_web::middleware::{Compress, Logger};
use actix_web::{web, App, HttpServer};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod format;
pub mod generators;
pub mod http;
pub mod state;
pub mod templates;

pub use crate::config::EngineConfig;
pub use crate::error::DocumentError;
pub use crate::format::Format;
pub use crate::generators::{DocumentService, GeneratedDocument};
pub use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }
}

pub async fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(config)?;
    let shared = web::Data::new(app_state.clone());

    log::info!("Starting server at http://{}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(Compress::default())
            .wrap(Logger::default())
            .app_data(shared.clone())
            .service(web::scope("/api").configure(http::config))
            .route("/health", web::get().to(http::health))
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(bind_addr.as_str())?
    .run()
    .await?;

    app_state.shutdown();
    log::info!("Server stopped");
    Ok(())
}
