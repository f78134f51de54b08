use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use std::sync::Arc;

use xray_worker::audit::{AuditSink, PgAuditStore};
use xray_worker::config::ServiceConfig;
use xray_worker::error::StartupError;
use xray_worker::inference::{InferenceModel, TorchScriptBackbone};
use xray_worker::orchestrator::BatchOrchestrator;
use xray_worker::routes::configure_routes;

fn startup_failed(e: StartupError) -> std::io::Error {
    log::error!("Startup failed: {}", e);
    std::io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServiceConfig::load()
        .map_err(StartupError::from)
        .map_err(startup_failed)?;

    let model = InferenceModel::load_with(&config.model_path, TorchScriptBackbone::load)
        .map_err(startup_failed)?;

    let store = PgAuditStore::connect_lazy(&config.database);
    let audit = AuditSink::new(Arc::new(store), config.audit_timeout());
    let orchestrator = web::Data::new(BatchOrchestrator::new(Arc::new(model), audit));

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(orchestrator.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
