use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use messaging_core::config::Config;
use messaging_core::error::AppError;
use messaging_core::logging::init_tracing;
use messaging_core::push::http::HttpPushProvider;
use messaging_core::state::AppState;
use messaging_core::storage::postgres::PgStorage;
use messaging_core::websocket::session::ws_route;
use serde_json::json;
use std::sync::Arc;

async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    init_tracing();

    let config = Arc::new(Config::from_env()?);
    let storage = Arc::new(PgStorage::connect(&config.database_url)?);
    let push = Arc::new(HttpPushProvider::new(
        config.push_endpoint.clone(),
        storage.clone(),
    ));
    let state = AppState::new(storage, push, config.clone());

    let port = config.port;
    tracing::info!(port, "messaging core listening");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(state.clone()))
            .route("/healthz", web::get().to(healthz))
            .route("/ws", web::get().to(ws_route))
    })
    .bind(("0.0.0.0", port))
    .map_err(|e| AppError::StartServer(e.to_string()))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(e.to_string()))
}
