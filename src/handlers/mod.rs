pub mod messages;
pub mod token;
pub mod web_client;

use actix_web::{web, HttpResponse};
use serde_json::json;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(web_client::index))
        .route("/app.js", web::get().to(web_client::script))
        .route("/health", web::get().to(health_check))
        .route("/api/token", web::post().to(token::issue_token))
        .route("/api/messages", web::post().to(messages::receive_activity));
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
