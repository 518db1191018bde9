pub mod auth;
pub mod config;
pub mod generate;
pub mod interviews;

use crate::health;
use crate::voice::bridge;
use actix_web::web;

/// Every route the service exposes. Shared by `main` and the handler tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(config::get_config))
            .route("/config", web::put().to(config::update_config))
            .route("/interviews", web::get().to(interviews::list_interviews))
            // Registered before `{id}` so "latest" isn't taken as an id
            .route("/interviews/latest", web::get().to(interviews::latest_interviews))
            .route("/interviews/{id}", web::get().to(interviews::get_interview))
            .route("/interviews/{id}/feedback", web::get().to(interviews::get_feedback))
            .route("/auth/sign-up", web::post().to(auth::sign_up))
            .route("/auth/sign-in", web::post().to(auth::sign_in))
            .route("/auth/sign-out", web::post().to(auth::sign_out)),
    )
    .route("/api/vapi/generate", web::post().to(generate::generate_interview))
    .route("/api/vapi/generate", web::get().to(generate::generate_info))
    .route("/ws/call", web::get().to(bridge::call_websocket))
    .route("/health", web::get().to(health::health_check));
}
