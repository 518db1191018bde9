use crate::config::AppConfig;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::{json, Value};

/// Public view of the configuration. Secrets are reported as "configured" flags only.
fn config_view(config: &AppConfig) -> Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "llm": {
            "model": config.llm.model,
            "base_url": config.llm.base_url,
            "timeout_secs": config.llm.timeout_secs,
            "api_key_configured": config.llm_configured()
        },
        "voice": {
            "workflow_configured": config.workflow_configured(),
            "interviewer": {
                "name": config.voice.interviewer.name,
                "first_message": config.voice.interviewer.first_message,
                "voice_provider": config.voice.interviewer.voice_provider,
                "model": config.voice.interviewer.model
            }
        },
        "storage": {
            "persistent": !config.storage.snapshot_path.trim().is_empty()
        },
        "performance": {
            "max_concurrent_sessions": config.performance.max_concurrent_sessions,
            "heartbeat_interval_secs": config.performance.heartbeat_interval_secs,
            "client_timeout_secs": config.performance.client_timeout_secs
        },
        "interviews": {
            "latest_limit": config.interviews.latest_limit
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_view(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_view(&current_config)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::questions::tests::CannedModel;
    use crate::handlers::configure_routes;
    use crate::state::tests::test_state;
    use actix_web::{test as actix_test, App};

    #[test]
    fn test_view_hides_secrets() {
        let mut config = AppConfig::default();
        config.llm.api_key = "super-secret".to_string();
        let view = config_view(&config);

        assert_eq!(view["llm"]["api_key_configured"], true);
        assert!(!view.to_string().contains("super-secret"));
    }

    #[actix_web::test]
    async fn test_put_updates_and_validates() {
        let state = test_state(CannedModel::failing());
        let app = actix_test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(configure_routes)).await;

        let req = actix_test::TestRequest::put()
            .uri("/api/v1/config")
            .set_json(json!({"interviews": {"latest_limit": 8}}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(state.get_config().interviews.latest_limit, 8);

        let req = actix_test::TestRequest::put()
            .uri("/api/v1/config")
            .set_json(json!({"performance": {"max_concurrent_sessions": 0}}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(state.get_config().performance.max_concurrent_sessions, 50);
    }
}
