//! `/api/vapi/generate`: called by the voice workflow once it has collected the
//! interview parameters from the user.

use crate::error::AppError;
use crate::generation::GenerateInterviewRequest;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{error, info};

fn failure(error: AppError) -> HttpResponse {
    error!(error = %error, "Interview generation failed");
    HttpResponse::InternalServerError().json(json!({
        "success": false,
        "error": {
            "type": error.kind(),
            "message": error.to_string()
        }
    }))
}

/// POST: generate questions and store the interview.
///
/// Responds `{success: true}` or a 500 with `{success: false, error}`; the workflow
/// only checks the flag.
pub async fn generate_interview(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let request: GenerateInterviewRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return failure(AppError::BadRequest(format!("Invalid request body: {}", e))),
    };

    info!(
        user_id = %request.userid,
        role = %request.role,
        amount = request.amount,
        "Generating interview"
    );

    match state.question_generator().generate(&request).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(e) => failure(e.into()),
    }
}

/// GET: liveness probe for the workflow's tool configuration.
pub async fn generate_info() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": "Thank you!" }))
}
