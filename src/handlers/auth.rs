//! Auth form endpoints.
//!
//! Only the form rules are checked here; account creation and credential checks
//! happen in the identity provider. The response tells the browser where to go next.

use crate::auth::{AuthForm, FormType};
use crate::routes::Route;
use actix_web::{web, HttpResponse};
use serde_json::{json, Map, Value};
use tracing::debug;

fn submit(form: &AuthForm, form_type: FormType) -> HttpResponse {
    match form.validate(form_type) {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": form_type.success_message(),
            "redirect": form_type.redirect()
        })),
        Err(errors) => {
            debug!(?form_type, fields = errors.len(), "Auth form rejected");
            let fields: Map<String, Value> = errors
                .into_iter()
                .map(|(field, message)| (field.to_string(), Value::String(message)))
                .collect();
            HttpResponse::BadRequest().json(json!({
                "success": false,
                "errors": fields
            }))
        }
    }
}

/// POST /api/v1/auth/sign-up
pub async fn sign_up(form: web::Json<AuthForm>) -> HttpResponse {
    submit(&form, FormType::SignUp)
}

/// POST /api/v1/auth/sign-in
pub async fn sign_in(form: web::Json<AuthForm>) -> HttpResponse {
    submit(&form, FormType::SignIn)
}

/// POST /api/v1/auth/sign-out
pub async fn sign_out() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "redirect": Route::SignIn.path()
    }))
}
