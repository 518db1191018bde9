//! Request identity and auth-form validation.
//!
//! Credentials are verified upstream; the proxy in front of this service forwards the
//! authenticated user as `X-User-Id` / `X-User-Name` headers.

use crate::error::AppError;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use serde::Deserialize;
use std::future::{ready, Ready};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_NAME_HEADER: &str = "X-User-Name";

const MIN_NAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 3;

/// The authenticated user making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
}

impl CurrentUser {
    fn from_request_headers(req: &HttpRequest) -> Result<Self, AppError> {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let id = header(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Sign in to continue".to_string()))?;
        let name = header(USER_NAME_HEADER).unwrap_or_default();
        Ok(Self { id, name })
    }
}

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_request_headers(req))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
    SignIn,
    SignUp,
}

impl FormType {
    /// Where the browser goes after a successful submit.
    pub fn redirect(&self) -> &'static str {
        match self {
            FormType::SignUp => "/sign-in",
            FormType::SignIn => "/",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            FormType::SignUp => "Account created successfully! Please sign in to continue.",
            FormType::SignIn => "Signed in successfully!",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthForm {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

impl AuthForm {
    /// Field-level validation; returns every failing field with its message.
    pub fn validate(&self, form_type: FormType) -> Result<(), Vec<(&'static str, String)>> {
        let mut errors = Vec::new();

        if form_type == FormType::SignUp {
            let name_len = self.name.as_deref().map_or(0, |n| n.trim().chars().count());
            if name_len < MIN_NAME_LEN {
                errors.push(("name", format!("Name must contain at least {} characters", MIN_NAME_LEN)));
            }
        }

        if !is_valid_email(&self.email) {
            errors.push(("email", "Invalid email".to_string()));
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push((
                "password",
                format!("Password must contain at least {} characters", MIN_PASSWORD_LEN),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Syntactic check: `local@domain.tld`, no whitespace, one `@`.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}
