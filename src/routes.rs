//! Client-side routes the server can send the browser to.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    /// Results view for one interview
    Feedback { interview_id: String },
    SignIn,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Feedback { interview_id } => format!("/interview/{}/feedback", interview_id),
            Route::SignIn => "/sign-in".to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
