//! # Call Sessions
//!
//! Drives one voice interview call: opening the voice channel, tracking its status,
//! accumulating the transcript, and deciding what happens once the call ends.
//!
//! ## Call Lifecycle:
//! 1. **INACTIVE**: Nothing started yet
//! 2. **CONNECTING**: Channel asked to start, waiting for `call-start`
//! 3. **ACTIVE**: Call running, final transcript messages are collected
//! 4. **FINISHED**: Call ended (by the channel or by `stop()`); post-call work dispatched
//!
//! ## Components:
//! - **machine**: the pure transition function (status + inputs -> next status + effects)
//! - **controller**: runs those effects against the channel, feedback service and view

pub mod controller;
pub mod machine;

pub use controller::{CallController, CallView};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a call as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    #[default]
    Inactive,
    Connecting,
    Active,
    Finished,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Inactive => "INACTIVE",
            CallStatus::Connecting => "CONNECTING",
            CallStatus::Active => "ACTIVE",
            CallStatus::Finished => "FINISHED",
        }
    }

    /// A call is in progress while connecting or active.
    pub fn in_progress(&self) -> bool {
        matches!(self, CallStatus::Connecting | CallStatus::Active)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
}

impl Role {
    /// Parse the role string the voice SDK reports. Unknown roles are `None`.
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Role::User),
            "system" => Some(Role::System),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

/// One finalized utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
}

impl TranscriptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// What a call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// The voice workflow collects interview parameters and calls the generate endpoint
    Generate,
    /// The interviewer asks a stored interview's questions
    Conduct,
}

/// Caller identity and interview context for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParameters {
    pub user_id: String,
    pub user_name: String,
    pub interview_id: Option<String>,
    /// Existing feedback to overwrite when an interview is retaken
    pub feedback_id: Option<String>,
    pub questions: Vec<String>,
}

impl SessionParameters {
    pub fn validate(&self, mode: SessionMode) -> Result<(), CallError> {
        if self.user_id.trim().is_empty() {
            return Err(CallError::InvalidParameters("user id is required".to_string()));
        }
        if mode == SessionMode::Conduct {
            if self.interview_id.as_deref().map_or(true, str::is_empty) {
                return Err(CallError::InvalidParameters(
                    "an interview id is required to conduct an interview".to_string(),
                ));
            }
            if self.questions.is_empty() {
                return Err(CallError::InvalidParameters(
                    "the interview has no questions".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Presentation state pushed to the view after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub is_speaking: bool,
    /// Most recent final utterance, if any
    pub last_message: Option<String>,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("a call is already in progress")]
    AlreadyInProgress,

    #[error("invalid call parameters: {0}")]
    InvalidParameters(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SessionParameters {
        SessionParameters {
            user_id: "u1".to_string(),
            user_name: "Ada".to_string(),
            interview_id: Some("i1".to_string()),
            feedback_id: None,
            questions: vec!["Q1".to_string()],
        }
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(CallStatus::Connecting).unwrap(), "CONNECTING");
        assert_eq!(CallStatus::Finished.to_string(), "FINISHED");
        assert!(CallStatus::Active.in_progress());
        assert!(!CallStatus::Finished.in_progress());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("tool"), None);
    }

    #[test]
    fn test_conduct_needs_interview_and_questions() {
        assert!(params().validate(SessionMode::Conduct).is_ok());

        let mut no_questions = params();
        no_questions.questions.clear();
        assert!(no_questions.validate(SessionMode::Conduct).is_err());
        // Generate calls don't use questions
        assert!(no_questions.validate(SessionMode::Generate).is_ok());

        let mut no_interview = params();
        no_interview.interview_id = None;
        assert!(no_interview.validate(SessionMode::Conduct).is_err());
    }

    #[test]
    fn test_user_id_required() {
        let mut anonymous = params();
        anonymous.user_id = " ".to_string();
        assert!(matches!(
            anonymous.validate(SessionMode::Generate),
            Err(CallError::InvalidParameters(_))
        ));
    }
}
