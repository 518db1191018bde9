//! Typed documents stored in the `interviews` and `feedback` collections.
//!
//! Field names are camelCase both on the wire and in storage, matching the
//! documents the browser client already reads.

use serde::{Deserialize, Serialize};

/// A generated interview: the question list plus the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    /// Document id (empty until stored)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub role: String,
    /// Focus of the questions: "technical", "behavioural", "mixed"...
    #[serde(rename = "type")]
    pub interview_type: String,
    pub level: String,
    pub techstack: Vec<String>,
    pub questions: Vec<String>,
    pub user_id: String,
    pub finalized: bool,
    pub cover_image: String,
    /// RFC 3339 timestamp; lexicographic order equals chronological order
    pub created_at: String,
}

/// One scored category of an interview assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub name: String,
    pub score: u8,
    pub comment: String,
}

/// AI-scored feedback for one conducted interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub interview_id: String,
    pub user_id: String,
    pub total_score: u8,
    pub category_scores: Vec<CategoryScore>,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub final_assessment: String,
    pub created_at: String,
}
