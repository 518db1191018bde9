//! Post-interview feedback.
//!
//! Turns a finished call transcript into a scored assessment and stores it. Failures
//! never propagate to the caller: the controller only needs to know whether a
//! feedback id came back.

use super::llm::{LanguageModel, Prompt};
use super::GenerationError;
use crate::call::TranscriptMessage;
use crate::store::models::{CategoryScore, Feedback};
use crate::store::{repository, DocumentStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Categories every assessment must score, in presentation order.
pub const CATEGORIES: [&str; 5] = [
    "Communication Skills",
    "Technical Knowledge",
    "Problem-Solving",
    "Cultural & Role Fit",
    "Confidence & Clarity",
];

const MAX_SCORE: i64 = 100;

const SYSTEM_PROMPT: &str = "You are a professional interviewer analyzing a mock interview. \
     Your task is to evaluate the candidate based on structured categories";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub interview_id: String,
    pub user_id: String,
    pub transcript: Vec<TranscriptMessage>,
    /// Existing feedback to overwrite when the interview is retaken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<String>,
}

impl FeedbackOutcome {
    pub fn stored(feedback_id: String) -> Self {
        Self {
            success: true,
            feedback_id: Some(feedback_id),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            feedback_id: None,
        }
    }
}

/// What the call controller needs from feedback generation.
#[async_trait]
pub trait FeedbackService: Send + Sync {
    async fn create_feedback(&self, request: FeedbackRequest) -> FeedbackOutcome;
}

pub struct FeedbackGenerator {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn DocumentStore>,
}

impl FeedbackGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn DocumentStore>) -> Self {
        Self { llm, store }
    }

    async fn generate(&self, request: &FeedbackRequest) -> Result<String, GenerationError> {
        if request.interview_id.is_empty() || request.user_id.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "interview id and user id are required".to_string(),
            ));
        }

        let prompt = build_prompt(&request.transcript);
        let raw = self.llm.generate_object(&prompt, &response_schema()).await?;
        let assessment = parse_assessment(raw)?;

        let feedback = Feedback {
            id: String::new(),
            interview_id: request.interview_id.clone(),
            user_id: request.user_id.clone(),
            total_score: assessment.total_score,
            category_scores: assessment.category_scores,
            strengths: assessment.strengths,
            areas_for_improvement: assessment.areas_for_improvement,
            final_assessment: assessment.final_assessment,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let id = repository::save_feedback(self.store.as_ref(), request.feedback_id.as_deref(), &feedback).await?;
        Ok(id)
    }
}

#[async_trait]
impl FeedbackService for FeedbackGenerator {
    async fn create_feedback(&self, request: FeedbackRequest) -> FeedbackOutcome {
        match self.generate(&request).await {
            Ok(feedback_id) => {
                info!(
                    interview_id = %request.interview_id,
                    %feedback_id,
                    messages = request.transcript.len(),
                    "Feedback stored"
                );
                FeedbackOutcome::stored(feedback_id)
            }
            Err(e) => {
                error!(interview_id = %request.interview_id, error = %e, "Error saving feedback");
                FeedbackOutcome::failed()
            }
        }
    }
}

/// One line per message: `- role: content`.
pub fn format_transcript(transcript: &[TranscriptMessage]) -> String {
    transcript
        .iter()
        .map(|message| format!("- {}: {}\n", message.role, message.content))
        .collect()
}

pub fn build_prompt(transcript: &[TranscriptMessage]) -> Prompt {
    Prompt::new(format!(
        "You are an AI interviewer analyzing a mock interview. Your task is to evaluate the \
         candidate based on structured categories. Be thorough and detailed in your analysis. \
         Don't be lenient with the candidate. If there are mistakes or areas for improvement, \
         point them out.\n\
         Transcript:\n\
         {transcript}\n\
         Please score the candidate from 0 to 100 in the following areas. Do not add categories \
         other than the ones provided:\n\
         - **Communication Skills**: Clarity, articulation, structured responses.\n\
         - **Technical Knowledge**: Understanding of key concepts for the role.\n\
         - **Problem-Solving**: Ability to analyze problems and propose solutions.\n\
         - **Cultural & Role Fit**: Alignment with company values and job role.\n\
         - **Confidence & Clarity**: Confidence in responses, engagement, and clarity.\n",
        transcript = format_transcript(transcript),
    ))
    .with_system(SYSTEM_PROMPT)
}

/// Response schema in the OpenAPI subset the Gemini API accepts.
pub fn response_schema() -> Value {
    let category = json!({
        "type": "object",
        "properties": {
            "name": {"type": "string", "enum": CATEGORIES},
            "score": {"type": "integer"},
            "comment": {"type": "string"}
        },
        "required": ["name", "score", "comment"]
    });

    json!({
        "type": "object",
        "properties": {
            "totalScore": {"type": "integer"},
            "categoryScores": {
                "type": "array",
                "items": category,
                "minItems": CATEGORIES.len(),
                "maxItems": CATEGORIES.len()
            },
            "strengths": {"type": "array", "items": {"type": "string"}},
            "areasForImprovement": {"type": "array", "items": {"type": "string"}},
            "finalAssessment": {"type": "string"}
        },
        "required": ["totalScore", "categoryScores", "strengths", "areasForImprovement", "finalAssessment"]
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssessment {
    total_score: i64,
    category_scores: Vec<RawCategory>,
    strengths: Vec<String>,
    areas_for_improvement: Vec<String>,
    final_assessment: String,
}

#[derive(Deserialize)]
struct RawCategory {
    name: String,
    score: i64,
    comment: String,
}

#[derive(Debug, PartialEq)]
pub struct Assessment {
    pub total_score: u8,
    pub category_scores: Vec<CategoryScore>,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub final_assessment: String,
}

fn score(value: i64, what: &str) -> Result<u8, GenerationError> {
    if (0..=MAX_SCORE).contains(&value) {
        Ok(value as u8)
    } else {
        Err(GenerationError::MalformedOutput(format!(
            "{} score {} is outside 0-{}",
            what, value, MAX_SCORE
        )))
    }
}

/// Validate the model's object: exactly the five categories, each once, all scores in range.
pub fn parse_assessment(raw: Value) -> Result<Assessment, GenerationError> {
    let raw: RawAssessment = serde_json::from_value(raw)
        .map_err(|e| GenerationError::MalformedOutput(format!("assessment shape: {}", e)))?;

    let total_score = score(raw.total_score, "total")?;

    let mut seen = HashSet::new();
    let mut category_scores = Vec::with_capacity(raw.category_scores.len());
    for category in raw.category_scores {
        if !CATEGORIES.contains(&category.name.as_str()) {
            return Err(GenerationError::MalformedOutput(format!(
                "unknown category '{}'",
                category.name
            )));
        }
        if !seen.insert(category.name.clone()) {
            return Err(GenerationError::MalformedOutput(format!(
                "category '{}' scored twice",
                category.name
            )));
        }
        category_scores.push(CategoryScore {
            score: score(category.score, &category.name)?,
            name: category.name,
            comment: category.comment,
        });
    }

    if category_scores.len() != CATEGORIES.len() {
        return Err(GenerationError::MalformedOutput(format!(
            "expected {} categories, got {}",
            CATEGORIES.len(),
            category_scores.len()
        )));
    }

    category_scores.sort_by_key(|c| CATEGORIES.iter().position(|name| *name == c.name));

    Ok(Assessment {
        total_score,
        category_scores,
        strengths: raw.strengths,
        areas_for_improvement: raw.areas_for_improvement,
        final_assessment: raw.final_assessment,
    })
}
