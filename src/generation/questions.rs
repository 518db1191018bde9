//! Interview question generation.
//!
//! The voice workflow collects role, level, tech stack, focus and question count from
//! the user and posts them to the generate endpoint. We ask the model for a JSON array
//! literal of questions, validate it, and store the resulting interview.

use super::llm::{LanguageModel, Prompt};
use super::GenerationError;
use crate::store::models::Interview;
use crate::store::{repository, DocumentStore};
use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::{info, warn};

/// Cover images shown on interview cards.
pub const COVER_IMAGES: &[&str] = &[
    "/covers/adobe.png",
    "/covers/amazon.png",
    "/covers/facebook.png",
    "/covers/hostinger.png",
    "/covers/pinterest.png",
    "/covers/quora.png",
    "/covers/reddit.png",
    "/covers/skype.png",
    "/covers/spotify.png",
    "/covers/telegram.png",
    "/covers/tiktok.png",
    "/covers/yahoo.png",
];

/// Body posted by the voice workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateInterviewRequest {
    #[serde(rename = "type")]
    pub interview_type: String,
    pub role: String,
    pub level: String,
    /// Comma-separated list, e.g. "React, TypeScript, Node"
    pub techstack: String,
    /// Number of questions; the workflow may send it as a string
    #[serde(deserialize_with = "number_or_string")]
    pub amount: u32,
    pub userid: String,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(u32),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Number(n) => Ok(n),
        Amount::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("amount is not a number: {:?}", s))),
    }
}

pub struct QuestionGenerator {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn DocumentStore>,
}

impl QuestionGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn DocumentStore>) -> Self {
        Self { llm, store }
    }

    /// Generate questions for the request, persist the interview and return it (with id).
    pub async fn generate(&self, request: &GenerateInterviewRequest) -> Result<Interview, GenerationError> {
        validate_request(request)?;

        let text = self.llm.generate_text(&build_prompt(request)).await?;
        let questions = parse_questions(&text)?;

        let mut interview = Interview {
            id: String::new(),
            role: request.role.trim().to_string(),
            interview_type: request.interview_type.trim().to_string(),
            level: request.level.trim().to_string(),
            techstack: split_techstack(&request.techstack),
            questions,
            user_id: request.userid.clone(),
            finalized: true,
            cover_image: random_cover().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        interview.id = repository::save_interview(self.store.as_ref(), &interview).await?;

        info!(
            interview_id = %interview.id,
            user_id = %interview.user_id,
            questions = interview.questions.len(),
            "Interview generated"
        );
        Ok(interview)
    }
}

fn validate_request(request: &GenerateInterviewRequest) -> Result<(), GenerationError> {
    if request.userid.trim().is_empty() {
        return Err(GenerationError::InvalidRequest("userid is required".to_string()));
    }
    if request.role.trim().is_empty() {
        return Err(GenerationError::InvalidRequest("role is required".to_string()));
    }
    if request.amount == 0 {
        return Err(GenerationError::InvalidRequest("amount must be at least 1".to_string()));
    }
    Ok(())
}

pub fn build_prompt(request: &GenerateInterviewRequest) -> Prompt {
    Prompt::new(format!(
        "Prepare questions for a job interview.\n\
         The job role is {role}.\n\
         The job experience level is {level}.\n\
         The tech stack used in the job is: {techstack}.\n\
         The focus between behavioural and technical questions should lean towards: {focus}.\n\
         The amount of questions required is: {amount}.\n\
         Please return only the questions, without any additional text.\n\
         The questions are going to be read by a voice assistant so do not use \"/\" or \"*\" \
         or any other special characters which might break the voice assistant.\n\
         Return the questions formatted like this:\n\
         [\"Question 1\", \"Question 2\", \"Question 3\"]\n",
        role = request.role.trim(),
        level = request.level.trim(),
        techstack = request.techstack.trim(),
        focus = request.interview_type.trim(),
        amount = request.amount,
    ))
}

/// Parse the model's answer as a JSON array of question strings.
///
/// A surrounding Markdown code fence is tolerated; anything else that isn't a non-empty
/// array of strings is `MalformedOutput`.
pub fn parse_questions(text: &str) -> Result<Vec<String>, GenerationError> {
    let body = strip_code_fence(text.trim());

    let questions: Vec<String> = serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, "Question list is not a JSON string array");
        GenerationError::MalformedOutput(format!("expected a JSON array of strings: {}", e))
    })?;

    let questions: Vec<String> = questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    if questions.is_empty() {
        return Err(GenerationError::MalformedOutput("question list is empty".to_string()));
    }
    Ok(questions)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Split "React, TypeScript,Node" into trimmed, non-empty entries.
pub fn split_techstack(techstack: &str) -> Vec<String> {
    techstack
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn random_cover() -> &'static str {
    COVER_IMAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(COVER_IMAGES[0])
}
