//! # Generation
//!
//! Prompt assembly and output validation around the hosted language model:
//! - **llm**: the `LanguageModel` seam and its Gemini implementation
//! - **questions**: interview question lists (free text parsed as a JSON array)
//! - **feedback**: post-interview scoring (schema-constrained object), persisted to the store

pub mod feedback;
pub mod llm;
pub mod questions;

pub use feedback::{FeedbackGenerator, FeedbackOutcome, FeedbackRequest, FeedbackService};
pub use llm::{GeminiClient, LanguageModel, LlmError};
pub use questions::{GenerateInterviewRequest, QuestionGenerator};

use crate::store::StoreError;

/// Failure of a generate-and-persist operation.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The model answered, but not in the structure we asked for
    #[error("{0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
