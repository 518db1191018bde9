//! Interview and feedback reads for the dashboard and the results page.

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::models::{Feedback, Interview};
use crate::store::{repository, DocumentStore};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

const MAX_LATEST_LIMIT: usize = 100;

/// Interview plus the fields an interview card displays.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSummary {
    #[serde(flatten)]
    pub interview: Interview,
    pub display_type: String,
    pub display_date: String,
    /// Score of the current user's feedback, when they have taken this interview
    pub total_score: Option<u8>,
}

impl InterviewSummary {
    pub fn new(interview: Interview, feedback: Option<&Feedback>) -> Self {
        let date_source = feedback.map_or(interview.created_at.as_str(), |f| f.created_at.as_str());
        Self {
            display_type: display_type(&interview.interview_type),
            display_date: display_date(date_source),
            total_score: feedback.map(|f| f.total_score),
            interview,
        }
    }
}

/// Any type mentioning "mix" (any case) is shown as "Mixed".
pub fn display_type(interview_type: &str) -> String {
    if interview_type.to_lowercase().contains("mix") {
        "Mixed".to_string()
    } else {
        interview_type.to_string()
    }
}

/// `DD/MM/YYYY` of an RFC 3339 timestamp; today when it can't be parsed.
pub fn display_date(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
        .format("%d/%m/%Y")
        .to_string()
}

async fn summarize(store: &dyn DocumentStore, user: &CurrentUser, interviews: Vec<Interview>) -> AppResult<Vec<InterviewSummary>> {
    let mut summaries = Vec::with_capacity(interviews.len());
    for interview in interviews {
        let feedback = repository::feedback_by_interview(store, &interview.id, &user.id).await?;
        summaries.push(InterviewSummary::new(interview, feedback.as_ref()));
    }
    Ok(summaries)
}

/// GET /api/v1/interviews
pub async fn list_interviews(state: web::Data<AppState>, user: CurrentUser) -> AppResult<HttpResponse> {
    let store = state.store.as_ref();
    let interviews = repository::interviews_by_user(store, &user.id).await?;
    let summaries = summarize(store, &user, interviews).await?;

    Ok(HttpResponse::Ok().json(json!({
        "count": summaries.len(),
        "interviews": summaries
    })))
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/interviews/latest?limit=
pub async fn latest_interviews(
    state: web::Data<AppState>,
    user: CurrentUser,
    query: web::Query<LatestQuery>,
) -> AppResult<HttpResponse> {
    let limit = query.limit.unwrap_or(state.get_config().interviews.latest_limit);
    if limit == 0 || limit > MAX_LATEST_LIMIT {
        return Err(AppError::ValidationError(format!(
            "limit must be between 1 and {}",
            MAX_LATEST_LIMIT
        )));
    }

    let store = state.store.as_ref();
    let interviews = repository::latest_interviews(store, &user.id, limit).await?;
    let summaries = summarize(store, &user, interviews).await?;

    Ok(HttpResponse::Ok().json(json!({
        "count": summaries.len(),
        "interviews": summaries
    })))
}

/// GET /api/v1/interviews/{id}
pub async fn get_interview(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let store = state.store.as_ref();
    let interview = repository::interview_by_id(store, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview {} not found", id)))?;

    let feedback = repository::feedback_by_interview(store, &id, &user.id).await?;
    Ok(HttpResponse::Ok().json(InterviewSummary::new(interview, feedback.as_ref())))
}

/// GET /api/v1/interviews/{id}/feedback
pub async fn get_feedback(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let feedback = repository::feedback_by_interview(state.store.as_ref(), &id, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No feedback for interview {}", id)))?;

    Ok(HttpResponse::Ok().json(feedback))
}
