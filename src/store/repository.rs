//! Typed reads and writes over the `interviews` and `feedback` collections.

use super::models::{Feedback, Interview};
use super::{Direction, DocumentStore, Query, StoreError, FEEDBACK, INTERVIEWS};
use serde::Serialize;
use serde_json::Value;

/// Serialize a model into a document body (the `id` lives outside the body).
fn to_body<T: Serialize>(model: &T) -> Result<Value, StoreError> {
    let mut value = serde_json::to_value(model)?;
    if let Value::Object(map) = &mut value {
        map.remove("id");
    }
    Ok(value)
}

/// Persist a new interview and return its id.
pub async fn save_interview(store: &dyn DocumentStore, interview: &Interview) -> Result<String, StoreError> {
    store.add(INTERVIEWS, to_body(interview)?).await
}

/// All interviews created by one user, newest first.
pub async fn interviews_by_user(store: &dyn DocumentStore, user_id: &str) -> Result<Vec<Interview>, StoreError> {
    let query = Query::new()
        .where_eq("userId", user_id)
        .order_by("createdAt", Direction::Desc);

    store
        .query(INTERVIEWS, &query)
        .await?
        .into_iter()
        .map(|doc| doc.into_typed())
        .collect()
}

/// Finalized interviews created by anyone except `user_id`, newest first.
pub async fn latest_interviews(
    store: &dyn DocumentStore,
    user_id: &str,
    limit: usize,
) -> Result<Vec<Interview>, StoreError> {
    let query = Query::new()
        .order_by("createdAt", Direction::Desc)
        .where_eq("finalized", true)
        .where_ne("userId", user_id)
        .limit(limit);

    store
        .query(INTERVIEWS, &query)
        .await?
        .into_iter()
        .map(|doc| doc.into_typed())
        .collect()
}

pub async fn interview_by_id(store: &dyn DocumentStore, id: &str) -> Result<Option<Interview>, StoreError> {
    store.get(INTERVIEWS, id).await?.map(|doc| doc.into_typed()).transpose()
}

/// Store feedback under `id` when given (regeneration overwrites), otherwise under a new id.
pub async fn save_feedback(
    store: &dyn DocumentStore,
    id: Option<&str>,
    feedback: &Feedback,
) -> Result<String, StoreError> {
    let body = to_body(feedback)?;
    match id {
        Some(id) => {
            store.set(FEEDBACK, id, body).await?;
            Ok(id.to_string())
        }
        None => store.add(FEEDBACK, body).await,
    }
}

/// The most recent feedback a user received for an interview.
pub async fn feedback_by_interview(
    store: &dyn DocumentStore,
    interview_id: &str,
    user_id: &str,
) -> Result<Option<Feedback>, StoreError> {
    let query = Query::new()
        .where_eq("interviewId", interview_id)
        .where_eq("userId", user_id)
        .order_by("createdAt", Direction::Desc)
        .limit(1);

    store
        .query(FEEDBACK, &query)
        .await?
        .into_iter()
        .next()
        .map(|doc| doc.into_typed())
        .transpose()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn interview(user_id: &str, created_at: &str, finalized: bool) -> Interview {
        Interview {
            id: String::new(),
            role: "Backend Engineer".to_string(),
            interview_type: "Mixed".to_string(),
            level: "Senior".to_string(),
            techstack: vec!["rust".to_string(), "postgres".to_string()],
            questions: vec!["Q1".to_string(), "Q2".to_string()],
            user_id: user_id.to_string(),
            finalized,
            cover_image: "/covers/spotify.png".to_string(),
            created_at: created_at.to_string(),
        }
    }

    pub fn feedback(interview_id: &str, user_id: &str, created_at: &str) -> Feedback {
        Feedback {
            id: String::new(),
            interview_id: interview_id.to_string(),
            user_id: user_id.to_string(),
            total_score: 64,
            category_scores: Vec::new(),
            strengths: vec!["Clear structure".to_string()],
            areas_for_improvement: vec!["System design depth".to_string()],
            final_assessment: "Promising.".to_string(),
            created_at: created_at.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{feedback, interview};
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_interviews_by_user_newest_first() {
        let store = MemoryStore::new();
        save_interview(&store, &interview("u1", "2025-01-01T00:00:00Z", true)).await.unwrap();
        let newer = save_interview(&store, &interview("u1", "2025-02-01T00:00:00Z", true)).await.unwrap();
        save_interview(&store, &interview("u2", "2025-03-01T00:00:00Z", true)).await.unwrap();

        let mine = interviews_by_user(&store, "u1").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, newer);
    }

    #[tokio::test]
    async fn test_latest_excludes_own_and_unfinalized() {
        let store = MemoryStore::new();
        save_interview(&store, &interview("u1", "2025-01-05T00:00:00Z", true)).await.unwrap();
        save_interview(&store, &interview("u2", "2025-01-04T00:00:00Z", false)).await.unwrap();
        for day in 1..=3 {
            let ts = format!("2025-01-0{}T00:00:00Z", day);
            save_interview(&store, &interview("u3", &ts, true)).await.unwrap();
        }

        let latest = latest_interviews(&store, "u1", 2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|i| i.user_id == "u3"));
        assert_eq!(latest[0].created_at, "2025-01-03T00:00:00Z");
    }

    #[tokio::test]
    async fn test_interview_by_id() {
        let store = MemoryStore::new();
        let id = save_interview(&store, &interview("u1", "2025-01-01T00:00:00Z", true)).await.unwrap();

        let found = interview_by_id(&store, &id).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.questions, vec!["Q1", "Q2"]);
        assert!(interview_by_id(&store, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_feedback_with_existing_id_overwrites() {
        let store = MemoryStore::new();
        let id = save_feedback(&store, None, &feedback("i1", "u1", "2025-01-01T00:00:00Z")).await.unwrap();

        let mut updated = feedback("i1", "u1", "2025-01-02T00:00:00Z");
        updated.total_score = 90;
        let same = save_feedback(&store, Some(&id), &updated).await.unwrap();
        assert_eq!(same, id);

        let found = feedback_by_interview(&store, "i1", "u1").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.total_score, 90);
        assert!(feedback_by_interview(&store, "i1", "u2").await.unwrap().is_none());
    }
}
