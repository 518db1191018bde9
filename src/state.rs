//! # Application State Management
//!
//! State shared by every HTTP handler and call WebSocket.
//!
//! ## What lives here:
//! - **config**: runtime-updatable configuration (`Arc<RwLock<AppConfig>>`)
//! - **metrics**: request counters, per-route timings, active call count
//! - **store**: the document store behind every interview/feedback read and write
//! - **llm**: the language model used by both generators; rebuilt when the `llm`
//!   config section changes at runtime
//!
//! ## Locking:
//! Config and metrics use `std::sync::RwLock` because no lock is ever held across an
//! `.await`. A poisoned lock still holds valid data (every write is a plain field
//! assignment), so we recover the guard instead of panicking.

use crate::config::AppConfig;
use crate::generation::{FeedbackGenerator, GeminiClient, LanguageModel, QuestionGenerator};
use crate::store::{DocumentStore, MemoryStore};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    /// When the server started (never changes)
    pub start_time: Instant,
    pub store: Arc<dyn DocumentStore>,
    llm: Arc<RwLock<Arc<dyn LanguageModel>>>,
}

/// Counters collected across all HTTP requests and call sessions.
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Call WebSockets currently open
    pub active_calls: u32,
    /// Key: "METHOD /route/{pattern}"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    /// Build production state: open the store (loading the snapshot, if configured)
    /// and create the Gemini client.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn DocumentStore> = if config.storage.snapshot_path.trim().is_empty() {
            info!("Using in-memory document store");
            Arc::new(MemoryStore::new())
        } else {
            let path = config.storage.snapshot_path.trim().to_string();
            let store = MemoryStore::open(&path)
                .await
                .with_context(|| format!("Failed to open document snapshot {}", path))?;
            info!(path = %path, "Document store loaded from snapshot");
            Arc::new(store)
        };

        let llm: Arc<dyn LanguageModel> =
            Arc::new(GeminiClient::new(&config.llm).context("Failed to create Gemini client")?);

        Ok(Self::new(config, store, llm))
    }

    pub fn new(config: AppConfig, store: Arc<dyn DocumentStore>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            store,
            llm: Arc::new(RwLock::new(llm)),
        }
    }

    /// Copy of the current configuration (the lock is released immediately).
    pub fn get_config(&self) -> AppConfig {
        read(&self.config).clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;

        let llm_changed = read(&self.config).llm != new_config.llm;
        if llm_changed {
            let client = GeminiClient::new(&new_config.llm).map_err(|e| e.to_string())?;
            *write(&self.llm) = Arc::new(client);
            info!(model = %new_config.llm.model, "Language model client rebuilt");
        }

        *write(&self.config) = new_config;
        Ok(())
    }

    pub fn language_model(&self) -> Arc<dyn LanguageModel> {
        Arc::clone(&read(&self.llm))
    }

    pub fn question_generator(&self) -> QuestionGenerator {
        QuestionGenerator::new(self.language_model(), Arc::clone(&self.store))
    }

    pub fn feedback_generator(&self) -> FeedbackGenerator {
        FeedbackGenerator::new(self.language_model(), Arc::clone(&self.store))
    }

    pub fn increment_request_count(&self) {
        write(&self.metrics).request_count += 1;
    }

    pub fn increment_error_count(&self) {
        write(&self.metrics).error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = write(&self.metrics);
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Reserve a call slot. Returns false when `max` calls are already open.
    pub fn try_acquire_call_slot(&self, max: usize) -> bool {
        let mut metrics = write(&self.metrics);
        if metrics.active_calls as usize >= max {
            return false;
        }
        metrics.active_calls += 1;
        true
    }

    pub fn release_call_slot(&self) {
        let mut metrics = write(&self.metrics);
        metrics.active_calls = metrics.active_calls.saturating_sub(1);
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = read(&self.metrics);
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_calls: metrics.active_calls,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::generation::questions::tests::CannedModel;

    /// State over an in-memory store and a canned model.
    pub fn test_state(llm: CannedModel) -> AppState {
        AppState::new(AppConfig::default(), Arc::new(MemoryStore::new()), Arc::new(llm))
    }

    #[test]
    fn test_call_slots_are_bounded() {
        let state = test_state(CannedModel::failing());
        assert!(state.try_acquire_call_slot(2));
        assert!(state.try_acquire_call_slot(2));
        assert!(!state.try_acquire_call_slot(2));

        state.release_call_slot();
        state.release_call_slot();
        state.release_call_slot();
        assert_eq!(state.get_metrics_snapshot().active_calls, 0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = test_state(CannedModel::failing());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_update_config_validates() {
        let state = test_state(CannedModel::failing());
        let mut config = state.get_config();
        config.interviews.latest_limit = 0;
        assert!(state.update_config(config).is_err());
        assert_eq!(state.get_config().interviews.latest_limit, 20);
    }

    #[tokio::test]
    async fn test_llm_swapped_only_when_llm_section_changes() {
        let state = test_state(CannedModel::text("[\"Q\"]"));
        let before = state.language_model();

        let mut config = state.get_config();
        config.interviews.latest_limit = 7;
        state.update_config(config).unwrap();
        assert!(Arc::ptr_eq(&before, &state.language_model()));

        let mut config = state.get_config();
        config.llm.model = "gemini-2.5-flash".to_string();
        state.update_config(config).unwrap();
        assert!(!Arc::ptr_eq(&before, &state.language_model()));
    }
}
