//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between nested keys)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special-case variables (`HOST`, `PORT`, `GOOGLE_GENERATIVE_AI_API_KEY`)
//! 2. Environment variables (APP_SERVER__PORT, APP_LLM__MODEL, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration, one struct per section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
    pub storage: StorageConfig,
    pub performance: PerformanceConfig,
    pub interviews: InterviewsConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Hosted language model settings (Gemini REST API).
///
/// An empty `api_key` means "not configured": generation requests fail with an
/// upstream error instead of the server refusing to start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Voice-agent targets handed to the browser SDK when a call starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Workflow that collects role/level/stack and calls the generate endpoint
    pub workflow_id: String,
    /// Assistant used to run a scripted interview
    pub interviewer: InterviewerPersona,
}

/// Interviewer assistant configuration.
///
/// `system_prompt` may reference `{{questions}}`; the voice service substitutes the
/// session variable of the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewerPersona {
    pub name: String,
    pub first_message: String,
    pub transcriber_provider: String,
    pub transcriber_model: String,
    pub language: String,
    pub voice_provider: String,
    pub voice_id: String,
    pub model_provider: String,
    pub model: String,
    pub system_prompt: String,
}

/// Document store settings.
///
/// An empty `snapshot_path` keeps everything in memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub snapshot_path: String,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_sessions`: Maximum number of call WebSockets handled at once
/// - `heartbeat_interval_secs`: How often the server pings call clients
/// - `client_timeout_secs`: Silence after which a call client is dropped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

/// Interview listing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewsConfig {
    /// Default page size for "latest interviews from other users"
    pub latest_limit: usize,
}

const DEFAULT_INTERVIEWER_PROMPT: &str = "You are a professional job interviewer running a real-time voice interview with a candidate. \
Assess their qualifications, motivation, and fit for the role.\n\n\
Follow this question list in order:\n{{questions}}\n\n\
Listen actively, acknowledge answers before moving on, and ask a short follow-up when an answer is vague. \
Keep every reply brief: this is spoken, not written, so avoid lists and special characters. \
Stay professional and warm. If the candidate asks about the role or company, answer briefly or point them to HR. \
When all questions are covered, thank the candidate and end the conversation politely.";

/// Built-in defaults; enough to start a local server with no config file.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            llm: LlmConfig {
                api_key: String::new(),
                model: "gemini-2.0-flash-001".to_string(),
                base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
                timeout_secs: 60,
            },
            voice: VoiceConfig {
                workflow_id: String::new(),
                interviewer: InterviewerPersona {
                    name: "Interviewer".to_string(),
                    first_message: "Hello! Thank you for taking the time to speak with me today. \
                        I'm looking forward to learning more about you and your experience."
                        .to_string(),
                    transcriber_provider: "deepgram".to_string(),
                    transcriber_model: "nova-2".to_string(),
                    language: "en".to_string(),
                    voice_provider: "11labs".to_string(),
                    voice_id: "sarah".to_string(),
                    model_provider: "openai".to_string(),
                    model: "gpt-4".to_string(),
                    system_prompt: DEFAULT_INTERVIEWER_PROMPT.to_string(),
                },
            },
            storage: StorageConfig {
                snapshot_path: String::new(),  // In-memory only
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 50,
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
            },
            interviews: InterviewsConfig { latest_limit: 20 },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_LLM__MODEL=gemini-2.5-flash`: Override the generation model
    /// - `APP_VOICE__WORKFLOW_ID=...`: Workflow used for question generation calls
    /// - `HOST` / `PORT`: Special case for deployment platforms
    /// - `GOOGLE_GENERATIVE_AI_API_KEY`: Conventional key variable for Gemini
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Built-in defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            // Example: APP_LLM__API_KEY becomes llm.api_key in the config
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Handle special environment variables used by deployment platforms
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("GOOGLE_GENERATIVE_AI_API_KEY") {
            settings = settings.set_override("llm.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.llm.model.trim().is_empty() {
            return Err(anyhow::anyhow!("LLM model name cannot be empty"));
        }

        if self.llm.timeout_secs == 0 {
            return Err(anyhow::anyhow!("LLM timeout must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.heartbeat_interval_secs == 0
            || self.performance.client_timeout_secs <= self.performance.heartbeat_interval_secs
        {
            return Err(anyhow::anyhow!(
                "Client timeout must be longer than a non-zero heartbeat interval"
            ));
        }

        if self.interviews.latest_limit == 0 {
            return Err(anyhow::anyhow!("Latest interview limit must be greater than 0"));
        }

        Ok(())
    }

    /// Whether a Gemini API key is present (never exposes the key itself).
    pub fn llm_configured(&self) -> bool {
        !self.llm.api_key.trim().is_empty()
    }

    /// Whether a question-generation workflow has been configured.
    pub fn workflow_configured(&self) -> bool {
        !self.voice.workflow_id.trim().is_empty()
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present in the JSON are changed. For example, you can send
    /// `{"llm": {"model": "gemini-2.5-flash"}}` to switch models without touching anything else.
    /// Server host/port are not updatable at runtime: the listener is already bound.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        // Fields absent from the JSON keep their current value
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(llm) = partial_config.get("llm") {
            if let Some(model) = llm.get("model").and_then(|v| v.as_str()) {
                self.llm.model = model.to_string();
            }
            if let Some(timeout) = llm.get("timeout_secs").and_then(|v| v.as_u64()) {
                self.llm.timeout_secs = timeout;
            }
        }

        if let Some(voice) = partial_config.get("voice") {
            if let Some(workflow) = voice.get("workflow_id").and_then(|v| v.as_str()) {
                self.voice.workflow_id = workflow.to_string();
            }
            if let Some(first_message) = voice
                .get("interviewer")
                .and_then(|i| i.get("first_message"))
                .and_then(|v| v.as_str())
            {
                self.voice.interviewer.first_message = first_message.to_string();
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        if let Some(limit) = partial_config
            .get("interviews")
            .and_then(|i| i.get("latest_limit"))
            .and_then(|v| v.as_u64())
        {
            self.interviews.latest_limit = limit as usize;
        }

        // Reject updates that leave the config invalid
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.interviews.latest_limit, 20);
        assert!(config.voice.interviewer.system_prompt.contains("{{questions}}"));
        assert!(!config.llm_configured());
        // Ensure the default config passes validation
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;  // Invalid port
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.performance.client_timeout_secs = config.performance.heartbeat_interval_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"llm": {"model": "gemini-2.5-flash"}, "interviews": {"latest_limit": 5}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.interviews.latest_limit, 5);
        // Other fields should remain unchanged
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_update_rejects_invalid_values() {
        let mut config = AppConfig::default();
        let json = r#"{"interviews": {"latest_limit": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
