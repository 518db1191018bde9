//! The voice channel seam and the event vocabulary of the hosted voice SDK.

use super::hub::Subscription;
use crate::call::{Role, TranscriptMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Events the voice SDK raises during a call.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// `call-start`
    CallStart,
    /// `call-end`
    CallEnd,
    /// `message`
    Message(ChannelMessage),
    /// `speech-start`
    SpeechStart,
    /// `speech-end`
    SpeechEnd,
    /// `error`
    Error(String),
}

impl ChannelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::CallStart => "call-start",
            ChannelEvent::CallEnd => "call-end",
            ChannelEvent::Message(_) => "message",
            ChannelEvent::SpeechStart => "speech-start",
            ChannelEvent::SpeechEnd => "speech-end",
            ChannelEvent::Error(_) => "error",
        }
    }
}

/// Payload of a `message` event. Only transcripts matter to us; other message
/// types (function calls, status updates...) pass through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(rename = "transcriptType", default, skip_serializing_if = "Option::is_none")]
    pub transcript_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl ChannelMessage {
    pub fn transcript(role: &str, transcript_type: &str, text: &str) -> Self {
        Self {
            message_type: "transcript".to_string(),
            transcript_type: Some(transcript_type.to_string()),
            role: Some(role.to_string()),
            transcript: Some(text.to_string()),
        }
    }

    /// The transcript message carried by a final transcript, if this is one.
    pub fn final_transcript(&self) -> Option<TranscriptMessage> {
        if self.message_type != "transcript" || self.transcript_type.as_deref() != Some("final") {
            return None;
        }
        let role = Role::parse(self.role.as_deref()?)?;
        let content = self.transcript.as_deref()?;
        Some(TranscriptMessage::new(role, content))
    }
}

/// What to start a call against.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallTarget {
    /// A pre-built workflow, referenced by id
    Workflow(String),
    /// An inline assistant definition
    Assistant(Value),
}

/// Options passed alongside the target when starting a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    pub client_messages: Vec<String>,
    pub server_messages: Vec<String>,
    pub variable_values: Value,
}

impl StartOptions {
    /// Workflow variables for interview generation.
    pub fn for_generate(user_name: &str, user_id: &str) -> Self {
        Self::with_variables(json!({
            "username": user_name,
            "userId": user_id,
        }))
    }

    /// Interviewer variables: the questions as a bulleted list.
    pub fn for_conduct(questions: &[String]) -> Self {
        let formatted = questions
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n");
        Self::with_variables(json!({
            "questions": formatted,
            "returnTranscript": true,
        }))
    }

    fn with_variables(variable_values: Value) -> Self {
        Self {
            client_messages: Vec::new(),
            server_messages: Vec::new(),
            variable_values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("voice channel is closed")]
    Closed,

    #[error("voice channel rejected the request: {0}")]
    Rejected(String),
}

/// A voice-agent session the controller can start, stop and listen to.
///
/// Implementations deliver events to every live [`Subscription`] in the order
/// the SDK raised them.
#[async_trait]
pub trait VoiceChannel: Send + Sync {
    async fn start(&self, target: &CallTarget, options: StartOptions) -> Result<(), ChannelError>;

    async fn stop(&self) -> Result<(), ChannelError>;

    fn subscribe(&self) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_transcript_only() {
        let final_msg = ChannelMessage::transcript("user", "final", "I like Rust");
        assert_eq!(
            final_msg.final_transcript(),
            Some(TranscriptMessage::new(Role::User, "I like Rust"))
        );

        let partial = ChannelMessage::transcript("user", "partial", "I li");
        assert_eq!(partial.final_transcript(), None);

        let other = ChannelMessage {
            message_type: "status-update".to_string(),
            ..Default::default()
        };
        assert_eq!(other.final_transcript(), None);
    }

    #[test]
    fn test_message_reads_sdk_shape() {
        let msg: ChannelMessage = serde_json::from_value(json!({
            "type": "transcript",
            "transcriptType": "final",
            "role": "assistant",
            "transcript": "Hello!"
        }))
        .unwrap();
        assert_eq!(msg.final_transcript().unwrap().role, Role::Assistant);
    }

    #[test]
    fn test_conduct_variables() {
        let options = StartOptions::for_conduct(&["Q1".to_string(), "Q2".to_string()]);
        assert_eq!(options.variable_values["questions"], "- Q1\n- Q2");
        assert_eq!(options.variable_values["returnTranscript"], true);

        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["clientMessages"], json!([]));
        assert_eq!(value["serverMessages"], json!([]));
    }

    #[test]
    fn test_generate_variables_and_target_shape() {
        let options = StartOptions::for_generate("Ada", "u1");
        assert_eq!(options.variable_values, json!({"username": "Ada", "userId": "u1"}));

        let target = serde_json::to_value(CallTarget::Workflow("wf-1".to_string())).unwrap();
        assert_eq!(target, json!({"workflow": "wf-1"}));
    }
}
