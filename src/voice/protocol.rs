//! JSON messages exchanged over the call WebSocket.
//!
//! ## Message Format:
//! Every frame is a text frame holding one JSON object with a `type` tag.
//! - **Client → Server**: `start_call`, `stop_call`, `voice_event`, `pong`
//! - **Server → Client**: `voice_command`, `call_state`, `navigate`, `notice`, `error`, `ping`

use super::channel::{CallTarget, ChannelEvent, ChannelMessage, StartOptions};
use crate::call::{CallSnapshot, SessionMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartCall {
        mode: SessionMode,
        #[serde(default)]
        interview_id: Option<String>,
    },
    StopCall,
    /// One event raised by the browser's voice SDK
    VoiceEvent {
        event: String,
        #[serde(default)]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default)]
        timestamp: u64,
    },
}

impl ClientMessage {
    pub fn from_wire(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommandKind {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Instructs the browser SDK to start or stop the voice session
    VoiceCommand {
        command: VoiceCommandKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<CallTarget>,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<StartOptions>,
    },
    CallState(CallSnapshot),
    Navigate {
        path: String,
    },
    Notice {
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    Ping {
        timestamp: u64,
    },
}

impl ServerMessage {
    pub fn start(target: CallTarget, options: StartOptions) -> Self {
        ServerMessage::VoiceCommand {
            command: VoiceCommandKind::Start,
            target: Some(target),
            options: Some(options),
        }
    }

    pub fn stop() -> Self {
        ServerMessage::VoiceCommand {
            command: VoiceCommandKind::Stop,
            target: None,
            options: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unknown voice event '{0}'")]
    UnknownEvent(String),

    #[error("invalid payload for '{event}': {message}")]
    InvalidPayload { event: String, message: String },
}

/// Map an SDK event name and payload onto a [`ChannelEvent`].
pub fn channel_event(event: &str, payload: Option<Value>) -> Result<ChannelEvent, ProtocolError> {
    match event {
        "call-start" => Ok(ChannelEvent::CallStart),
        "call-end" => Ok(ChannelEvent::CallEnd),
        "speech-start" => Ok(ChannelEvent::SpeechStart),
        "speech-end" => Ok(ChannelEvent::SpeechEnd),
        "message" => {
            let payload = payload.ok_or_else(|| ProtocolError::InvalidPayload {
                event: event.to_string(),
                message: "missing payload".to_string(),
            })?;
            let message: ChannelMessage =
                serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
                    event: event.to_string(),
                    message: e.to_string(),
                })?;
            Ok(ChannelEvent::Message(message))
        }
        "error" => Ok(ChannelEvent::Error(error_text(payload))),
        other => Err(ProtocolError::UnknownEvent(other.to_string())),
    }
}

/// SDK errors arrive as strings, `{message}` / `{error}` objects, or anything else.
fn error_text(payload: Option<Value>) -> String {
    match payload {
        None | Some(Value::Null) => "unknown error".to_string(),
        Some(Value::String(s)) => s,
        Some(value) => ["message", "error"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| value.to_string()),
    }
}
