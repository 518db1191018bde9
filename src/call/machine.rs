//! Call state transitions.
//!
//! `reduce` is a pure function: given the current machine and one input it returns the
//! next machine and the effects the controller must run. Nothing here touches the
//! channel, the view or the clock, so every transition is unit-testable.

use super::{CallError, CallStatus, SessionMode, TranscriptMessage};
use crate::voice::ChannelEvent;

/// Call state owned by one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Machine {
    pub status: CallStatus,
    /// Mode of the current (or most recent) call
    pub mode: Option<SessionMode>,
    pub is_speaking: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Start(SessionMode),
    Stop,
    Channel(ChannelEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenChannel,
    StopChannel,
    AppendTranscript(TranscriptMessage),
    /// Run post-call work for the current mode. Emitted at most once per call.
    DispatchPostCall,
    LogChannelError(String),
    Render,
}

pub fn reduce(machine: &Machine, input: Input) -> Result<(Machine, Vec<Effect>), CallError> {
    let mut next = *machine;
    let mut effects = Vec::new();

    match input {
        Input::Start(mode) => {
            if machine.status.in_progress() {
                return Err(CallError::AlreadyInProgress);
            }
            next.status = CallStatus::Connecting;
            next.mode = Some(mode);
            next.is_speaking = false;
            effects.push(Effect::OpenChannel);
            effects.push(Effect::Render);
        }

        Input::Stop => {
            next.status = CallStatus::Finished;
            next.is_speaking = false;
            effects.push(Effect::StopChannel);
            if machine.status == CallStatus::Active {
                effects.push(Effect::DispatchPostCall);
            }
            if next != *machine {
                effects.push(Effect::Render);
            }
        }

        Input::Channel(ChannelEvent::CallStart) => {
            if machine.status == CallStatus::Connecting {
                next.status = CallStatus::Active;
                effects.push(Effect::Render);
            }
        }

        Input::Channel(ChannelEvent::CallEnd) => match machine.status {
            CallStatus::Active => {
                next.status = CallStatus::Finished;
                next.is_speaking = false;
                effects.push(Effect::DispatchPostCall);
                effects.push(Effect::Render);
            }
            CallStatus::Connecting => {
                next.status = CallStatus::Finished;
                next.is_speaking = false;
                effects.push(Effect::Render);
            }
            // Late or duplicate end: the call is already over
            CallStatus::Inactive | CallStatus::Finished => {}
        },

        Input::Channel(ChannelEvent::Message(message)) => {
            if machine.status.in_progress() {
                if let Some(transcript) = message.final_transcript() {
                    effects.push(Effect::AppendTranscript(transcript));
                    effects.push(Effect::Render);
                }
            }
        }

        Input::Channel(ChannelEvent::SpeechStart) => {
            if !machine.is_speaking {
                next.is_speaking = true;
                effects.push(Effect::Render);
            }
        }

        Input::Channel(ChannelEvent::SpeechEnd) => {
            if machine.is_speaking {
                next.is_speaking = false;
                effects.push(Effect::Render);
            }
        }

        Input::Channel(ChannelEvent::Error(message)) => {
            effects.push(Effect::LogChannelError(message));
        }
    }

    Ok((next, effects))
}
