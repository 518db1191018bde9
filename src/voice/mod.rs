//! # Voice Channel
//!
//! Everything between the call controller and the hosted voice-agent SDK.
//!
//! ## Components:
//! - **channel**: the `VoiceChannel` trait plus SDK events, targets and start options
//! - **hub**: event fan-out with RAII subscriptions
//! - **persona**: call targets (workflow / interviewer assistant) built from config
//! - **protocol**: JSON frames of the call WebSocket
//! - **bridge**: the WebSocket actor and the channel/view implementations behind it

pub mod bridge;
pub mod channel;
pub mod hub;
pub mod persona;
pub mod protocol;

pub use channel::{CallTarget, ChannelError, ChannelEvent, ChannelMessage, StartOptions, VoiceChannel};
pub use hub::{EventHub, Subscription};
pub use persona::VoiceTargets;
