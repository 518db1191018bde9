//! # Call WebSocket Bridge
//!
//! The voice SDK runs in the browser; this module connects it to a server-side
//! [`CallController`] over one WebSocket per call page.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Client connects to `/ws/call` (authenticated user required)
//! 2. **Start**: Client sends `start_call`; the server answers with `voice_command: start`
//!    carrying the target and options the SDK must start with
//! 3. **Events**: Client forwards every SDK event as `voice_event`
//! 4. **State**: Server pushes `call_state` after every change and `navigate` when done
//! 5. **Stop**: Client sends `stop_call`; the server answers with `voice_command: stop`
//!
//! ## Concurrency:
//! The socket actor only parses frames. Commands and SDK events go to a session task
//! over one mpsc channel, so they reach it in socket order. The session task owns the
//! controller, re-emits SDK events into the [`EventHub`] and drains the hub before
//! taking the next command.

use super::channel::{CallTarget, ChannelError, ChannelEvent, StartOptions, VoiceChannel};
use super::hub::{EventHub, Subscription};
use super::persona::VoiceTargets;
use super::protocol::{channel_event, ClientMessage, ServerMessage};
use crate::auth::CurrentUser;
use crate::call::{CallController, CallError, CallSnapshot, CallView, SessionMode, SessionParameters};
use crate::routes::Route;
use crate::state::AppState;
use crate::store::repository;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A frame to send to the browser.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Outbound(pub ServerMessage);

#[derive(Debug)]
enum SessionCommand {
    Start {
        mode: SessionMode,
        interview_id: Option<String>,
    },
    Stop,
    /// An SDK event forwarded by the browser
    Event(ChannelEvent),
}

/// [`VoiceChannel`] whose SDK lives at the other end of the call WebSocket.
pub struct BridgeChannel {
    outbound: Recipient<Outbound>,
    hub: Arc<EventHub>,
}

impl BridgeChannel {
    pub fn new(outbound: Recipient<Outbound>, hub: Arc<EventHub>) -> Self {
        Self { outbound, hub }
    }

    fn send(&self, message: ServerMessage) -> Result<(), ChannelError> {
        self.outbound.try_send(Outbound(message)).map_err(|e| match e {
            SendError::Full(_) => ChannelError::Rejected("socket mailbox is full".to_string()),
            SendError::Closed(_) => ChannelError::Closed,
        })
    }
}

#[async_trait]
impl VoiceChannel for BridgeChannel {
    async fn start(&self, target: &CallTarget, options: StartOptions) -> Result<(), ChannelError> {
        self.send(ServerMessage::start(target.clone(), options))
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        self.send(ServerMessage::stop())
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

/// [`CallView`] that renders into the call WebSocket.
pub struct SocketView {
    outbound: Recipient<Outbound>,
}

impl SocketView {
    pub fn new(outbound: Recipient<Outbound>) -> Self {
        Self { outbound }
    }

    fn send(&self, message: ServerMessage) {
        self.outbound.do_send(Outbound(message));
    }
}

impl CallView for SocketView {
    fn navigate(&self, route: Route) {
        self.send(ServerMessage::Navigate { path: route.path() });
    }

    fn notify(&self, message: &str) {
        self.send(ServerMessage::Notice {
            message: message.to_string(),
        });
    }

    fn render(&self, snapshot: &CallSnapshot) {
        self.send(ServerMessage::CallState(snapshot.clone()));
    }
}

/// Resolve the parameters for a call the user asked to start.
async fn session_parameters(
    state: &AppState,
    user: &CurrentUser,
    mode: SessionMode,
    interview_id: Option<String>,
) -> Result<SessionParameters, ServerMessage> {
    let mut params = SessionParameters {
        user_id: user.id.clone(),
        user_name: user.name.clone(),
        ..Default::default()
    };

    if mode == SessionMode::Generate {
        return Ok(params);
    }

    let interview_id = interview_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ServerMessage::error("invalid_parameters", "interview_id is required"))?;

    let store = state.store.as_ref();
    let interview = repository::interview_by_id(store, &interview_id)
        .await
        .map_err(|e| {
            error!(%interview_id, error = %e, "Failed to load interview");
            ServerMessage::error("storage_error", "Could not load the interview")
        })?
        .ok_or_else(|| ServerMessage::error("interview_not_found", format!("Interview {} not found", interview_id)))?;

    // Retaking an interview overwrites the previous feedback
    let existing = repository::feedback_by_interview(store, &interview_id, &user.id)
        .await
        .map_err(|e| {
            error!(%interview_id, error = %e, "Failed to look up existing feedback");
            ServerMessage::error("storage_error", "Could not load previous feedback")
        })?;

    params.interview_id = Some(interview_id);
    params.questions = interview.questions;
    params.feedback_id = existing.map(|feedback| feedback.id);
    Ok(params)
}

enum SessionInput {
    Command(SessionCommand),
    Event(ChannelEvent),
}

/// Owns the controller for one socket. Ends when the socket drops its command sender.
///
/// Hub events are polled first: an event emitted for a `SessionCommand::Event` is
/// handled before any command queued behind it.
async fn run_session(
    mut controller: CallController,
    hub: Arc<EventHub>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: AppState,
    user: CurrentUser,
    outbound: Recipient<Outbound>,
) {
    loop {
        let input = tokio::select! {
            biased;
            Some(event) = controller.next_event() => SessionInput::Event(event),
            command = commands.recv() => match command {
                Some(command) => SessionInput::Command(command),
                None => break,
            },
        };

        match input {
            SessionInput::Command(SessionCommand::Start { mode, interview_id }) => {
                let params = match session_parameters(&state, &user, mode, interview_id).await {
                    Ok(params) => params,
                    Err(message) => {
                        outbound.do_send(Outbound(message));
                        continue;
                    }
                };

                if let Err(e) = controller.start(mode, params).await {
                    let code = match e {
                        CallError::AlreadyInProgress => "call_in_progress",
                        CallError::InvalidParameters(_) => "invalid_parameters",
                    };
                    warn!(user_id = %user.id, error = %e, "Call start rejected");
                    outbound.do_send(Outbound(ServerMessage::error(code, e.to_string())));
                }
            }
            SessionInput::Command(SessionCommand::Stop) => controller.stop().await,
            SessionInput::Command(SessionCommand::Event(event)) => hub.emit(event),
            SessionInput::Event(event) => controller.handle_event(event).await,
        }
    }

    controller.close();
    debug!(user_id = %user.id, status = %controller.status(), "Call session ended");
}

/// WebSocket actor for one call page.
pub struct CallSocket {
    state: AppState,
    user: CurrentUser,
    commands: Option<mpsc::UnboundedSender<SessionCommand>>,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl CallSocket {
    pub fn new(state: AppState, user: CurrentUser) -> Self {
        let performance = state.get_config().performance;
        Self {
            state,
            user,
            commands: None,
            last_heartbeat: Instant::now(),
            heartbeat_interval: Duration::from_secs(performance.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(performance.client_timeout_secs),
        }
    }

    fn command(&self, command: SessionCommand, ctx: &mut ws::WebsocketContext<Self>) {
        let sent = self.commands.as_ref().map_or(false, |tx| tx.send(command).is_ok());
        if !sent {
            self.send_error(ctx, "session_closed", "Call session is no longer running");
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(e) => error!(error = %e, "Failed to serialize server message"),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        warn!(user_id = %self.user.id, code, message, "Call socket error");
        self.send(ctx, &ServerMessage::error(code, message));
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let message = match ClientMessage::from_wire(text) {
            Ok(message) => message,
            Err(e) => {
                self.send_error(ctx, "invalid_message", &e.to_string());
                return;
            }
        };

        match message {
            ClientMessage::StartCall { mode, interview_id } => {
                self.command(SessionCommand::Start { mode, interview_id }, ctx);
            }
            ClientMessage::StopCall => self.command(SessionCommand::Stop, ctx),
            ClientMessage::VoiceEvent { event, payload } => match channel_event(&event, payload) {
                Ok(event) => self.command(SessionCommand::Event(event), ctx),
                Err(e) => self.send_error(ctx, "invalid_event", &e.to_string()),
            },
            ClientMessage::Pong { .. } => {}
        }
    }
}

impl Actor for CallSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(user_id = %self.user.id, "Call socket connected");

        let outbound = ctx.address().recipient::<Outbound>();
        let hub = EventHub::new();
        let channel = Arc::new(BridgeChannel::new(outbound.clone(), Arc::clone(&hub)));
        let view = Arc::new(SocketView::new(outbound.clone()));
        let feedback = Arc::new(self.state.feedback_generator());
        let targets = VoiceTargets::from_config(&self.state.get_config().voice);
        let controller = CallController::new(channel, feedback, view, targets);

        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(tx);
        tokio::spawn(run_session(
            controller,
            hub,
            rx,
            self.state.clone(),
            self.user.clone(),
            outbound,
        ));

        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(user_id = %act.user.id, "Call socket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            let ping = ServerMessage::Ping {
                timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
            };
            act.send(ctx, &ping);
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Dropping the sender ends the session task, which releases the subscription
        self.commands = None;
        self.state.release_call_slot();
        info!(user_id = %self.user.id, "Call socket disconnected");
    }
}

impl Handler<Outbound> for CallSocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        self.send(ctx, &msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for CallSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                self.send_error(ctx, "unsupported_frame", "Binary frames are not supported");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(user_id = %self.user.id, ?reason, "Call socket closed by client");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!(error = %e, "Call socket protocol error");
                ctx.stop();
            }
        }
    }
}

/// `GET /ws/call`: upgrade to a call WebSocket.
pub async fn call_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    user: CurrentUser,
) -> Result<HttpResponse, actix_web::Error> {
    let max_sessions = state.get_config().performance.max_concurrent_sessions;
    if !state.try_acquire_call_slot(max_sessions) {
        warn!(user_id = %user.id, max_sessions, "Rejecting call socket: too many active calls");
        return Ok(HttpResponse::ServiceUnavailable().json(json!({
            "error": {
                "type": "too_many_calls",
                "message": "Too many active calls, try again shortly",
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        })));
    }

    debug!(user_id = %user.id, peer = ?req.connection_info().peer_addr(), "Call socket upgrade");
    let socket = CallSocket::new(state.get_ref().clone(), user);
    ws::start(socket, &req, stream).map_err(|e| {
        state.release_call_slot();
        e
    })
}
