//! # Call Controller
//!
//! Owns one call's state and runs the effects `machine::reduce` asks for.
//!
//! ## Collaborators (all injected):
//! - **VoiceChannel**: starts/stops the voice session and delivers its events
//! - **FeedbackService**: scores a conducted interview once it ends
//! - **CallView**: where renders, notices and navigation go (the call WebSocket in production)
//!
//! ## Event Delivery:
//! The controller subscribes to the channel on its first `start()`. The owner pulls
//! events with `next_event()` and feeds them back through `handle_event()`, one at a
//! time, so transitions are applied in delivery order without any locking.

use super::machine::{reduce, Effect, Input, Machine};
use super::{CallError, CallSnapshot, CallStatus, SessionMode, SessionParameters, TranscriptMessage};
use crate::generation::{FeedbackOutcome, FeedbackRequest, FeedbackService};
use crate::routes::Route;
use crate::voice::{ChannelEvent, StartOptions, Subscription, VoiceChannel, VoiceTargets};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Presentation sink for a call.
pub trait CallView: Send + Sync {
    fn navigate(&self, route: Route);

    /// Short user-facing message (e.g. feedback could not be saved).
    fn notify(&self, message: &str);

    fn render(&self, snapshot: &CallSnapshot);
}

const FEEDBACK_FAILED_NOTICE: &str = "We couldn't save your feedback. Please try again later.";

pub struct CallController {
    channel: Arc<dyn VoiceChannel>,
    feedback: Arc<dyn FeedbackService>,
    view: Arc<dyn CallView>,
    targets: VoiceTargets,
    machine: Machine,
    params: Option<SessionParameters>,
    transcript: Vec<TranscriptMessage>,
    subscription: Option<Subscription>,
    dispatch: Option<JoinHandle<()>>,
}

impl CallController {
    pub fn new(
        channel: Arc<dyn VoiceChannel>,
        feedback: Arc<dyn FeedbackService>,
        view: Arc<dyn CallView>,
        targets: VoiceTargets,
    ) -> Self {
        Self {
            channel,
            feedback,
            view,
            targets,
            machine: Machine::default(),
            params: None,
            transcript: Vec::new(),
            subscription: None,
            dispatch: None,
        }
    }

    /// Begin a call. Rejected while another call is connecting or active.
    pub async fn start(&mut self, mode: SessionMode, params: SessionParameters) -> Result<(), CallError> {
        params.validate(mode)?;
        let (next, effects) = reduce(&self.machine, Input::Start(mode))?;

        // Listen before opening so `call-start` can't be missed
        if self.subscription.is_none() {
            self.subscription = Some(self.channel.subscribe());
        }

        info!(mode = ?mode, user_id = %params.user_id, interview_id = ?params.interview_id, "Starting call");
        self.params = Some(params);
        self.apply(next, effects).await;
        Ok(())
    }

    /// End the call from the user side. Safe to call in any status.
    pub async fn stop(&mut self) {
        match reduce(&self.machine, Input::Stop) {
            Ok((next, effects)) => self.apply(next, effects).await,
            Err(e) => warn!(error = %e, "Stop rejected"),
        }
    }

    /// Wait for the next channel event. Never resolves while not subscribed.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };

        let event = subscription.recv().await;
        if event.is_none() {
            debug!("Voice channel event stream ended");
            self.subscription = None;
        }
        event
    }

    pub async fn handle_event(&mut self, event: ChannelEvent) {
        debug!(event = event.name(), status = %self.machine.status, "Voice channel event");
        match reduce(&self.machine, Input::Channel(event)) {
            Ok((next, effects)) => self.apply(next, effects).await,
            Err(e) => warn!(error = %e, "Channel event rejected"),
        }
    }

    /// Wait for pending post-call work (feedback generation) to finish.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.dispatch.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Post-call task failed");
            }
        }
    }

    /// Release the channel subscription. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
    }

    pub fn status(&self) -> CallStatus {
        self.machine.status
    }

    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    pub fn last_message(&self) -> Option<&TranscriptMessage> {
        self.transcript.last()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            status: self.machine.status,
            is_speaking: self.machine.is_speaking,
            last_message: self.last_message().map(|m| m.content.clone()),
            message_count: self.transcript.len(),
        }
    }

    async fn apply(&mut self, next: Machine, effects: Vec<Effect>) {
        if next.status != self.machine.status {
            debug!(from = %self.machine.status, to = %next.status, "Call status changed");
        }
        self.machine = next;

        for effect in effects {
            match effect {
                Effect::OpenChannel => self.open_channel().await,
                Effect::StopChannel => {
                    if let Err(e) = self.channel.stop().await {
                        warn!(error = %e, "Failed to stop voice channel");
                    }
                }
                Effect::AppendTranscript(message) => self.transcript.push(message),
                Effect::DispatchPostCall => self.dispatch_post_call(),
                Effect::LogChannelError(message) => error!(error = %message, "Voice channel error"),
                Effect::Render => self.view.render(&self.snapshot()),
            }
        }
    }

    async fn open_channel(&mut self) {
        let (Some(mode), Some(params)) = (self.machine.mode, self.params.as_ref()) else {
            return;
        };

        let options = match mode {
            SessionMode::Generate => StartOptions::for_generate(&params.user_name, &params.user_id),
            SessionMode::Conduct => StartOptions::for_conduct(&params.questions),
        };

        // A failed start is reported like any other channel error; the call stays
        // CONNECTING until the channel or the user ends it
        if let Err(e) = self.channel.start(self.targets.for_mode(mode), options).await {
            error!(error = %e, mode = ?mode, "Voice channel error");
        }
    }

    fn dispatch_post_call(&mut self) {
        match self.machine.mode {
            Some(SessionMode::Generate) => self.view.navigate(Route::Home),
            Some(SessionMode::Conduct) => {
                let Some(params) = self.params.as_ref() else {
                    self.view.navigate(Route::Home);
                    return;
                };
                let interview_id = params.interview_id.clone().unwrap_or_default();
                let request = FeedbackRequest {
                    interview_id: interview_id.clone(),
                    user_id: params.user_id.clone(),
                    transcript: self.transcript.clone(),
                    feedback_id: params.feedback_id.clone(),
                };

                let feedback = Arc::clone(&self.feedback);
                let view = Arc::clone(&self.view);
                self.dispatch = Some(tokio::spawn(async move {
                    match feedback.create_feedback(request).await {
                        FeedbackOutcome {
                            success: true,
                            feedback_id: Some(feedback_id),
                        } => {
                            info!(%interview_id, %feedback_id, "Feedback ready");
                            view.navigate(Route::Feedback { interview_id });
                        }
                        _ => {
                            warn!(%interview_id, "Error saving feedback");
                            view.notify(FEEDBACK_FAILED_NOTICE);
                            view.navigate(Route::Home);
                        }
                    }
                }));
            }
            None => {}
        }
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::call::Role;
    use crate::config::AppConfig;
    use crate::voice::{CallTarget, ChannelError, ChannelMessage, EventHub};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct FakeChannel {
        pub hub: Arc<EventHub>,
        pub starts: Mutex<Vec<(CallTarget, StartOptions)>>,
        pub stops: AtomicUsize,
        pub fail_start: bool,
    }

    impl FakeChannel {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                hub: EventHub::new(),
                starts: Mutex::new(Vec::new()),
                stops: AtomicUsize::new(0),
                fail_start: false,
            })
        }
    }

    #[async_trait]
    impl VoiceChannel for FakeChannel {
        async fn start(&self, target: &CallTarget, options: StartOptions) -> Result<(), ChannelError> {
            self.starts.lock().unwrap().push((target.clone(), options));
            if self.fail_start {
                return Err(ChannelError::Rejected("no microphone".to_string()));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<(), ChannelError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn subscribe(&self) -> Subscription {
            self.hub.subscribe()
        }
    }

    pub struct FakeFeedback {
        pub outcome: FeedbackOutcome,
        pub requests: Mutex<Vec<FeedbackRequest>>,
    }

    impl FakeFeedback {
        pub fn returning(outcome: FeedbackOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl FeedbackService for FakeFeedback {
        async fn create_feedback(&self, request: FeedbackRequest) -> FeedbackOutcome {
            self.requests.lock().unwrap().push(request);
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    pub struct RecordingView {
        pub routes: Mutex<Vec<Route>>,
        pub notices: Mutex<Vec<String>>,
        pub renders: Mutex<Vec<CallSnapshot>>,
    }

    impl CallView for RecordingView {
        fn navigate(&self, route: Route) {
            self.routes.lock().unwrap().push(route);
        }

        fn notify(&self, message: &str) {
            self.notices.lock().unwrap().push(message.to_string());
        }

        fn render(&self, snapshot: &CallSnapshot) {
            self.renders.lock().unwrap().push(snapshot.clone());
        }
    }

    struct Harness {
        channel: Arc<FakeChannel>,
        feedback: Arc<FakeFeedback>,
        view: Arc<RecordingView>,
        controller: CallController,
    }

    fn harness(outcome: FeedbackOutcome) -> Harness {
        harness_with(FakeChannel::new(), outcome)
    }

    fn harness_with(channel: Arc<FakeChannel>, outcome: FeedbackOutcome) -> Harness {
        let feedback = FakeFeedback::returning(outcome);
        let view = Arc::new(RecordingView::default());
        let targets = VoiceTargets::from_config(&AppConfig::default().voice);
        let controller = CallController::new(channel.clone(), feedback.clone(), view.clone(), targets);
        Harness {
            channel,
            feedback,
            view,
            controller,
        }
    }

    fn conduct_params() -> SessionParameters {
        SessionParameters {
            user_id: "u1".to_string(),
            user_name: "Ada".to_string(),
            interview_id: Some("i1".to_string()),
            feedback_id: Some("fb-old".to_string()),
            questions: vec!["Q1".to_string(), "Q2".to_string()],
        }
    }

    fn generate_params() -> SessionParameters {
        SessionParameters {
            user_id: "u1".to_string(),
            user_name: "Ada".to_string(),
            ..Default::default()
        }
    }

    fn transcript(role: &str, kind: &str, text: &str) -> ChannelEvent {
        ChannelEvent::Message(ChannelMessage::transcript(role, kind, text))
    }

    /// Deliver every event already queued on the subscription.
    async fn pump(controller: &mut CallController, count: usize) {
        for _ in 0..count {
            let event = controller.next_event().await.unwrap();
            controller.handle_event(event).await;
        }
    }

    #[tokio::test]
    async fn test_conduct_call_sends_transcript_to_feedback() {
        let mut h = harness(FeedbackOutcome::stored("fb123".to_string()));
        h.controller.start(SessionMode::Conduct, conduct_params()).await.unwrap();
        assert_eq!(h.controller.status(), CallStatus::Connecting);

        let hub = &h.channel.hub;
        hub.emit(ChannelEvent::CallStart);
        hub.emit(transcript("assistant", "final", "Hello"));
        hub.emit(transcript("user", "partial", "H"));
        hub.emit(transcript("user", "final", "Hi"));
        hub.emit(ChannelEvent::CallEnd);
        pump(&mut h.controller, 5).await;
        h.controller.settle().await;

        assert_eq!(h.controller.status(), CallStatus::Finished);
        let requests = h.feedback.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].interview_id, "i1");
        assert_eq!(requests[0].user_id, "u1");
        assert_eq!(requests[0].feedback_id.as_deref(), Some("fb-old"));
        assert_eq!(
            requests[0].transcript,
            vec![
                TranscriptMessage::new(Role::Assistant, "Hello"),
                TranscriptMessage::new(Role::User, "Hi"),
            ]
        );
        assert_eq!(
            *h.view.routes.lock().unwrap(),
            vec![Route::Feedback {
                interview_id: "i1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_conduct_start_passes_questions_to_channel() {
        let mut h = harness(FeedbackOutcome::failed());
        h.controller.start(SessionMode::Conduct, conduct_params()).await.unwrap();

        let starts = h.channel.starts.lock().unwrap();
        assert_eq!(starts.len(), 1);
        assert!(matches!(starts[0].0, CallTarget::Assistant(_)));
        assert_eq!(starts[0].1.variable_values["questions"], "- Q1\n- Q2");
    }

    #[tokio::test]
    async fn test_generate_call_navigates_home_without_feedback() {
        let mut h = harness(FeedbackOutcome::stored("fb123".to_string()));
        h.controller.start(SessionMode::Generate, generate_params()).await.unwrap();

        h.channel.hub.emit(ChannelEvent::CallStart);
        h.channel.hub.emit(transcript("user", "final", "Frontend, junior, React"));
        h.channel.hub.emit(ChannelEvent::CallEnd);
        pump(&mut h.controller, 3).await;
        h.controller.settle().await;

        assert!(h.feedback.requests.lock().unwrap().is_empty());
        assert_eq!(*h.view.routes.lock().unwrap(), vec![Route::Home]);

        let starts = h.channel.starts.lock().unwrap();
        assert!(matches!(starts[0].0, CallTarget::Workflow(_)));
        assert_eq!(starts[0].1.variable_values["userId"], "u1");
    }

    #[tokio::test]
    async fn test_failed_feedback_goes_home_with_notice() {
        for outcome in [
            FeedbackOutcome::failed(),
            FeedbackOutcome {
                success: true,
                feedback_id: None,
            },
        ] {
            let mut h = harness(outcome);
            h.controller.start(SessionMode::Conduct, conduct_params()).await.unwrap();
            h.channel.hub.emit(ChannelEvent::CallStart);
            h.channel.hub.emit(ChannelEvent::CallEnd);
            pump(&mut h.controller, 2).await;
            h.controller.settle().await;

            assert_eq!(*h.view.routes.lock().unwrap(), vec![Route::Home]);
            assert_eq!(h.view.notices.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_stop_while_active_dispatches_once() {
        let mut h = harness(FeedbackOutcome::stored("fb1".to_string()));
        h.controller.start(SessionMode::Conduct, conduct_params()).await.unwrap();
        h.channel.hub.emit(ChannelEvent::CallStart);
        pump(&mut h.controller, 1).await;

        h.controller.stop().await;
        // The SDK still reports the end after a user stop
        h.channel.hub.emit(ChannelEvent::CallEnd);
        pump(&mut h.controller, 1).await;
        h.controller.stop().await;
        h.controller.settle().await;

        assert_eq!(h.controller.status(), CallStatus::Finished);
        assert_eq!(h.feedback.requests.lock().unwrap().len(), 1);
        assert_eq!(h.channel.stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_transition_out_of_finished_without_start() {
        let mut h = harness(FeedbackOutcome::failed());
        h.controller.start(SessionMode::Generate, generate_params()).await.unwrap();
        h.controller.stop().await;

        h.channel.hub.emit(ChannelEvent::CallStart);
        h.channel.hub.emit(transcript("user", "final", "late"));
        pump(&mut h.controller, 2).await;

        assert_eq!(h.controller.status(), CallStatus::Finished);
        assert!(h.controller.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let mut h = harness(FeedbackOutcome::failed());
        h.controller.start(SessionMode::Generate, generate_params()).await.unwrap();

        let err = h.controller.start(SessionMode::Generate, generate_params()).await.unwrap_err();
        assert_eq!(err, CallError::AlreadyInProgress);
        assert_eq!(h.channel.starts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_params_leave_controller_idle() {
        let mut h = harness(FeedbackOutcome::failed());
        let err = h.controller.start(SessionMode::Conduct, generate_params()).await.unwrap_err();

        assert!(matches!(err, CallError::InvalidParameters(_)));
        assert_eq!(h.controller.status(), CallStatus::Inactive);
        assert_eq!(h.channel.hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_start_failure_is_not_fatal() {
        let channel = Arc::new(FakeChannel {
            hub: EventHub::new(),
            starts: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            fail_start: true,
        });
        let mut h = harness_with(channel, FeedbackOutcome::failed());

        h.controller.start(SessionMode::Generate, generate_params()).await.unwrap();
        assert_eq!(h.controller.status(), CallStatus::Connecting);
    }

    #[tokio::test]
    async fn test_snapshot_tracks_speech_and_last_message() {
        let mut h = harness(FeedbackOutcome::failed());
        h.controller.start(SessionMode::Conduct, conduct_params()).await.unwrap();
        h.channel.hub.emit(ChannelEvent::CallStart);
        h.channel.hub.emit(ChannelEvent::SpeechStart);
        h.channel.hub.emit(transcript("assistant", "final", "Tell me about yourself"));
        pump(&mut h.controller, 3).await;

        let snapshot = h.controller.snapshot();
        assert!(snapshot.is_speaking);
        assert_eq!(snapshot.last_message.as_deref(), Some("Tell me about yourself"));
        assert_eq!(snapshot.message_count, 1);
        assert_eq!(h.view.renders.lock().unwrap().last(), Some(&snapshot));
    }

    #[tokio::test]
    async fn test_discarded_controller_stops_listening() {
        let mut h = harness(FeedbackOutcome::failed());
        h.controller.start(SessionMode::Conduct, conduct_params()).await.unwrap();
        assert_eq!(h.channel.hub.listener_count(), 1);

        h.controller.close();
        h.controller.close();
        assert_eq!(h.channel.hub.listener_count(), 0);

        h.channel.hub.emit(ChannelEvent::CallStart);
        assert_eq!(h.controller.status(), CallStatus::Connecting);

        let Harness { channel, controller, .. } = h;
        drop(controller);
        assert_eq!(channel.hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let h = harness(FeedbackOutcome::failed());
        let Harness {
            channel,
            mut controller,
            ..
        } = h;
        controller.start(SessionMode::Generate, generate_params()).await.unwrap();
        assert_eq!(channel.hub.listener_count(), 1);

        drop(controller);
        assert_eq!(channel.hub.listener_count(), 0);
    }
}
