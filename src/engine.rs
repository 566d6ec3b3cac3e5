//! Coaching engine: dispatcher and wiring
//!
//! Routes each decoded inbound frame to exactly one handler and holds the
//! pieces together: session transport, timeline resolver, negotiation
//! state, audio player and the latest stats snapshot. The engine is an
//! explicitly constructed object with a clear teardown path; the host
//! drives it from its own event loop and reads guidance back through
//! [`CoachEngine::resolve`].

use crate::audio::{FeedbackDelivery, FeedbackPlayer};
use crate::capture::ControlAction;
use crate::guidance::{GuidePriority, InvariantKeyframe, ShotGuide};
use crate::negotiate::{NegotiationOutcome, Negotiator};
use crate::protocol::{
    GraphicCueKind, RuleStatus, ScreenTarget, ServerFrame, SessionStats,
};
use crate::session::{CoachSession, Result, SessionEvent};
use crate::timeline::{KickView, ShotPreview, TimelineResolver, UpcomingPeak};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Host-facing notifications. Rendering is the host's job; the engine only
/// says what happened.
#[derive(Debug)]
pub enum CoachEvent {
    Feedback {
        rule_id: String,
        text: String,
    },
    RuleChanged {
        rule_id: String,
        status: RuleStatus,
    },
    GraphicGuide {
        kind: GraphicCueKind,
        cue: String,
        target: Option<ScreenTarget>,
    },
    TextCoach {
        text: String,
        priority: GuidePriority,
        persona: String,
    },
    AudioFeedback {
        text: String,
        delivery: FeedbackDelivery,
    },
    /// A new guidance snapshot is in effect.
    GuidanceLoaded,
    NegotiationSettled(NegotiationOutcome),
    /// Server-reported error; non-blocking status, never fatal.
    UpstreamError {
        message: String,
    },
    /// Transport dropped; reconnection is handled inside the session.
    ConnectionLost,
}

/// Everything the UI needs for the current clock reading, in one pure
/// lookup.
#[derive(Debug)]
pub struct GuidanceView<'a> {
    pub shot: Option<&'a ShotGuide>,
    pub next_shot: Option<ShotPreview<'a>>,
    pub kicks: KickView<'a>,
    pub keyframe: Option<&'a InvariantKeyframe>,
    pub upcoming_peak: Option<UpcomingPeak<'a>>,
}

pub struct CoachEngine {
    session: CoachSession,
    resolver: TimelineResolver,
    negotiator: Negotiator,
    player: FeedbackPlayer,
    stats: SessionStats,
    gemini_connected: bool,
    rule_status: HashMap<String, RuleStatus>,
    host_tx: mpsc::UnboundedSender<CoachEvent>,
}

impl CoachEngine {
    pub fn new(
        session: CoachSession,
        player: FeedbackPlayer,
        host_tx: mpsc::UnboundedSender<CoachEvent>,
    ) -> Self {
        Self {
            session,
            resolver: TimelineResolver::new(),
            negotiator: Negotiator::new(),
            player,
            stats: SessionStats::default(),
            gemini_connected: false,
            rule_status: HashMap::new(),
            host_tx,
        }
    }

    pub fn session(&self) -> &CoachSession {
        &self.session
    }

    pub fn resolver(&self) -> &TimelineResolver {
        &self.resolver
    }

    /// Latest stats snapshot (replaced wholesale on `session_status`).
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Whether the upstream AI coach is live (vs. a degraded fallback).
    pub fn gemini_connected(&self) -> bool {
        self.gemini_connected
    }

    pub fn rule_status(&self, rule_id: &str) -> Option<RuleStatus> {
        self.rule_status.get(rule_id).copied()
    }

    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    /// Deterministic teardown: same cleanup path as an explicit disconnect.
    pub async fn shutdown(&self) {
        self.session.disconnect().await;
    }

    /// Forward a capture-control intent as a `control` frame.
    pub async fn control(&self, action: ControlAction) -> Result<()> {
        self.session.send_control(action).await
    }

    /// Start a negotiation over a piece of guidance. The exchange stays
    /// pending until the server answers; nothing waits on it.
    pub async fn submit_feedback(&mut self, text: &str) -> Result<()> {
        self.session.send_user_feedback(text).await?;
        self.negotiator.begin(text);
        Ok(())
    }

    pub fn negotiation_pending(&self) -> bool {
        self.negotiator.is_pending()
    }

    /// Install keyframes for the overlay-renderer surface.
    pub fn set_keyframes(&mut self, keyframes: Vec<InvariantKeyframe>) {
        self.resolver.set_keyframes(keyframes);
    }

    /// Resolve all guidance surfaces for the given recording clock.
    pub fn resolve(&self, current_time_ms: u64) -> GuidanceView<'_> {
        GuidanceView {
            shot: self.resolver.resolve_shot(current_time_ms),
            next_shot: self.resolver.next_shot_preview(current_time_ms),
            kicks: self.resolver.resolve_kicks(current_time_ms),
            keyframe: self.resolver.resolve_keyframe(current_time_ms),
            upcoming_peak: self.resolver.upcoming_peak(current_time_ms),
        }
    }

    /// Pump one session event. Returns `false` once the session is gone.
    pub async fn run_once(&mut self) -> bool {
        match self.session.next_event().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Frame(frame) => self.handle_frame(frame).await,
            SessionEvent::TransportClosed => {
                self.emit(CoachEvent::ConnectionLost);
            }
        }
    }

    /// Route one decoded frame to its handler.
    async fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::SessionStatus {
                status,
                gemini_connected,
                stats,
                ..
            } => {
                self.session.note_status(&status).await;
                self.gemini_connected = gemini_connected;
                if let Some(stats) = stats {
                    // Wholesale replacement, never a field merge.
                    self.stats = stats;
                }
            }
            ServerFrame::Feedback { rule_id, text, .. } => {
                self.emit(CoachEvent::Feedback { rule_id, text });
            }
            ServerFrame::RuleUpdate {
                rule_id, status, ..
            } => {
                self.rule_status.insert(rule_id.clone(), status);
                self.emit(CoachEvent::RuleChanged { rule_id, status });
            }
            ServerFrame::GraphicGuide {
                kind, cue, target, ..
            } => {
                self.emit(CoachEvent::GraphicGuide { kind, cue, target });
            }
            ServerFrame::TextCoach {
                text,
                priority,
                persona,
                ..
            } => {
                self.emit(CoachEvent::TextCoach {
                    text,
                    priority,
                    persona,
                });
            }
            ServerFrame::AudioFeedback {
                text, audio_b64, ..
            } => {
                let delivery = self.player.play(&text, audio_b64.as_deref());
                self.emit(CoachEvent::AudioFeedback { text, delivery });
            }
            ServerFrame::VdgCoachingData { data, .. } => {
                self.resolver.set_guidance(data);
                self.emit(CoachEvent::GuidanceLoaded);
            }
            ServerFrame::AdaptiveResponse {
                accepted,
                message,
                alternative,
                coaching_adjustment,
                reason,
                ..
            } => {
                let outcome = self.negotiator.on_response(
                    accepted,
                    message,
                    alternative,
                    coaching_adjustment,
                    reason,
                );
                if let NegotiationOutcome::Accepted {
                    adjustment: Some(adjustment),
                    ..
                } = &outcome
                {
                    self.resolver.apply_adjustment(adjustment.clone());
                }
                if !matches!(outcome, NegotiationOutcome::Unsolicited) {
                    self.emit(CoachEvent::NegotiationSettled(outcome));
                }
            }
            ServerFrame::Pong { timestamp } => {
                debug!(timestamp, "pong");
            }
            ServerFrame::Error { message, .. } => {
                warn!(%message, "server error frame");
                self.emit(CoachEvent::UpstreamError { message });
            }
        }
    }

    fn emit(&self, event: CoachEvent) {
        if self.host_tx.send(event).is_err() {
            debug!("host dropped its event receiver");
        }
    }
}
