//! reelcoach - real-time coaching synchronization engine for live filming
//!
//! While a creator records a short video, a backend coach streams timed
//! guidance (shot composition, beat/kick alerts, spoken and graphic
//! feedback) that must stay in sync with the recording clock and with
//! negotiated corrections from the user. This crate is that engine: the
//! duplex session protocol, the typed message taxonomy, the timeline
//! matching, and the adaptive negotiation sub-protocol. Rendering, media
//! capture and everything else belongs to the host.

#![forbid(unsafe_code)]

/// Audio feedback playback over host-injected sinks
pub mod audio;
/// Capture-pipeline boundary: recording clock and control intents
pub mod capture;
/// Frame dispatcher and engine wiring
pub mod engine;
/// VDG guidance data model
pub mod guidance;
/// Adaptive negotiation sub-protocol
pub mod negotiate;
/// Wire protocol codec
pub mod protocol;
/// Session transport and connection state machine
pub mod session;
/// Timeline resolver
pub mod timeline;

pub use audio::{AudioSink, FeedbackDelivery, FeedbackPlayer, SpeechSynthesizer};
pub use capture::{ControlAction, ManualClock, MonotonicClock, RecordingClock};
pub use engine::{CoachEngine, CoachEvent, GuidanceView};
pub use guidance::{
    GuidePriority, InvariantKeyframe, KeyframeRole, KickKind, KickTiming, MiseEnSceneGuide,
    ShotGuide, VdgCoachingData,
};
pub use negotiate::{AdjustmentAction, CoachingAdjustment, NegotiationOutcome, Negotiator};
pub use protocol::{
    ClientFrame, ConnectOptions, GraphicCueKind, OutputMode, RuleStatus, ScreenTarget, ServerFrame,
    SessionStats, VoiceStyle,
};
pub use session::{
    CoachSession, SessionConfig, SessionError, SessionEvent, SessionState,
};
pub use timeline::{KickView, ShotPreview, TimelineResolver, UpcomingKick, UpcomingPeak};
