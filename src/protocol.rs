//! Wire protocol for the coaching session
//!
//! JSON frames over a persistent duplex connection. Inbound frames form a
//! closed tagged union; everything goes through [`decode_frame`] which
//! either yields a typed frame or a decode error the caller logs and drops.
//! Unchecked casts on raw JSON never cross this boundary.

use crate::guidance::{GuidePriority, VdgCoachingData};
use crate::negotiate::CoachingAdjustment;
use serde::{Deserialize, Serialize};

/// Server -> client frames. Every variant carries `timestamp` (ms since the
/// server's session epoch); consumers branch on the discriminant only.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    SessionStatus {
        timestamp: u64,
        /// `connected` / `recording` / `paused` / `ended`. Kept as a string:
        /// an unrecognized status value demotes to plain `connected` rather
        /// than dropping the frame.
        status: String,
        #[serde(default)]
        gemini_connected: bool,
        #[serde(default)]
        stats: Option<SessionStats>,
    },
    Feedback {
        timestamp: u64,
        rule_id: String,
        text: String,
    },
    RuleUpdate {
        timestamp: u64,
        rule_id: String,
        status: RuleStatus,
    },
    GraphicGuide {
        timestamp: u64,
        kind: GraphicCueKind,
        cue: String,
        #[serde(default)]
        target: Option<ScreenTarget>,
    },
    TextCoach {
        timestamp: u64,
        text: String,
        priority: GuidePriority,
        persona: String,
    },
    AudioFeedback {
        timestamp: u64,
        text: String,
        #[serde(default)]
        audio_b64: Option<String>,
    },
    VdgCoachingData {
        timestamp: u64,
        data: VdgCoachingData,
    },
    AdaptiveResponse {
        timestamp: u64,
        accepted: bool,
        message: String,
        #[serde(default)]
        alternative: Option<String>,
        #[serde(default)]
        coaching_adjustment: Option<CoachingAdjustment>,
        #[serde(default)]
        reason: Option<String>,
    },
    Pong {
        timestamp: u64,
    },
    Error {
        timestamp: u64,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Pass,
    Fail,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicCueKind {
    Composition,
    Timing,
    Action,
}

/// Screen-space target for a graphic cue, normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScreenTarget {
    pub x: f64,
    pub y: f64,
}

/// Client -> server frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    Control {
        action: crate::capture::ControlAction,
    },
    Metric {
        rule_id: String,
        value: f64,
        t_sec: f64,
    },
    Audio {
        data: String,
    },
    VideoFrame {
        frame_b64: String,
        t_sec: f64,
    },
    UserFeedback {
        text: String,
    },
}

/// Decode one raw inbound frame. The single validating parse: bad JSON and
/// unknown discriminants come back as errors, never as a panic or a partial
/// value.
pub fn decode_frame(raw: &str) -> Result<ServerFrame, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn encode_frame(frame: &ClientFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Stats snapshot carried by `session_status`. Merged by wholesale
/// replacement, never field by field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionStats {
    #[serde(default)]
    pub elapsed_sec: f64,
    #[serde(default)]
    pub rules_evaluated: u32,
    #[serde(default)]
    pub interventions_sent: u32,
    #[serde(default)]
    pub commands_delivered: u32,
    #[serde(default)]
    pub violations_detected: u32,
    /// Performance score, 0-100.
    #[serde(default)]
    pub score: u8,
    #[serde(default)]
    pub grade: Option<String>,
}

impl SessionStats {
    /// Letter grade, derived from the score when the snapshot omits it.
    pub fn grade(&self) -> String {
        match &self.grade {
            Some(g) => g.clone(),
            None => letter_grade(self.score).to_string(),
        }
    }
}

fn letter_grade(score: u8) -> &'static str {
    match score {
        s if s >= 90 => "A",
        s if s >= 80 => "B",
        s if s >= 70 => "C",
        s if s >= 60 => "D",
        _ => "F",
    }
}

/// Options negotiated once per connection, carried as query parameters.
/// Changing them requires a reconnect.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub language: String,
    pub voice_style: VoiceStyle,
    pub output_mode: OutputMode,
    pub persona: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            voice_style: VoiceStyle::Neutral,
            output_mode: OutputMode::GraphicAudio,
            persona: "director".to_string(),
        }
    }
}

impl ConnectOptions {
    /// Query string for the connect URL, including the session id.
    pub fn query_string(&self, session_id: &str) -> String {
        format!(
            "session_id={}&language={}&voice_style={}&output_mode={}&persona={}",
            session_id,
            self.language,
            self.voice_style.as_str(),
            self.output_mode.as_str(),
            self.persona
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStyle {
    Strict,
    Friendly,
    Neutral,
}

impl VoiceStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Friendly => "friendly",
            Self::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Graphic,
    Text,
    Audio,
    GraphicAudio,
}

impl OutputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Graphic => "graphic",
            Self::Text => "text",
            Self::Audio => "audio",
            Self::GraphicAudio => "graphic_audio",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ControlAction;

    #[test]
    fn decodes_session_status_with_stats() {
        let raw = r#"{
            "type": "session_status",
            "timestamp": 1000,
            "status": "recording",
            "gemini_connected": true,
            "stats": {"elapsed_sec": 12.5, "rules_evaluated": 4, "score": 91}
        }"#;
        match decode_frame(raw).unwrap() {
            ServerFrame::SessionStatus {
                status,
                gemini_connected,
                stats,
                ..
            } => {
                assert_eq!(status, "recording");
                assert!(gemini_connected);
                let stats = stats.unwrap();
                assert_eq!(stats.rules_evaluated, 4);
                assert_eq!(stats.grade(), "A");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn decodes_vdg_coaching_data() {
        let raw = r#"{
            "type": "vdg_coaching_data",
            "timestamp": 5,
            "data": {
                "shots": [{"index": 0, "time_window": [0.0, 4.0], "guidance": "hold wide"}],
                "kicks": [{"time_sec": 10.0, "kind": "punch", "cue": "k0",
                           "message": "hit on the beat", "pre_alert_sec": 3.0}],
                "mise_en_scene": [{"element": "lighting", "value": "warm",
                                   "guidance": "face the window", "priority": "high"}]
            }
        }"#;
        match decode_frame(raw).unwrap() {
            ServerFrame::VdgCoachingData { data, .. } => {
                assert_eq!(data.shots.len(), 1);
                assert_eq!(data.kicks[0].cue, "k0");
                assert_eq!(data.mise_en_scene[0].element, "lighting");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn decodes_adaptive_response_with_adjustment() {
        let raw = r#"{
            "type": "adaptive_response",
            "timestamp": 7,
            "accepted": true,
            "message": "ok, retimed",
            "coaching_adjustment": {"rule_id": "k0", "action": {"kind": "retime", "shift_sec": -0.5}}
        }"#;
        match decode_frame(raw).unwrap() {
            ServerFrame::AdaptiveResponse {
                accepted,
                coaching_adjustment,
                ..
            } => {
                assert!(accepted);
                assert_eq!(coaching_adjustment.unwrap().rule_id, "k0");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_discriminant_is_an_error() {
        assert!(decode_frame(r#"{"type": "telemetry_blast", "timestamp": 1}"#).is_err());
        assert!(decode_frame("not json at all").is_err());
    }

    #[test]
    fn client_frames_use_snake_case_tags() {
        let ping = encode_frame(&ClientFrame::Ping).unwrap();
        assert_eq!(ping, r#"{"type":"ping"}"#);

        let control = encode_frame(&ClientFrame::Control {
            action: ControlAction::Start,
        })
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&control).unwrap();
        assert_eq!(v["type"], "control");
        assert_eq!(v["action"], "start");

        let fb = encode_frame(&ClientFrame::UserFeedback {
            text: "too fast".into(),
        })
        .unwrap();
        let v: serde_json::Value = serde_json::from_str(&fb).unwrap();
        assert_eq!(v["type"], "user_feedback");
        assert_eq!(v["text"], "too fast");
    }

    #[test]
    fn connect_options_query_string() {
        let opts = ConnectOptions {
            language: "ko".into(),
            voice_style: VoiceStyle::Strict,
            output_mode: OutputMode::Graphic,
            persona: "mentor".into(),
        };
        assert_eq!(
            opts.query_string("s-42"),
            "session_id=s-42&language=ko&voice_style=strict&output_mode=graphic&persona=mentor"
        );
    }

    #[test]
    fn letter_grades_cover_the_scale() {
        for (score, grade) in [(95u8, "A"), (85, "B"), (72, "C"), (60, "D"), (12, "F")] {
            let stats = SessionStats {
                score,
                ..Default::default()
            };
            assert_eq!(stats.grade(), grade);
        }
    }
}
