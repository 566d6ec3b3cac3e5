//! VDG guidance data model
//!
//! The server pushes one `vdg_coaching_data` payload per session: the shot
//! list, the kick timings and the mise-en-scène checklist. A new payload
//! always replaces the previous one wholesale; nothing in here is mutated
//! in place after decoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The full timed guidance set for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VdgCoachingData {
    #[serde(default)]
    pub shots: Vec<ShotGuide>,
    #[serde(default)]
    pub kicks: Vec<KickTiming>,
    #[serde(default)]
    pub mise_en_scene: Vec<MiseEnSceneGuide>,
}

/// One entry of the shot list, valid over `[start, end)` seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShotGuide {
    pub index: u32,
    /// `[start_sec, end_sec]`, start < end assumed but not enforced.
    pub time_window: [f64; 2],
    pub guidance: String,
}

impl ShotGuide {
    pub fn start_sec(&self) -> f64 {
        self.time_window[0]
    }

    pub fn end_sec(&self) -> f64 {
        self.time_window[1]
    }

    pub fn contains(&self, t_sec: f64) -> bool {
        t_sec >= self.start_sec() && t_sec < self.end_sec()
    }
}

/// An instantaneous beat-matched event with its own look-ahead window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickTiming {
    pub time_sec: f64,
    pub kind: KickKind,
    /// Cue identifier; negotiation adjustments key on this.
    pub cue: String,
    pub message: String,
    pub pre_alert_sec: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KickKind {
    Punch,
    End,
}

/// One mise-en-scène checklist item. The engine only carries the raw list;
/// the onboarding checklist gate lives outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiseEnSceneGuide {
    pub element: String,
    pub value: String,
    pub guidance: String,
    pub priority: GuidePriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidePriority {
    High,
    Medium,
    Low,
}

/// Keyframe consumed by the overlay renderer surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantKeyframe {
    pub time_ms: u64,
    pub role: KeyframeRole,
    pub kick_type: String,
    #[serde(default)]
    pub invariant_elements: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyframeRole {
    Start,
    Peak,
    End,
}

impl KeyframeRole {
    /// Fixed tie-break ordering: lower wins.
    pub fn priority(self) -> u8 {
        match self {
            KeyframeRole::Peak => 0,
            KeyframeRole::End => 1,
            KeyframeRole::Start => 2,
        }
    }
}
