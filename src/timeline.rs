//! Timeline resolver
//!
//! Answers "what guidance applies right now" against the moving recording
//! clock. Every query is pure and total: the same `(current_time_ms,
//! snapshot, adjustments)` triple always yields the same answer, and there
//! is no internal cursor, so seeking the recording in either direction
//! needs no reset.
//!
//! Two query surfaces exist (shot/keyframe-based and kick-timing-based);
//! they share the same elapsed/upcoming lookup primitives so the tie-break
//! logic cannot drift apart. They are mutually exclusive per session type
//! and never merged.

use crate::guidance::{InvariantKeyframe, KeyframeRole, KickTiming, ShotGuide, VdgCoachingData};
use crate::negotiate::{AdjustmentAction, CoachingAdjustment};
use std::collections::HashMap;
use tracing::{debug, info};

/// Fixed look-ahead for keyframe peaks.
const PEAK_PRE_ALERT_SEC: f64 = 3.0;
/// Fixed look-ahead for the next-shot preview.
const NEXT_SHOT_PREVIEW_SEC: f64 = 3.0;

/// Upcoming-shot preview surfaced while inside the previous shot.
#[derive(Debug, Clone, Copy)]
pub struct ShotPreview<'a> {
    pub shot: &'a ShotGuide,
    pub time_remaining_sec: f64,
}

/// A kick inside its pre-alert window.
#[derive(Debug, Clone, Copy)]
pub struct UpcomingKick<'a> {
    pub kick: &'a KickTiming,
    pub time_to_kick_sec: f64,
    pub countdown_secs: u32,
}

/// A peak keyframe inside the fixed 3s window.
#[derive(Debug, Clone, Copy)]
pub struct UpcomingPeak<'a> {
    pub keyframe: &'a InvariantKeyframe,
    pub time_to_peak_sec: f64,
    pub countdown_secs: u32,
}

/// Combined kick-surface view: the steady-state active kick plus at most
/// one upcoming alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct KickView<'a> {
    pub active: Option<&'a KickTiming>,
    pub upcoming: Option<UpcomingKick<'a>>,
}

pub struct TimelineResolver {
    guidance: VdgCoachingData,
    keyframes: Vec<InvariantKeyframe>,
    /// Accepted negotiation adjustments, keyed by cue id. Cleared whenever
    /// a new guidance snapshot arrives.
    adjustments: HashMap<String, AdjustmentAction>,
}

impl TimelineResolver {
    pub fn new() -> Self {
        Self {
            guidance: VdgCoachingData::default(),
            keyframes: Vec::new(),
            adjustments: HashMap::new(),
        }
    }

    /// Replace the guidance snapshot wholesale. Partial sets are never
    /// applied; accepted adjustments are superseded by the new snapshot.
    pub fn set_guidance(&mut self, data: VdgCoachingData) {
        info!(
            shots = data.shots.len(),
            kicks = data.kicks.len(),
            checklist = data.mise_en_scene.len(),
            "guidance snapshot replaced"
        );
        self.guidance = data;
        self.adjustments.clear();
    }

    pub fn set_keyframes(&mut self, keyframes: Vec<InvariantKeyframe>) {
        self.keyframes = keyframes;
    }

    pub fn guidance(&self) -> &VdgCoachingData {
        &self.guidance
    }

    pub fn apply_adjustment(&mut self, adjustment: CoachingAdjustment) {
        debug!(rule = %adjustment.rule_id, action = ?adjustment.action, "coaching adjustment applied");
        self.adjustments
            .insert(adjustment.rule_id, adjustment.action);
    }

    /// The shot whose window contains the clock, or `None` between windows
    /// (the caller renders a neutral state). Deterministic under malformed
    /// input: overlapping windows resolve to the lowest index.
    pub fn resolve_shot(&self, current_time_ms: u64) -> Option<&ShotGuide> {
        let t_sec = sec(current_time_ms);
        self.guidance
            .shots
            .iter()
            .filter(|s| s.contains(t_sec))
            .min_by_key(|s| s.index)
    }

    /// While inside a shot, the following shot (by `index + 1`) once it
    /// starts within the preview window.
    pub fn next_shot_preview(&self, current_time_ms: u64) -> Option<ShotPreview<'_>> {
        let t_sec = sec(current_time_ms);
        let current = self.resolve_shot(current_time_ms)?;
        let next = self
            .guidance
            .shots
            .iter()
            .find(|s| s.index == current.index + 1)?;
        let remaining = next.start_sec() - t_sec;
        if remaining > 0.0 && remaining <= NEXT_SHOT_PREVIEW_SEC {
            Some(ShotPreview {
                shot: next,
                time_remaining_sec: remaining,
            })
        } else {
            None
        }
    }

    /// Active keyframe under the fixed role priority `PEAK > END > START`;
    /// ties within one role go to the most recent. Before the first
    /// keyframe has elapsed, the first `PEAK` (or the first keyframe
    /// overall) is returned as a pre-roll preview.
    pub fn resolve_keyframe(&self, current_time_ms: u64) -> Option<&InvariantKeyframe> {
        let any_elapsed = self
            .keyframes
            .iter()
            .any(|kf| kf.time_ms <= current_time_ms);
        if !any_elapsed {
            return self
                .keyframes
                .iter()
                .find(|kf| kf.role == KeyframeRole::Peak)
                .or_else(|| self.keyframes.first());
        }

        // The fallback order comes straight from the declared priorities.
        let mut roles = [KeyframeRole::Start, KeyframeRole::Peak, KeyframeRole::End];
        roles.sort_unstable_by_key(|role| role.priority());
        for role in roles {
            let hit = latest_at_or_before(
                self.keyframes.iter().filter(|kf| kf.role == role),
                |kf| kf.time_ms as f64,
                current_time_ms as f64,
            );
            if hit.is_some() {
                return hit;
            }
        }
        None
    }

    /// The nearest future kick inside its own pre-alert window. Suppressed
    /// rules are skipped; retimed rules shift.
    pub fn upcoming_kick(&self, current_time_ms: u64) -> Option<UpcomingKick<'_>> {
        let t_sec = sec(current_time_ms);
        nearest_upcoming(
            self.guidance
                .kicks
                .iter()
                .filter(|k| !self.is_suppressed(&k.cue)),
            |k| self.effective_time(k),
            |k| k.pre_alert_sec,
            t_sec,
        )
        .map(|(kick, delta)| UpcomingKick {
            kick,
            time_to_kick_sec: delta,
            countdown_secs: countdown(delta),
        })
    }

    /// Steady-state kick guidance: the most recently elapsed,
    /// non-suppressed kick.
    pub fn active_kick(&self, current_time_ms: u64) -> Option<&KickTiming> {
        let t_sec = sec(current_time_ms);
        latest_at_or_before(
            self.guidance
                .kicks
                .iter()
                .filter(|k| !self.is_suppressed(&k.cue)),
            |k| self.effective_time(k),
            t_sec,
        )
    }

    pub fn resolve_kicks(&self, current_time_ms: u64) -> KickView<'_> {
        KickView {
            active: self.active_kick(current_time_ms),
            upcoming: self.upcoming_kick(current_time_ms),
        }
    }

    /// The nearest future `PEAK` keyframe within the fixed 3s window.
    pub fn upcoming_peak(&self, current_time_ms: u64) -> Option<UpcomingPeak<'_>> {
        let t_sec = sec(current_time_ms);
        nearest_upcoming(
            self.keyframes
                .iter()
                .filter(|kf| kf.role == KeyframeRole::Peak),
            |kf| kf.time_ms as f64 / 1000.0,
            |_| PEAK_PRE_ALERT_SEC,
            t_sec,
        )
        .map(|(keyframe, delta)| UpcomingPeak {
            keyframe,
            time_to_peak_sec: delta,
            countdown_secs: countdown(delta),
        })
    }

    fn is_suppressed(&self, cue: &str) -> bool {
        matches!(self.adjustments.get(cue), Some(AdjustmentAction::Suppress))
    }

    fn effective_time(&self, kick: &KickTiming) -> f64 {
        match self.adjustments.get(&kick.cue) {
            Some(AdjustmentAction::Retime { shift_sec }) => kick.time_sec + shift_sec,
            _ => kick.time_sec,
        }
    }
}

impl Default for TimelineResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn sec(t_ms: u64) -> f64 {
    t_ms as f64 / 1000.0
}

/// Countdown rendered while an event is upcoming: whole seconds remaining,
/// rounded up.
fn countdown(delta_sec: f64) -> u32 {
    delta_sec.ceil().max(0.0) as u32
}

/// Shared lookup primitive: the item with the greatest time not exceeding
/// `t`. Later list entries win exact-time ties, which makes the recency
/// rule deterministic.
fn latest_at_or_before<'a, T>(
    items: impl Iterator<Item = &'a T>,
    time_of: impl Fn(&T) -> f64,
    t: f64,
) -> Option<&'a T> {
    let mut best: Option<(&'a T, f64)> = None;
    for item in items {
        let at = time_of(item);
        if at > t {
            continue;
        }
        match best {
            Some((_, best_at)) if best_at > at => {}
            _ => best = Some((item, at)),
        }
    }
    best.map(|(item, _)| item)
}

/// Shared lookup primitive: the nearest item whose `(time - t)` lies in
/// `(0, window]`. Only one upcoming event is ever surfaced.
fn nearest_upcoming<'a, T>(
    items: impl Iterator<Item = &'a T>,
    time_of: impl Fn(&T) -> f64,
    window_of: impl Fn(&T) -> f64,
    t: f64,
) -> Option<(&'a T, f64)> {
    let mut best: Option<(&'a T, f64)> = None;
    for item in items {
        let delta = time_of(item) - t;
        if delta <= 0.0 || delta > window_of(item) {
            continue;
        }
        match best {
            Some((_, best_delta)) if best_delta <= delta => {}
            _ => best = Some((item, delta)),
        }
    }
    best
}
