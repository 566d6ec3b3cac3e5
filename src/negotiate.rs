//! Adaptive negotiation sub-protocol
//!
//! The user can contest a piece of guidance mid-session: free text goes out
//! as a `user_feedback` frame, and the only valid reply is an
//! `adaptive_response` carrying an accept/reject decision. There is no
//! timeout on the exchange; a pending negotiation never blocks anything
//! else.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Accepted adjustment to a named rule's guidance. Applied to every
/// subsequent timeline resolution until the next `vdg_coaching_data`
/// snapshot clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachingAdjustment {
    /// Cue identifier of the rule being adjusted (matches `KickTiming::cue`).
    pub rule_id: String,
    pub action: AdjustmentAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentAction {
    /// Stop surfacing the rule's alerts entirely.
    Suppress,
    /// Shift the rule's alert by a signed number of seconds.
    Retime { shift_sec: f64 },
}

/// Outcome of an `adaptive_response`, surfaced to the caller.
#[derive(Debug, Clone)]
pub enum NegotiationOutcome {
    Accepted {
        message: String,
        alternative: Option<String>,
        adjustment: Option<CoachingAdjustment>,
    },
    /// The reason text is surfaced verbatim; session state is unchanged.
    Rejected { reason: String },
    /// Response arrived with no negotiation in flight; dropped.
    Unsolicited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExchangeState {
    Idle,
    Pending { text: String },
}

/// Tracks the single in-flight user-initiated exchange.
#[derive(Debug)]
pub struct Negotiator {
    state: ExchangeState,
}

impl Negotiator {
    pub fn new() -> Self {
        Self {
            state: ExchangeState::Idle,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ExchangeState::Pending { .. })
    }

    /// Start a negotiation. A still-pending exchange is superseded; the
    /// server treats the latest feedback as authoritative.
    pub fn begin(&mut self, text: &str) {
        if let ExchangeState::Pending { text: prev } = &self.state {
            info!(previous = %prev, "superseding pending negotiation");
        }
        debug!(text, "negotiation started");
        self.state = ExchangeState::Pending {
            text: text.to_string(),
        };
    }

    /// Apply an `adaptive_response` to the pending exchange.
    pub fn on_response(
        &mut self,
        accepted: bool,
        message: String,
        alternative: Option<String>,
        adjustment: Option<CoachingAdjustment>,
        reason: Option<String>,
    ) -> NegotiationOutcome {
        if !self.is_pending() {
            warn!("adaptive_response with no negotiation in flight");
            return NegotiationOutcome::Unsolicited;
        }
        self.state = ExchangeState::Idle;

        if accepted {
            info!(?adjustment, "negotiation accepted");
            NegotiationOutcome::Accepted {
                message,
                alternative,
                adjustment,
            }
        } else {
            let reason = reason.unwrap_or(message);
            info!(%reason, "negotiation rejected");
            NegotiationOutcome::Rejected { reason }
        }
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_yields_adjustment() {
        let mut n = Negotiator::new();
        n.begin("the beat cue at 10s feels early");
        let outcome = n.on_response(
            true,
            "shifted the cue back".into(),
            None,
            Some(CoachingAdjustment {
                rule_id: "kick_10".into(),
                action: AdjustmentAction::Retime { shift_sec: 1.5 },
            }),
            None,
        );
        match outcome {
            NegotiationOutcome::Accepted { adjustment, .. } => {
                let adj = adjustment.unwrap();
                assert_eq!(adj.rule_id, "kick_10");
                assert_eq!(adj.action, AdjustmentAction::Retime { shift_sec: 1.5 });
            }
            other => panic!("expected accept, got {:?}", other),
        }
        assert!(!n.is_pending());
    }

    #[test]
    fn reject_surfaces_reason_verbatim() {
        let mut n = Negotiator::new();
        n.begin("drop the countdown entirely");
        let outcome = n.on_response(
            false,
            "cannot comply".into(),
            None,
            None,
            Some("countdown is required for this template".into()),
        );
        match outcome {
            NegotiationOutcome::Rejected { reason } => {
                assert_eq!(reason, "countdown is required for this template");
            }
            other => panic!("expected reject, got {:?}", other),
        }
    }

    #[test]
    fn reject_falls_back_to_message_when_no_reason() {
        let mut n = Negotiator::new();
        n.begin("anything");
        match n.on_response(false, "nope".into(), None, None, None) {
            NegotiationOutcome::Rejected { reason } => assert_eq!(reason, "nope"),
            other => panic!("expected reject, got {:?}", other),
        }
    }

    #[test]
    fn unsolicited_response_is_ignored() {
        let mut n = Negotiator::new();
        let outcome = n.on_response(true, "surprise".into(), None, None, None);
        assert!(matches!(outcome, NegotiationOutcome::Unsolicited));
    }

    #[test]
    fn new_feedback_supersedes_pending_exchange() {
        let mut n = Negotiator::new();
        n.begin("first");
        n.begin("second");
        assert!(n.is_pending());
        // The single reply settles whichever text is current.
        assert!(matches!(
            n.on_response(true, "ok".into(), None, None, None),
            NegotiationOutcome::Accepted { .. }
        ));
        assert!(!n.is_pending());
    }
}
