//! Per-chunk round-trip state — attempt counting and outcome.
//!
//! ```text
//! Idle ──send──▶ Sent ──ACK──▶ Acked
//!                 │
//!                 └─NAK / timeout / bad reply──▶ Idle (retry) … ▶ Failed
//! ```
//!
//! This is pure bookkeeping. It performs no I/O and emits no logs; callers
//! report transitions through their own observer.

use std::fmt;

/// Attempts per chunk before it is declared failed (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTripState {
    /// Waiting to be (re)sent. Carries the number of attempts already made.
    Idle { attempts: u8 },
    /// Sent and awaiting the reply to attempt `attempt` (1-based).
    Sent { attempt: u8 },
    Acked { attempt: u8 },
    Failed { attempts: u8 },
}

/// Why one attempt did not end in an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The receiver answered NAK — its checksum did not match.
    Nacked,
    /// No reply within the acknowledgement timeout.
    TimedOut,
    /// The reply was neither ACK nor NAK.
    UnexpectedReply(Vec<u8>),
    /// The connection failed while sending or waiting.
    Transport(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Nacked => write!(f, "negative acknowledgement"),
            AttemptFailure::TimedOut => write!(f, "acknowledgement timeout"),
            AttemptFailure::UnexpectedReply(r) => write!(f, "unexpected reply ({} bytes)", r.len()),
            AttemptFailure::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

/// What the sender should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Retry,
    GiveUp,
}

/// Round-trip bookkeeping for one chunk.
#[derive(Debug, Clone)]
pub struct RoundTrip {
    max_attempts: u8,
    state: RoundTripState,
}

impl RoundTrip {
    pub fn new(max_attempts: u8) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            state: RoundTripState::Idle { attempts: 0 },
        }
    }

    pub fn state(&self) -> RoundTripState {
        self.state
    }

    /// Attempts made so far, including one in flight.
    pub fn attempts(&self) -> u8 {
        match self.state {
            RoundTripState::Idle { attempts } | RoundTripState::Failed { attempts } => attempts,
            RoundTripState::Sent { attempt } | RoundTripState::Acked { attempt } => attempt,
        }
    }

    /// Move `Idle → Sent`. Returns the 1-based attempt number, or `None` if
    /// the chunk is not idle or has no attempts left.
    pub fn begin_attempt(&mut self) -> Option<u8> {
        match self.state {
            RoundTripState::Idle { attempts } if attempts < self.max_attempts => {
                let attempt = attempts + 1;
                self.state = RoundTripState::Sent { attempt };
                Some(attempt)
            }
            _ => None,
        }
    }

    /// Move `Sent → Acked`.
    pub fn acknowledged(&mut self) {
        if let RoundTripState::Sent { attempt } = self.state {
            self.state = RoundTripState::Acked { attempt };
        }
    }

    /// Record a failed attempt. Moves `Sent → Idle` while attempts remain,
    /// otherwise `Sent → Failed`.
    pub fn attempt_failed(&mut self) -> Next {
        match self.state {
            RoundTripState::Sent { attempt } if attempt < self.max_attempts => {
                self.state = RoundTripState::Idle { attempts: attempt };
                Next::Retry
            }
            RoundTripState::Sent { attempt } => {
                self.state = RoundTripState::Failed { attempts: attempt };
                Next::GiveUp
            }
            RoundTripState::Failed { .. } => Next::GiveUp,
            _ => Next::Retry,
        }
    }

    pub fn is_acked(&self) -> bool {
        matches!(self.state, RoundTripState::Acked { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, RoundTripState::Failed { .. })
    }
}
