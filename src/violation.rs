use crate::config::TrustPenalties;
use crate::util::time_diff_ms;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// One detected anomaly, normalized from whichever watchdog saw it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    TabHidden,
    WindowBlur,
    Throttled,
    ExternalPaste,
    FullscreenExit,
    BotSpeed,
}

impl ViolationKind {
    /// Trust-score deduction for this kind of violation.
    pub fn penalty(&self, penalties: &TrustPenalties) -> u8 {
        match self {
            ViolationKind::TabHidden => penalties.tab_hidden,
            ViolationKind::WindowBlur => penalties.window_blur,
            ViolationKind::Throttled => penalties.throttled,
            ViolationKind::ExternalPaste => penalties.external_paste,
            ViolationKind::FullscreenExit => penalties.fullscreen_exit,
            ViolationKind::BotSpeed => penalties.bot_speed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub timestamp: SystemTime,
    pub penalty: u8,
    pub detail: String,
}

/// What the ledger did with an observed violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Strike accepted; carries the post-increment count.
    Counted(u32),
    /// Inside the rolling debounce window of the last counted strike.
    Debounced,
    /// Ledger already reached `max_strikes`; observed but not counted.
    Frozen,
}

/// Per-session strike bookkeeping. Count is monotone and freezes at
/// `max_strikes`; raw signals arriving after that are observed, never counted.
#[derive(Debug, Clone)]
pub struct StrikeLedger {
    count: u32,
    max_strikes: u32,
    last_strike_at: Option<SystemTime>,
}

impl StrikeLedger {
    pub fn new(max_strikes: u32) -> Self {
        Self {
            count: 0,
            max_strikes,
            last_strike_at: None,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_strikes(&self) -> u32 {
        self.max_strikes
    }

    pub fn last_strike_at(&self) -> Option<SystemTime> {
        self.last_strike_at
    }

    pub fn is_frozen(&self) -> bool {
        self.count >= self.max_strikes
    }

    /// Apply the debounce filter and, if the strike is accepted, increment.
    /// The returned count is read at the moment of the increment so callers
    /// never report a stale strike number.
    pub fn record(&mut self, at: SystemTime, debounce_ms: u64) -> RecordOutcome {
        if self.is_frozen() {
            return RecordOutcome::Frozen;
        }
        if let Some(last) = self.last_strike_at {
            if time_diff_ms(last, at) < debounce_ms {
                return RecordOutcome::Debounced;
            }
        }
        self.count += 1;
        self.last_strike_at = Some(at);
        RecordOutcome::Counted(self.count)
    }
}
