use crate::session::SessionState;
use crate::util::time_diff_ms;
use crate::violation::ViolationKind;
use std::time::SystemTime;

/// Normalized browser-level signals the watchdog subscribes to.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserSignal {
    VisibilityChanged { hidden: bool, at: SystemTime },
    WindowBlur { document_hidden: bool, at: SystemTime },
    FullscreenChanged { fullscreen: bool, at: SystemTime },
    HeartbeatTick { at: SystemTime },
}

impl BrowserSignal {
    pub fn at(&self) -> SystemTime {
        match self {
            BrowserSignal::VisibilityChanged { at, .. }
            | BrowserSignal::WindowBlur { at, .. }
            | BrowserSignal::FullscreenChanged { at, .. }
            | BrowserSignal::HeartbeatTick { at } => *at,
        }
    }
}

/// Lifecycle transition requested alongside (or instead of) a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRequest {
    Pause,
    Resume,
}

#[derive(Debug, Default, PartialEq)]
pub struct WatchdogOutcome {
    pub violation: Option<(ViolationKind, SystemTime, String)>,
    pub request: Option<StateRequest>,
}

impl WatchdogOutcome {
    fn none() -> Self {
        Self::default()
    }
}

/// Watches visibility, window focus, fullscreen state and the heartbeat for
/// signs that the test-taker left the exam surface. Armed only while the
/// session is being measured; the heartbeat baseline resets on each arm so a
/// legitimate pause never reads as throttling.
#[derive(Debug)]
pub struct FocusWatchdog {
    stall_ms: u64,
    last_tick: Option<SystemTime>,
    armed: bool,
}

impl FocusWatchdog {
    pub fn new(stall_ms: u64) -> Self {
        Self {
            stall_ms,
            last_tick: None,
            armed: false,
        }
    }

    /// Start measuring; called on every entry to `Active`.
    pub fn arm(&mut self, now: SystemTime) {
        self.armed = true;
        self.last_tick = Some(now);
    }

    /// Stop measuring; called on every exit from `Active`.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.last_tick = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn observe(&mut self, signal: &BrowserSignal, state: SessionState) -> WatchdogOutcome {
        match *signal {
            BrowserSignal::HeartbeatTick { at } => {
                if !self.armed || state != SessionState::Active {
                    return WatchdogOutcome::none();
                }
                let delta = self.last_tick.map(|last| time_diff_ms(last, at));
                self.last_tick = Some(at);
                match delta {
                    // A stalled heartbeat means the tab was throttled into
                    // the background without a visibility event firing.
                    Some(d) if d > self.stall_ms => WatchdogOutcome {
                        violation: Some((
                            ViolationKind::Throttled,
                            at,
                            format!("heartbeat stalled for {}ms", d),
                        )),
                        request: None,
                    },
                    _ => WatchdogOutcome::none(),
                }
            }
            BrowserSignal::VisibilityChanged { hidden, at } => {
                if hidden && state == SessionState::Active {
                    WatchdogOutcome {
                        violation: Some((
                            ViolationKind::TabHidden,
                            at,
                            "document became hidden".to_string(),
                        )),
                        request: None,
                    }
                } else {
                    WatchdogOutcome::none()
                }
            }
            BrowserSignal::WindowBlur {
                document_hidden,
                at,
            } => {
                // A blur with the document hidden is the same event the
                // visibility handler already saw; only count overlay blurs.
                if state == SessionState::Active && !document_hidden {
                    WatchdogOutcome {
                        violation: Some((
                            ViolationKind::WindowBlur,
                            at,
                            "window lost focus while visible".to_string(),
                        )),
                        request: None,
                    }
                } else {
                    WatchdogOutcome::none()
                }
            }
            BrowserSignal::FullscreenChanged { fullscreen, at } => {
                if !fullscreen && state == SessionState::Active {
                    WatchdogOutcome {
                        violation: Some((
                            ViolationKind::FullscreenExit,
                            at,
                            "exited fullscreen".to_string(),
                        )),
                        request: Some(StateRequest::Pause),
                    }
                } else if fullscreen && state == SessionState::Paused {
                    WatchdogOutcome {
                        violation: None,
                        request: Some(StateRequest::Resume),
                    }
                } else {
                    WatchdogOutcome::none()
                }
            }
        }
    }
}
