use crate::analyzer::{HumanScore, KeyPress, KeystrokeAnalyzer};
use crate::clipboard::{ClipboardGuard, PasteClass};
use crate::config::MonitorConfig;
use crate::grading::{fallback_report, GradeReport, GradingService};
use crate::util::time_diff_ms;
use crate::violation::{RecordOutcome, StrikeLedger, ViolationEvent, ViolationKind};
use crate::watchdog::{BrowserSignal, FocusWatchdog, StateRequest};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Session lifecycle. `Terminated` is terminal; `Graded` is terminal once
/// the grade is a pass.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Locked,
    Enrolling,
    Active,
    Paused,
    Submitting,
    Graded,
    Terminated,
}

/// Editor-surface events: per-interaction keys and the raw clipboard events
/// captured at the outermost listening scope.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorSignal {
    Key {
        key: KeyPress,
        at: SystemTime,
    },
    Copy {
        within_editor: bool,
        at: SystemTime,
    },
    Cut {
        within_editor: bool,
        at: SystemTime,
    },
    Paste {
        text: String,
        within_editor: bool,
        at: SystemTime,
    },
}

/// Fullscreen collaborator. The browser's request promise collapses to a
/// synchronous grant/deny here; a denial is survivable at `start()` but
/// blocks `resume()`.
pub trait ScreenPort {
    fn request_fullscreen(&mut self) -> bool;
    fn exit_fullscreen(&mut self);
    fn is_fullscreen(&self) -> bool;
}

/// Screen that always grants fullscreen; used by the replay binary.
#[derive(Debug, Default)]
pub struct GrantedScreen {
    fullscreen: bool,
}

impl ScreenPort for GrantedScreen {
    fn request_fullscreen(&mut self) -> bool {
        self.fullscreen = true;
        true
    }

    fn exit_fullscreen(&mut self) {
        self.fullscreen = false;
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
}

/// Read-only view pushed to subscribers after every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub trust_score: u8,
    pub strike_count: u32,
    pub is_locked: bool,
    pub seconds_remaining: Option<f64>,
}

type Subscriber = Box<dyn FnMut(&SessionSnapshot)>;

/// The state machine reconciling watchdog, clipboard, and analyzer signals
/// into strikes, a trust score, and lifecycle transitions. Sole owner and
/// mutator of all per-session integrity state.
pub struct IntegritySessionController {
    config: MonitorConfig,
    state: SessionState,
    analyzer: KeystrokeAnalyzer,
    clipboard: ClipboardGuard,
    watchdog: FocusWatchdog,
    ledger: StrikeLedger,
    trust_score: u8,
    violation_log: Vec<String>,
    violations: Vec<ViolationEvent>,
    identity: Option<String>,
    question: String,
    code: String,
    initial_code: String,
    grade: Option<GradeReport>,
    seconds_remaining: Option<f64>,
    last_clock_tick: Option<SystemTime>,
    grader: Box<dyn GradingService>,
    screen: Box<dyn ScreenPort>,
    subscribers: Vec<Subscriber>,
}

impl IntegritySessionController {
    pub fn new(
        config: MonitorConfig,
        question: impl Into<String>,
        initial_code: impl Into<String>,
        grader: Box<dyn GradingService>,
        screen: Box<dyn ScreenPort>,
        created_at: SystemTime,
    ) -> Self {
        let initial_code = initial_code.into();
        let analyzer = KeystrokeAnalyzer::new(created_at, config.clone());
        let clipboard = ClipboardGuard::new(config.clipboard_ttl_ms);
        let watchdog = FocusWatchdog::new(config.heartbeat_stall_ms);
        let ledger = StrikeLedger::new(config.max_strikes);
        let seconds_remaining = config.exam_duration_secs;
        Self {
            config,
            state: SessionState::Locked,
            analyzer,
            clipboard,
            watchdog,
            ledger,
            trust_score: 100,
            violation_log: Vec::new(),
            violations: Vec::new(),
            identity: None,
            question: question.into(),
            code: initial_code.clone(),
            initial_code,
            grade: None,
            seconds_remaining,
            last_clock_tick: None,
            grader,
            screen,
            subscribers: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Observer interface
    // ------------------------------------------------------------------

    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            trust_score: self.trust_score,
            strike_count: self.ledger.count(),
            is_locked: self.is_locked(),
            seconds_remaining: self.seconds_remaining,
        }
    }

    fn notify(&mut self) {
        let snapshot = self.snapshot();
        for subscriber in &mut self.subscribers {
            subscriber(&snapshot);
        }
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// `Locked -> Enrolling`. Requests fullscreen; a denial is logged and
    /// the session continues without it.
    pub fn start(&mut self, now: SystemTime) -> bool {
        if self.state != SessionState::Locked {
            return false;
        }
        if !self.screen.request_fullscreen() {
            self.log_line(now, "fullscreen unavailable; continuing without".to_string());
        }
        self.state = SessionState::Enrolling;
        self.notify();
        true
    }

    /// `Enrolling -> Active` once an identity is present. Resets the
    /// analyzer, strike ledger, and trust score for a fresh measurement.
    pub fn pledge(&mut self, now: SystemTime) -> bool {
        if self.state != SessionState::Enrolling {
            return false;
        }
        if self.identity.is_none() {
            self.log_line(now, "pledge refused: no identity connected".to_string());
            self.notify();
            return false;
        }
        self.analyzer.reset(now);
        self.clipboard.reset();
        self.ledger = StrikeLedger::new(self.config.max_strikes);
        self.trust_score = 100;
        self.violations.clear();
        self.seconds_remaining = self.config.exam_duration_secs;
        self.enter_active(now);
        self.notify();
        true
    }

    /// Gate the submission on identity and the trust floor, then grade.
    /// A second `submit()` while one is in flight is a no-op, as is any
    /// submit from a state that cannot submit.
    pub fn submit(&mut self, now: SystemTime) {
        match self.state {
            SessionState::Active | SessionState::Paused => {}
            _ => return,
        }

        if self.identity.is_none() {
            self.terminate(now, "identity disconnected at submission".to_string());
            return;
        }

        // Bot-speed typing is an incremental violation surfaced at grading
        // time, applied before the trust gate is evaluated.
        let score = self.analyzer.compute_score(now);
        if score.flags.bot_typing_speed {
            self.record_violation(
                ViolationKind::BotSpeed,
                now,
                format!("{:.0} WPM sustained at submission", score.stats.wpm),
            );
            if self.state == SessionState::Terminated {
                self.notify();
                return;
            }
        }

        if self.trust_score < self.config.trust_floor {
            self.terminate(
                now,
                format!(
                    "trust score {} below floor {}",
                    self.trust_score, self.config.trust_floor
                ),
            );
            return;
        }

        self.leave_active();
        self.state = SessionState::Submitting;
        self.notify();

        let report = match self.grader.grade(&self.question, &self.code) {
            Ok(report) => report,
            Err(err) => {
                self.log_line(now, format!("GRADING FALLBACK: {}", err));
                fallback_report()
            }
        };
        self.log_line(
            now,
            format!(
                "graded: {} score {}{}",
                if report.passed { "passed" } else { "failed" },
                report.score,
                if report.degraded { " (degraded)" } else { "" }
            ),
        );
        self.grade = Some(report);
        self.state = SessionState::Graded;
        self.notify();
    }

    /// `Paused -> Active`, only once fullscreen is re-acquired.
    pub fn resume(&mut self, now: SystemTime) -> bool {
        if self.state != SessionState::Paused {
            return false;
        }
        if !self.screen.request_fullscreen() {
            self.log_line(now, "resume refused: fullscreen denied".to_string());
            self.notify();
            return false;
        }
        self.enter_active(now);
        self.log_line(now, "session resumed".to_string());
        self.notify();
        true
    }

    /// `Graded(failed) -> Active`. Resets the code buffer only; strikes and
    /// trust score persist across the retry.
    pub fn retry(&mut self, now: SystemTime) -> bool {
        let failed = matches!(&self.grade, Some(report) if !report.passed);
        if self.state != SessionState::Graded || !failed {
            return false;
        }
        self.code = self.initial_code.clone();
        self.grade = None;
        self.enter_active(now);
        self.log_line(now, "retry started; strikes and trust carry over".to_string());
        self.notify();
        true
    }

    /// Identity signal from the wallet/identity collaborator. A transition
    /// to `None` mid-session terminates immediately.
    pub fn set_identity(&mut self, identity: Option<String>, now: SystemTime) {
        let lost = identity.is_none() && self.identity.is_some();
        self.identity = identity;
        if lost
            && matches!(
                self.state,
                SessionState::Active | SessionState::Paused | SessionState::Submitting
            )
        {
            self.terminate(now, "identity disconnected".to_string());
            return;
        }
        self.notify();
    }

    // ------------------------------------------------------------------
    // Signal intake
    // ------------------------------------------------------------------

    /// Editor interactions feed the analyzer and the clipboard guard.
    /// Ignored outside `Active`; a paused or terminated session accrues
    /// nothing.
    pub fn handle_editor(&mut self, signal: EditorSignal) {
        if self.state != SessionState::Active {
            return;
        }
        match signal {
            EditorSignal::Key { key, at } => {
                self.analyzer.log_keystroke(key, at);
                match key {
                    KeyPress::Char(c) => self.code.push(c),
                    KeyPress::Backspace => {
                        self.code.pop();
                    }
                }
            }
            EditorSignal::Copy { within_editor, at } | EditorSignal::Cut { within_editor, at } => {
                if within_editor {
                    self.clipboard.arm_internal_copy(at);
                }
            }
            EditorSignal::Paste {
                text,
                within_editor,
                at,
            } => match self.clipboard.classify_paste(within_editor, at) {
                PasteClass::Ignored => {}
                PasteClass::Internal => {
                    self.analyzer.log_paste(text.len(), at);
                    self.code.push_str(&text);
                }
                PasteClass::External => {
                    // the paste itself is blocked; only the violation lands
                    self.record_violation(
                        ViolationKind::ExternalPaste,
                        at,
                        format!("blocked external paste ({} chars)", text.len()),
                    );
                }
            },
        }
        self.notify();
    }

    /// Browser signals route through the watchdog; its verdicts drive the
    /// strike ledger and pause/resume transitions. Heartbeats also advance
    /// the exam clock.
    pub fn handle_browser(&mut self, signal: BrowserSignal) {
        let outcome = self.watchdog.observe(&signal, self.state);

        if let Some((kind, at, detail)) = outcome.violation {
            self.record_violation(kind, at, detail);
        }

        match outcome.request {
            Some(StateRequest::Pause) if self.state == SessionState::Active => {
                self.leave_active();
                self.state = SessionState::Paused;
                self.log_line(signal.at(), "session paused".to_string());
            }
            Some(StateRequest::Resume) if self.state == SessionState::Paused => {
                self.enter_active(signal.at());
                self.log_line(signal.at(), "fullscreen re-entered; session resumed".to_string());
            }
            _ => {}
        }

        if let BrowserSignal::HeartbeatTick { at } = signal {
            if self.state == SessionState::Active {
                self.advance_clock(at);
            }
        }

        self.notify();
    }

    fn advance_clock(&mut self, at: SystemTime) {
        let elapsed_ms = self
            .last_clock_tick
            .map(|last| time_diff_ms(last, at))
            .unwrap_or(0);
        self.last_clock_tick = Some(at);
        if let Some(remaining) = self.seconds_remaining.as_mut() {
            *remaining -= elapsed_ms as f64 / 1000.0;
            if *remaining <= 0.0 {
                *remaining = 0.0;
                self.log_line(at, "exam time expired; submitting".to_string());
                self.submit(at);
            }
        }
    }

    // ------------------------------------------------------------------
    // Strikes & transitions
    // ------------------------------------------------------------------

    fn record_violation(&mut self, kind: ViolationKind, at: SystemTime, detail: String) {
        if self.state == SessionState::Terminated {
            // observed, never counted; the ledger froze with the session
            self.log_line(at, format!("{} observed after termination", kind));
            return;
        }

        let penalty = kind.penalty(&self.config.trust_penalties);
        match self.ledger.record(at, self.config.strike_debounce_ms) {
            RecordOutcome::Counted(count) => {
                self.trust_score = self.trust_score.saturating_sub(penalty);
                self.violations.push(ViolationEvent {
                    kind,
                    timestamp: at,
                    penalty,
                    detail: detail.clone(),
                });
                // count is read at the moment of the increment, so the
                // logged strike number can never lag the ledger
                self.log_line(
                    at,
                    format!(
                        "VIOLATION: {} {} (-{}%) [strike {}/{}]",
                        kind,
                        detail,
                        penalty,
                        count,
                        self.ledger.max_strikes()
                    ),
                );
                if self.ledger.is_frozen() {
                    self.terminate(at, "strike limit reached".to_string());
                }
            }
            RecordOutcome::Debounced => {
                self.log_line(at, format!("{} {} (debounced)", kind, detail));
            }
            RecordOutcome::Frozen => {
                self.log_line(at, format!("{} {} (ledger frozen)", kind, detail));
            }
        }
    }

    fn enter_active(&mut self, now: SystemTime) {
        self.state = SessionState::Active;
        self.watchdog.arm(now);
        self.last_clock_tick = Some(now);
    }

    /// Teardown on every exit from `Active`: the watchdog (and with it the
    /// heartbeat baseline) must never outlive the state that owns it.
    fn leave_active(&mut self) {
        self.watchdog.disarm();
        self.last_clock_tick = None;
    }

    fn terminate(&mut self, now: SystemTime, reason: String) {
        self.leave_active();
        self.state = SessionState::Terminated;
        self.log_line(now, format!("TERMINATED: {}", reason));
        self.notify();
    }

    fn log_line(&mut self, at: SystemTime, message: String) {
        let stamp: DateTime<Local> = at.into();
        self.violation_log
            .insert(0, format!("[{}] {}", stamp.format("%H:%M:%S"), message));
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn session_state(&self) -> SessionState {
        self.state
    }

    pub fn trust_score(&self) -> u8 {
        self.trust_score
    }

    pub fn strike_count(&self) -> u32 {
        self.ledger.count()
    }

    pub fn max_strikes(&self) -> u32 {
        self.ledger.max_strikes()
    }

    pub fn is_locked(&self) -> bool {
        self.ledger.is_frozen() || self.state == SessionState::Terminated
    }

    /// Ordered newest-first, human readable.
    pub fn violation_log(&self) -> &[String] {
        &self.violation_log
    }

    /// Counted strikes in arrival order.
    pub fn violations(&self) -> &[ViolationEvent] {
        &self.violations
    }

    pub fn human_score(&self, now: SystemTime) -> HumanScore {
        self.analyzer.compute_score(now)
    }

    pub fn analyzer(&self) -> &KeystrokeAnalyzer {
        &self.analyzer
    }

    pub fn grade(&self) -> Option<&GradeReport> {
        self.grade.as_ref()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn seconds_remaining(&self) -> Option<f64> {
        self.seconds_remaining
    }

    /// True while the heartbeat scheduler should be running; the scheduler
    /// is scoped to `Active` and must be stopped on every exit path.
    pub fn wants_heartbeat(&self) -> bool {
        self.state == SessionState::Active
    }
}
