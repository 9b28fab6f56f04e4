use crate::config::MonitorConfig;
use crate::util::{std_dev, time_diff_ms};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A single editor key interaction as reported by the editor surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Char(char),
    Backspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystrokeKind {
    Key,
    Backspace,
    Paste,
}

/// Immutable once logged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeystrokeEvent {
    pub timestamp: SystemTime,
    pub kind: KeystrokeKind,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFlags {
    pub bot_typing_speed: bool,
    pub large_paste: bool,
    pub zero_backspace: bool,
    pub perfect_cadence: bool,
}

impl ScoreFlags {
    pub fn any(&self) -> bool {
        self.bot_typing_speed || self.large_paste || self.zero_backspace || self.perfect_cadence
    }

    /// Names of the raised flags, for log lines and the session report.
    pub fn active(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.bot_typing_speed {
            names.push("bot_typing_speed");
        }
        if self.large_paste {
            names.push("large_paste");
        }
        if self.zero_backspace {
            names.push("zero_backspace");
        }
        if self.perfect_cadence {
            names.push("perfect_cadence");
        }
        names
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub wpm: f64,
    pub backspace_ratio: f64,
    pub paste_count: usize,
    pub variance: f64,
}

/// Humanity estimate derived from the accumulated counters. This is a live
/// read, not a cached snapshot: with no new events the WPM still drifts as
/// elapsed time advances, so two calls with different `now` values may
/// legitimately disagree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumanScore {
    pub score: u8,
    pub flags: ScoreFlags,
    pub stats: ScoreStats,
}

/// Pure aggregator over the typing/paste event stream. No I/O, no timers of
/// its own; every operation takes the wall-clock timestamp of the underlying
/// browser event.
#[derive(Debug)]
pub struct KeystrokeAnalyzer {
    config: MonitorConfig,
    events: Vec<KeystrokeEvent>,
    session_start: SystemTime,
    last_key_time: Option<SystemTime>,
    char_count: usize,
    backspace_count: usize,
    paste_count: usize,
    latencies_ms: Vec<f64>,
}

impl KeystrokeAnalyzer {
    pub fn new(session_start: SystemTime, config: MonitorConfig) -> Self {
        Self {
            config,
            events: Vec::new(),
            session_start,
            last_key_time: None,
            char_count: 0,
            backspace_count: 0,
            paste_count: 0,
            latencies_ms: Vec::new(),
        }
    }

    /// Clear all counters and restart the session clock.
    pub fn reset(&mut self, session_start: SystemTime) {
        self.events.clear();
        self.session_start = session_start;
        self.last_key_time = None;
        self.char_count = 0;
        self.backspace_count = 0;
        self.paste_count = 0;
        self.latencies_ms.clear();
    }

    pub fn log_keystroke(&mut self, key: KeyPress, now: SystemTime) {
        // Inter-key gap, retained only below the cap; longer gaps are
        // thinking time and would skew the cadence variance.
        if let Some(last) = self.last_key_time {
            let gap = time_diff_ms(last, now);
            if gap < self.config.latency_cap_ms {
                self.latencies_ms.push(gap as f64);
            }
        }

        let kind = match key {
            KeyPress::Backspace => {
                self.backspace_count += 1;
                KeystrokeKind::Backspace
            }
            KeyPress::Char(_) => {
                self.char_count += 1;
                KeystrokeKind::Key
            }
        };

        self.events.push(KeystrokeEvent {
            timestamp: now,
            kind,
            length: 1,
        });
        self.last_key_time = Some(now);
    }

    /// Pasted volume counts toward throughput even though it is separately
    /// penalized: WPM reflects total content produced while the paste flags
    /// penalize provenance.
    pub fn log_paste(&mut self, length: usize, now: SystemTime) {
        self.events.push(KeystrokeEvent {
            timestamp: now,
            kind: KeystrokeKind::Paste,
            length,
        });
        self.paste_count += 1;
        self.char_count += length;
    }

    /// Recompute the humanity estimate from the current counters and `now`.
    /// Deterministic for a fixed `now`; nothing is cached.
    pub fn compute_score(&self, now: SystemTime) -> HumanScore {
        let cfg = &self.config;
        let elapsed_minutes = time_diff_ms(self.session_start, now) as f64 / 60_000.0;
        let wpm = if elapsed_minutes > 0.0 {
            (self.char_count as f64 / 5.0) / elapsed_minutes
        } else {
            0.0
        };

        let total_keystrokes = self.char_count + self.backspace_count;
        let backspace_ratio = if total_keystrokes > 0 {
            self.backspace_count as f64 / total_keystrokes as f64
        } else {
            0.0
        };

        let variance = if self.latencies_ms.len() > 1 {
            std_dev(&self.latencies_ms).unwrap_or(0.0)
        } else {
            0.0
        };

        let flags = ScoreFlags {
            bot_typing_speed: wpm > cfg.wpm_ceiling
                && self.char_count > cfg.min_chars_for_speed_flag,
            large_paste: self.paste_count > 0
                && (self.char_count as f64 / self.paste_count as f64)
                    > cfg.avg_paste_size_threshold,
            zero_backspace: self.char_count > cfg.zero_backspace_char_threshold
                && self.backspace_count == 0,
            // cadence needs a real rhythm sample, not just volume; a
            // paste-heavy session with no typing has nothing to measure
            perfect_cadence: self.latencies_ms.len() > cfg.min_chars_for_speed_flag
                && variance < cfg.cadence_variance_floor_ms,
        };

        let mut score: i32 = 100;
        if flags.bot_typing_speed {
            score -= cfg.score_penalties.bot as i32;
        }
        if flags.large_paste {
            score -= cfg.score_penalties.paste as i32;
        }
        if flags.zero_backspace {
            score -= cfg.score_penalties.no_backspace as i32;
        }
        if flags.perfect_cadence {
            score -= cfg.score_penalties.cadence as i32;
        }

        HumanScore {
            score: score.clamp(0, 100) as u8,
            flags,
            stats: ScoreStats {
                wpm,
                backspace_ratio,
                paste_count: self.paste_count,
                variance,
            },
        }
    }

    pub fn events(&self) -> &[KeystrokeEvent] {
        &self.events
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    pub fn backspace_count(&self) -> usize {
        self.backspace_count
    }

    pub fn paste_count(&self) -> usize {
        self.paste_count
    }

    pub fn session_start(&self) -> SystemTime {
        self.session_start
    }
}
