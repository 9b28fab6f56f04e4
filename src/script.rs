use crate::analyzer::KeyPress;
use crate::runtime::{MonitorEvent, UserAction};
use crate::session::EditorSignal;
use crate::watchdog::BrowserSignal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::io::BufRead;
use std::time::{Duration, SystemTime};

/// One telemetry or action record in a replay script. Timestamps are
/// milliseconds from session start so scripts stay deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Key { key: String },
    Copy { within_editor: bool },
    Cut { within_editor: bool },
    Paste { text: String, within_editor: bool },
    Visibility { hidden: bool },
    Blur { document_hidden: bool },
    Fullscreen { fullscreen: bool },
    Heartbeat,
    Identity { address: Option<String> },
    Start,
    Pledge,
    Submit,
    Resume,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: ScriptEvent,
}

#[derive(Debug)]
pub enum ScriptError {
    Io(std::io::Error),
    Parse { line: usize, source: serde_json::Error },
    BadKey { line: usize, key: String },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Io(err) => write!(f, "script read failed: {}", err),
            ScriptError::Parse { line, source } => {
                write!(f, "script line {}: {}", line, source)
            }
            ScriptError::BadKey { line, key } => {
                write!(
                    f,
                    "script line {}: key {:?} is neither a single char nor \"Backspace\"",
                    line, key
                )
            }
        }
    }
}

impl Error for ScriptError {}

impl From<std::io::Error> for ScriptError {
    fn from(err: std::io::Error) -> Self {
        ScriptError::Io(err)
    }
}

/// Parse a JSON-lines script; blank lines and `#` comments are skipped.
pub fn parse_script<R: BufRead>(reader: R) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(trimmed).map_err(|source| {
            ScriptError::Parse {
                line: idx + 1,
                source,
            }
        })?;
        steps.push(step);
    }
    Ok(steps)
}

impl ScriptStep {
    /// Resolve this step against a base wall-clock instant.
    pub fn to_monitor_event(&self, base: SystemTime) -> Result<MonitorEvent, ScriptError> {
        let at = base + Duration::from_millis(self.at_ms);
        let event = match &self.event {
            ScriptEvent::Key { key } => MonitorEvent::Editor(EditorSignal::Key {
                key: parse_key(key).ok_or_else(|| ScriptError::BadKey {
                    line: 0,
                    key: key.clone(),
                })?,
                at,
            }),
            ScriptEvent::Copy { within_editor } => MonitorEvent::Editor(EditorSignal::Copy {
                within_editor: *within_editor,
                at,
            }),
            ScriptEvent::Cut { within_editor } => MonitorEvent::Editor(EditorSignal::Cut {
                within_editor: *within_editor,
                at,
            }),
            ScriptEvent::Paste {
                text,
                within_editor,
            } => MonitorEvent::Editor(EditorSignal::Paste {
                text: text.clone(),
                within_editor: *within_editor,
                at,
            }),
            ScriptEvent::Visibility { hidden } => {
                MonitorEvent::Browser(BrowserSignal::VisibilityChanged {
                    hidden: *hidden,
                    at,
                })
            }
            ScriptEvent::Blur { document_hidden } => {
                MonitorEvent::Browser(BrowserSignal::WindowBlur {
                    document_hidden: *document_hidden,
                    at,
                })
            }
            ScriptEvent::Fullscreen { fullscreen } => {
                MonitorEvent::Browser(BrowserSignal::FullscreenChanged {
                    fullscreen: *fullscreen,
                    at,
                })
            }
            ScriptEvent::Heartbeat => MonitorEvent::Browser(BrowserSignal::HeartbeatTick { at }),
            ScriptEvent::Identity { address } => MonitorEvent::Action {
                action: UserAction::Identity(address.clone()),
                at,
            },
            ScriptEvent::Start => MonitorEvent::Action {
                action: UserAction::Start,
                at,
            },
            ScriptEvent::Pledge => MonitorEvent::Action {
                action: UserAction::Pledge,
                at,
            },
            ScriptEvent::Submit => MonitorEvent::Action {
                action: UserAction::Submit,
                at,
            },
            ScriptEvent::Resume => MonitorEvent::Action {
                action: UserAction::Resume,
                at,
            },
            ScriptEvent::Retry => MonitorEvent::Action {
                action: UserAction::Retry,
                at,
            },
        };
        Ok(event)
    }
}

fn parse_key(key: &str) -> Option<KeyPress> {
    if key == "Backspace" {
        return Some(KeyPress::Backspace);
    }
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(KeyPress::Char(c)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_json_lines_with_comments() {
        let script = r#"
# replay of a clean session
{"at_ms": 0, "event": "identity", "address": "ADDR1"}
{"at_ms": 10, "event": "start"}

{"at_ms": 20, "event": "pledge"}
{"at_ms": 100, "event": "key", "key": "a"}
{"at_ms": 5000, "event": "submit"}
"#;
        let steps = parse_script(Cursor::new(script)).unwrap();
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[0].at_ms, 0);
        assert_eq!(
            steps[3].event,
            ScriptEvent::Key {
                key: "a".to_string()
            }
        );
    }

    #[test]
    fn rejects_malformed_lines_with_position() {
        let script = "{\"at_ms\": 0, \"event\": \"start\"}\nnot json\n";
        let err = parse_script(Cursor::new(script)).unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 2, .. }));
    }

    #[test]
    fn key_parsing_accepts_char_and_backspace() {
        assert_eq!(parse_key("x"), Some(KeyPress::Char('x')));
        assert_eq!(parse_key("Backspace"), Some(KeyPress::Backspace));
        assert_eq!(parse_key("Shift"), None);
        assert_eq!(parse_key(""), None);
    }

    #[test]
    fn steps_resolve_against_base_time() {
        let step = ScriptStep {
            at_ms: 250,
            event: ScriptEvent::Heartbeat,
        };
        let base = SystemTime::UNIX_EPOCH;
        match step.to_monitor_event(base).unwrap() {
            MonitorEvent::Browser(BrowserSignal::HeartbeatTick { at }) => {
                assert_eq!(at, base + Duration::from_millis(250));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn bad_key_surfaces_an_error() {
        let step = ScriptStep {
            at_ms: 0,
            event: ScriptEvent::Key {
                key: "Enter".to_string(),
            },
        };
        assert!(step.to_monitor_event(SystemTime::UNIX_EPOCH).is_err());
    }

    #[test]
    fn script_events_roundtrip_through_serde() {
        let step = ScriptStep {
            at_ms: 42,
            event: ScriptEvent::Paste {
                text: "x = 1".to_string(),
                within_editor: true,
            },
        };
        let json = serde_json::to_string(&step).unwrap();
        let back: ScriptStep = serde_json::from_str(&json).unwrap();
        assert_eq!(step, back);
    }
}
