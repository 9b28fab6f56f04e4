use crate::analyzer::HumanScore;
use crate::grading::GradeReport;
use crate::session::{IntegritySessionController, SessionState};
use crate::util::time_diff_ms;
use chrono::{DateTime, Local};
use directories::ProjectDirs;
use itertools::Itertools;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Everything worth keeping about one finished session. Violations travel
/// with the report so downstream credential metadata can audit them; nothing
/// is persisted across sessions beyond the summary row.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub finished_at: DateTime<Local>,
    pub duration_secs: f64,
    pub final_state: SessionState,
    pub trust_score: u8,
    pub strikes: u32,
    pub max_strikes: u32,
    pub human_score: HumanScore,
    pub grade: Option<GradeReport>,
    /// Human-readable audit trail, newest first.
    pub violations: Vec<String>,
}

impl SessionReport {
    pub fn from_controller(controller: &IntegritySessionController, now: SystemTime) -> Self {
        let started = controller.analyzer().session_start();
        Self {
            finished_at: now.into(),
            duration_secs: time_diff_ms(started, now) as f64 / 1000.0,
            final_state: controller.session_state(),
            trust_score: controller.trust_score(),
            strikes: controller.strike_count(),
            max_strikes: controller.max_strikes(),
            human_score: controller.human_score(now),
            grade: controller.grade().cloned(),
            violations: controller.violation_log().to_vec(),
        }
    }

    /// One-line summary for terminal output.
    pub fn summary_line(&self) -> String {
        let flags = self.human_score.flags.active();
        let flags = if flags.is_empty() {
            "none".to_string()
        } else {
            flags.into_iter().join("+")
        };
        format!(
            "{} | trust {}% | strikes {}/{} | human score {} (flags: {}) | grade {}",
            self.final_state,
            self.trust_score,
            self.strikes,
            self.max_strikes,
            self.human_score.score,
            flags,
            self.grade
                .as_ref()
                .map(|g| format!(
                    "{} {}{}",
                    if g.passed { "PASS" } else { "FAIL" },
                    g.score,
                    if g.degraded { " (degraded)" } else { "" }
                ))
                .unwrap_or_else(|| "-".to_string()),
        )
    }

    /// Append a summary row to `log.csv`, emitting a header on first write.
    /// Pass `dir` to override the default project directory.
    pub fn append_csv_summary(&self, dir: Option<&Path>) -> io::Result<PathBuf> {
        let log_dir = match dir {
            Some(d) => d.to_path_buf(),
            None => ProjectDirs::from("", "", "invigil")
                .map(|pd| pd.config_dir().to_path_buf())
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "no project directory available")
                })?,
        };
        std::fs::create_dir_all(&log_dir)?;
        let log_path = log_dir.join("log.csv");

        let needs_header = !log_path.exists();
        let file = OpenOptions::new().append(true).create(true).open(&log_path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer
                .write_record([
                    "date",
                    "duration_secs",
                    "final_state",
                    "trust_score",
                    "strikes",
                    "human_score",
                    "flags",
                    "grade_score",
                    "passed",
                    "degraded",
                ])
                .map_err(csv_to_io)?;
        }

        let flags = self.human_score.flags.active().into_iter().join("+");
        writer
            .write_record([
                self.finished_at.format("%c").to_string(),
                format!("{:.2}", self.duration_secs),
                self.final_state.to_string(),
                self.trust_score.to_string(),
                self.strikes.to_string(),
                self.human_score.score.to_string(),
                flags,
                self.grade
                    .as_ref()
                    .map(|g| g.score.to_string())
                    .unwrap_or_default(),
                self.grade
                    .as_ref()
                    .map(|g| g.passed.to_string())
                    .unwrap_or_default(),
                self.grade
                    .as_ref()
                    .map(|g| g.degraded.to_string())
                    .unwrap_or_default(),
            ])
            .map_err(csv_to_io)?;
        writer.flush()?;

        Ok(log_path)
    }

    /// Full report, pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        let data = serde_json::to_vec_pretty(self).map_err(io::Error::from)?;
        std::fs::write(path, data)
    }
}

fn csv_to_io(err: csv::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}
