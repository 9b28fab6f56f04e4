use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Deductions applied to the human score when a flag is raised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScorePenalties {
    pub bot: u8,
    pub paste: u8,
    pub no_backspace: u8,
    pub cadence: u8,
}

impl Default for ScorePenalties {
    fn default() -> Self {
        Self {
            bot: 30,
            paste: 20,
            no_backspace: 15,
            cadence: 35,
        }
    }
}

/// Trust-score deductions per counted violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrustPenalties {
    pub tab_hidden: u8,
    pub window_blur: u8,
    pub throttled: u8,
    pub external_paste: u8,
    pub fullscreen_exit: u8,
    pub bot_speed: u8,
}

impl Default for TrustPenalties {
    fn default() -> Self {
        Self {
            tab_hidden: 15,
            window_blur: 10,
            throttled: 15,
            external_paste: 20,
            fullscreen_exit: 10,
            bot_speed: 50,
        }
    }
}

/// Every tunable threshold the monitoring engine uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    /// Counted strikes that terminate the session.
    pub max_strikes: u32,
    /// Minimum trust score accepted at submission.
    pub trust_floor: u8,
    /// Exam clock in seconds; `None` for untimed sessions.
    pub exam_duration_secs: Option<f64>,
    /// Sustained WPM above this is flagged as bot typing.
    pub wpm_ceiling: f64,
    /// Chars required before the speed/cadence flags are meaningful.
    pub min_chars_for_speed_flag: usize,
    /// Average paste size above this raises the large-paste flag.
    pub avg_paste_size_threshold: f64,
    /// Chars without a single backspace that look suspicious.
    pub zero_backspace_char_threshold: usize,
    /// Inter-key std deviation (ms) below this reads as scripted input.
    pub cadence_variance_floor_ms: f64,
    /// Inter-key gaps at or above this are thinking time, not rhythm.
    pub latency_cap_ms: u64,
    /// Minimum spacing between two counted strikes.
    pub strike_debounce_ms: u64,
    /// How long an internal copy whitelists a subsequent paste.
    pub clipboard_ttl_ms: u64,
    /// Heartbeat gap that implies background throttling.
    pub heartbeat_stall_ms: u64,
    pub score_penalties: ScorePenalties,
    pub trust_penalties: TrustPenalties,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_strikes: 3,
            trust_floor: 70,
            exam_duration_secs: Some(3600.0),
            wpm_ceiling: 150.0,
            min_chars_for_speed_flag: 50,
            avg_paste_size_threshold: 50.0,
            zero_backspace_char_threshold: 100,
            cadence_variance_floor_ms: 10.0,
            latency_cap_ms: 2000,
            strike_debounce_ms: 1000,
            clipboard_ttl_ms: 800,
            heartbeat_stall_ms: 1200,
            score_penalties: ScorePenalties::default(),
            trust_penalties: TrustPenalties::default(),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> MonitorConfig;
    fn save(&self, cfg: &MonitorConfig) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "invigil") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("invigil_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> MonitorConfig {
        if let Ok(bytes) = fs::read(&self.path) {
            if let Ok(cfg) = serde_json::from_slice::<MonitorConfig>(&bytes) {
                return cfg;
            }
        }
        MonitorConfig::default()
    }

    fn save(&self, cfg: &MonitorConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = MonitorConfig::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = MonitorConfig {
            max_strikes: 5,
            trust_floor: 50,
            exam_duration_secs: None,
            wpm_ceiling: 200.0,
            strike_debounce_ms: 500,
            ..MonitorConfig::default()
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn load_missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("nope.json"));
        assert_eq!(store.load(), MonitorConfig::default());
    }

    #[test]
    fn default_matches_published_constants() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.max_strikes, 3);
        assert_eq!(cfg.trust_floor, 70);
        assert_eq!(cfg.wpm_ceiling, 150.0);
        assert_eq!(cfg.avg_paste_size_threshold, 50.0);
        assert_eq!(cfg.zero_backspace_char_threshold, 100);
        assert_eq!(cfg.cadence_variance_floor_ms, 10.0);
        assert_eq!(cfg.strike_debounce_ms, 1000);
        assert_eq!(cfg.clipboard_ttl_ms, 800);
        assert_eq!(cfg.score_penalties, ScorePenalties::default());
    }
}
