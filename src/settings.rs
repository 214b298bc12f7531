use crate::error::Error;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const APP_DIR: &str = "livealert";
const SETTINGS_FILE: &str = "settings.json";

/// Which liveness heuristic the probe uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    /// Fetch the channel page and look for a live-broadcast marker.
    PageKeyword,
    /// Fetch an uptime endpoint; anything not saying "offline" is live.
    UptimeText,
    /// Fetch the live preview thumbnail; a redirect or 404 means offline.
    Thumbnail,
}

impl Default for ProbeStrategy {
    fn default() -> Self {
        ProbeStrategy::PageKeyword
    }
}

impl fmt::Display for ProbeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStrategy::PageKeyword => write!(f, "page-keyword"),
            ProbeStrategy::UptimeText => write!(f, "uptime-text"),
            ProbeStrategy::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

impl ProbeStrategy {
    /// Parse a strategy name (case-insensitive, hyphens or underscores).
    pub fn from_str_loose(s: &str) -> Result<Self, String> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "page-keyword" | "page" => Ok(ProbeStrategy::PageKeyword),
            "uptime-text" | "uptime" => Ok(ProbeStrategy::UptimeText),
            "thumbnail" | "thumb" => Ok(ProbeStrategy::Thumbnail),
            _ => Err(format!(
                "Unknown probe strategy '{}'. Expected: page-keyword, uptime-text, thumbnail",
                s
            )),
        }
    }
}

/// Runtime settings. Every field has a default so partial files load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub poll_interval_secs: u64,
    /// Minimum time between an edge and an offline->live edge that may announce.
    pub cooldown_secs: u64,
    /// Pause between the startup probe and the first cycle.
    pub startup_delay_secs: u64,
    /// Playback volume in (0, 1].
    pub volume: f32,
    pub probe: ProbeStrategy,
    pub page_url: String,
    pub uptime_url: String,
    pub thumbnail_url: String,
    pub page_marker: String,
    pub speech_endpoint: String,
    pub voice: String,
    pub cache_dir: PathBuf,
    pub http_timeout_secs: u64,
    /// Probe all channels concurrently before applying results in order.
    pub parallel_probes: bool,
    /// Hand clips to the audio thread instead of blocking the cycle.
    pub queued_playback: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            poll_interval_secs: 300,
            cooldown_secs: 300,
            startup_delay_secs: 10,
            volume: 0.05,
            probe: ProbeStrategy::default(),
            page_url: "https://www.twitch.tv/{channel}".to_string(),
            uptime_url: "https://decapi.me/twitch/uptime/{channel}".to_string(),
            thumbnail_url: "https://static-cdn.jtvnw.net/previews-ttv/live_user_{channel}-80x45.jpg"
                .to_string(),
            page_marker: "isLiveBroadcast".to_string(),
            speech_endpoint: "https://api.streamelements.com/kappa/v2/speech".to_string(),
            voice: "Brian".to_string(),
            cache_dir: default_cache_dir(),
            http_timeout_secs: 10,
            parallel_probes: false,
            queued_playback: false,
        }
    }
}

impl Settings {
    /// Load settings from JSON, falling back to defaults when the file is
    /// absent or corrupt.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str(&data) {
                    Ok(settings) => return settings,
                    Err(e) => {
                        warn!("corrupt settings file {}, using defaults: {}", path.display(), e)
                    }
                },
                Err(e) => warn!("could not read settings file {}: {}", path.display(), e),
            }
        }
        Settings::default()
    }

    /// Load settings from JSON, failing on any read or parse problem.
    pub fn load_strict(path: &Path) -> Result<Self, Error> {
        let data = fs::read_to_string(path).map_err(|source| Error::ReadSettings {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data)
            .map_err(|e| Error::InvalidSettings(format!("{}: {}", path.display(), e)))
    }

    /// Persist settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let write_err = |source| Error::WriteSettings {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidSettings(e.to_string()))?;
        fs::write(path, json).map_err(write_err)?;
        Ok(())
    }

    /// Reject values the monitor cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.volume > 0.0 && self.volume <= 1.0) {
            return Err(Error::InvalidSettings(format!(
                "volume must be in (0, 1], got {}",
                self.volume
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::InvalidSettings("poll interval must be positive".to_string()));
        }
        if self.cooldown_secs > i64::MAX as u64 / 1000 {
            return Err(Error::InvalidSettings("cooldown is out of range".to_string()));
        }
        if self.probe_template().is_empty() {
            return Err(Error::InvalidSettings(format!("no URL template for {} probe", self.probe)));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(self.cooldown_secs as i64)
    }

    /// URL template for the selected probe strategy.
    pub fn probe_template(&self) -> &str {
        match self.probe {
            ProbeStrategy::PageKeyword => &self.page_url,
            ProbeStrategy::UptimeText => &self.uptime_url,
            ProbeStrategy::Thumbnail => &self.thumbnail_url,
        }
    }
}

/// `<config dir>/livealert/settings.json`, or the working directory when the
/// platform has no config dir.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_default()
        .join(SETTINGS_FILE)
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR).join("clips"))
        .unwrap_or_else(|| PathBuf::from("clips"))
}
