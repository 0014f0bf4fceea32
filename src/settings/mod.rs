//! # Settings
//!
//! User settings that shape dispatch, stored as JSON next to the request
//! database. A missing file means defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::plugins::PluginHook;
use crate::shortcuts::KeyMap;
use crate::storage;

const SETTINGS_FILE: &str = "settings.json";

/// What an interval tick does while an earlier dispatch of the same session
/// is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverlapPolicy {
    /// Ticks run regardless; pipelines may overlap.
    #[default]
    Concurrent,
    /// Ticks that arrive while a dispatch is in flight are dropped.
    SkipWhileBusy,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Directory responses are written to after a send. `None` disables auto-download.
    pub download_path: Option<PathBuf>,
    pub overlap_policy: OverlapPolicy,
    pub disable_user_agent: bool,
    pub request_timeout_ms: Option<u64>,
    pub key_map: KeyMap,
    pub plugins: Vec<PluginHook>,
}

impl Settings {
    pub fn default_path() -> PathBuf {
        storage::data_dir().join(SETTINGS_FILE)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn auto_download(&self) -> bool {
        self.download_path.is_some()
    }

    /// "Download After Send" with `Some(dir)`, "Stop Auto-Download" with `None`.
    pub fn set_download_path(&mut self, path: Option<PathBuf>) {
        self.download_path = path;
    }
}
