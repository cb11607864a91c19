// Logtriage - GPL-3.0-or-later
// This file is part of Logtriage.
//
// Copyright (C) 2026 Logtriage Authors
//
// Logtriage is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Logtriage is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Logtriage.  If not, see <https://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_extensions() -> Vec<String> {
    vec![".log".into(), ".txt".into(), ".json".into()]
}

fn default_max_depth() -> usize {
    4
}

fn default_context_lines() -> usize {
    5
}

fn default_reasoning_timeout_secs() -> u64 {
    30
}

/// Global user configuration stored in the platform config directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Extensions treated as log files when the CLI does not override them.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Default recursion depth below the root directory.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Lines of source context read around a blamed line.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Sample file heads and drop candidates with no log-shaped content.
    #[serde(default)]
    pub sniff_content: bool,

    /// Root directory searched when resolving source paths from tracebacks.
    /// `None` means the current working directory.
    #[serde(default)]
    pub source_root: Option<PathBuf>,

    /// Reasoning service endpoint. `None` disables explanations and fix
    /// suggestions; everything else still runs.
    #[serde(default)]
    pub reasoning_endpoint: Option<String>,

    #[serde(default = "default_reasoning_timeout_secs")]
    pub reasoning_timeout_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            max_depth: default_max_depth(),
            context_lines: default_context_lines(),
            sniff_content: false,
            source_root: None,
            reasoning_endpoint: None,
            reasoning_timeout_secs: default_reasoning_timeout_secs(),
        }
    }
}

impl GlobalConfig {
    /// Get the path to the global config file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("logtriage").join("config.json"))
    }

    /// Load global config from disk, returning defaults if not found
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                log::info!("Loading global config from {path:?}");
                if let Ok(contents) = std::fs::read_to_string(&path) {
                    if let Ok(config) = serde_json::from_str::<GlobalConfig>(&contents) {
                        return config;
                    }
                }
                log::warn!("Could not parse {path:?}, using defaults");
            } else {
                log::info!("No global config found, using defaults");
            }
        }

        Self::default()
    }

    /// Save global config to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path().ok_or("Could not determine config directory")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {e}"))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {e}"))?;

        std::fs::write(&path, json).map_err(|e| format!("Failed to write config file: {e}"))?;

        log::info!("Saved global config to {path:?}");
        Ok(())
    }

    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GlobalConfig::default();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.context_lines, 5);
        assert!(config.reasoning_endpoint.is_none());
        assert!(config.extensions.contains(&".log".to_string()));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: GlobalConfig = serde_json::from_str(r#"{"max_depth": 2}"#).unwrap();
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.context_lines, 5);
        assert!(!config.sniff_content);
    }

    #[test]
    fn test_round_trip() {
        let mut config = GlobalConfig::default();
        config.reasoning_endpoint = Some("http://localhost:8000/explain".into());
        let json = serde_json::to_string(&config).unwrap();
        let back: GlobalConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.reasoning_endpoint, config.reasoning_endpoint);
    }
}
