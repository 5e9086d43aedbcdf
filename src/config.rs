// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::transport::SessionOptions;

const APP_DIR: &str = "ignition-link";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Link to the ignition controller.
    pub link: LinkConfig,

    /// Call gating.
    pub call_gate: CallGateConfig,

    /// Logging.
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Bluetooth address of the controller.
    pub peer_address: String,

    /// RFCOMM channel tried when service record negotiation fails.
    pub fallback_channel: u8,

    /// Handshake timeout per connection strategy, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Delay before the automatic STATUS query after connecting.
    /// Zero disables the query.
    pub status_query_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            peer_address: "00:23:10:01:24:19".to_string(),
            fallback_channel: 1,
            connect_timeout_ms: 10_000,
            status_query_delay_ms: 1_000,
        }
    }
}

impl LinkConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            fallback_channel: self.fallback_channel,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn status_query_delay(&self) -> Duration {
        Duration::from_millis(self.status_query_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallGateConfig {
    /// Reject ringing calls while the engine is on.
    pub enabled: bool,
}

impl Default for CallGateConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "ignition_link=info".to_string(),
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from the default location, creating it on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from a file or create it with defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
