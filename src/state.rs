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

//! Shared engine state and link status.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Cached belief about the remote ignition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    On,
    Off,
    #[default]
    Unknown,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::On => "ON",
            EngineState::Off => "OFF",
            EngineState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine state together with the number of transitions applied so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub version: u64,
}

/// Single authoritative engine state cell.
///
/// Shared by handle between the protocol engine (the only writer) and any
/// number of readers such as the call gate or an operator UI.
#[derive(Debug, Default)]
pub struct EngineStateCell {
    inner: RwLock<EngineSnapshot>,
}

impl EngineStateCell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current engine state.
    pub fn get(&self) -> EngineState {
        self.inner.read().state
    }

    /// Current state and version, read atomically.
    pub fn snapshot(&self) -> EngineSnapshot {
        *self.inner.read()
    }

    /// Store a new state reported by the peer.
    ///
    /// Returns the previous state when the value changed, `None` otherwise.
    /// The version only advances on an actual change.
    pub(crate) fn apply(&self, state: EngineState) -> Option<EngineState> {
        let mut guard = self.inner.write();
        if guard.state == state {
            return None;
        }
        let previous = guard.state;
        guard.state = state;
        guard.version += 1;
        Some(previous)
    }
}

/// Status of the transport link to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl LinkStatus {
    pub fn as_str(&self) -> &str {
        match self {
            LinkStatus::Disconnected => "Disconnected",
            LinkStatus::Connecting => "Connecting...",
            LinkStatus::Connected => "Connected",
            LinkStatus::Failed(reason) => reason,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LinkStatus::Connected)
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Failed(reason) => write!(f, "Failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}
