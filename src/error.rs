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

//! Error types for the link and the call gate.

use std::io;
use thiserror::Error;

/// Failures of the transport session and the commands sent over it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// No Bluetooth adapter, or the adapter is powered off.
    #[error("Bluetooth transport not ready")]
    NotReady,
    /// The peer is not a bonded device.
    #[error("device {0} is not paired")]
    NotPaired(String),
    /// Handshake, read or write failed.
    #[error("I/O failure: {0}")]
    IoFailure(String),
    /// Peer hung up or the session was closed locally.
    #[error("connection closed")]
    Closed,
    /// Write attempted without an active connection.
    #[error("not connected")]
    SendFailure,
}

/// Errors returned by `connect`: `NotReady`, `NotPaired` or `IoFailure`.
pub type ConnectError = LinkError;

pub type Result<T, E = LinkError> = std::result::Result<T, E>;

impl From<io::Error> for LinkError {
    fn from(err: io::Error) -> Self {
        LinkError::IoFailure(err.to_string())
    }
}

/// Why the host could not end a ringing call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallGateError {
    /// The host lacks the capability (e.g. missing privileged role).
    #[error("call termination unavailable: {0}")]
    Unavailable(String),
    /// The host tried and failed.
    #[error("call termination failed: {0}")]
    Failed(String),
}
