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

//! Call gating on engine state.
//!
//! The gate only reads the cached engine state; it never talks to the
//! peer, so a ringing event is decided without waiting on any I/O.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CallGateError;
use crate::state::{EngineState, EngineStateCell};

/// Host capability that ends the active call.
pub trait CallTerminator: Send + Sync {
    /// Backend name, for logs.
    fn backend_name(&self) -> &'static str;

    /// End or reject the call that is currently ringing.
    fn terminate_active_call(&self) -> Result<(), CallGateError>;
}

/// Terminator for hosts without telephony control.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedTerminator;

impl CallTerminator for UnsupportedTerminator {
    fn backend_name(&self) -> &'static str {
        "unsupported"
    }

    fn terminate_active_call(&self) -> Result<(), CallGateError> {
        Err(CallGateError::Unavailable(
            "host has no call control".to_string(),
        ))
    }
}

/// Outcome of a ringing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The call proceeds to the user.
    Allowed(EngineState),
    /// The call was terminated.
    Rejected,
    /// Termination was attempted but not possible; the call proceeds.
    RejectFailed(CallGateError),
}

/// Decides whether to suppress incoming calls.
pub struct CallGate {
    state: Arc<EngineStateCell>,
    terminator: Arc<dyn CallTerminator>,
    enabled: bool,
}

impl CallGate {
    pub fn new(state: Arc<EngineStateCell>, terminator: Arc<dyn CallTerminator>) -> Self {
        Self {
            state,
            terminator,
            enabled: true,
        }
    }

    /// Enable or disable rejection.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        info!("Call gate {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Handle a "call is ringing" event from the host.
    pub fn on_call_ringing(&self) -> GateDecision {
        let state = self.state.get();
        debug!("Incoming call detected. Engine state: {}", state);

        if !self.enabled || state != EngineState::On {
            info!("Call allowed (engine {})", state);
            return GateDecision::Allowed(state);
        }

        match self.terminator.terminate_active_call() {
            Ok(()) => {
                info!(
                    "Call rejected via {} (engine ON)",
                    self.terminator.backend_name()
                );
                GateDecision::Rejected
            }
            Err(e) => {
                warn!("Cannot reject call: {}", e);
                GateDecision::RejectFailed(e)
            }
        }
    }
}
