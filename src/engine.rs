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

//! Protocol engine.
//!
//! Turns received lines into engine state transitions and observer
//! notifications, and operator intents into wire commands.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bluetooth::transport::TransportSession;
use crate::bluetooth::{Command, Inbound};
use crate::error::Result;
use crate::events::{EventSink, LinkEvent};
use crate::state::{EngineState, EngineStateCell};

/// Operator intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Flip the ignition based on the last reported state.
    ToggleIgnition,
    /// Ask the peer for its ignition state.
    QueryStatus,
    /// Tell the peer a call is coming in.
    NotifyIncomingCall,
}

/// Sole writer of the engine state.
pub struct ProtocolEngine {
    session: Arc<TransportSession>,
    state: Arc<EngineStateCell>,
    events: EventSink,
}

impl ProtocolEngine {
    pub fn new(
        session: Arc<TransportSession>,
        state: Arc<EngineStateCell>,
        events: EventSink,
    ) -> Self {
        Self {
            session,
            state,
            events,
        }
    }

    /// Read handle to the engine state.
    pub fn state(&self) -> &Arc<EngineStateCell> {
        &self.state
    }

    /// Apply one received line. Blank lines are ignored.
    pub fn handle_message(&self, line: &str) -> Option<Inbound> {
        let message = Inbound::parse(line)?;
        debug!("Received: {}", line.trim());

        match &message {
            Inbound::Ignition(state) => {
                if let Some(previous) = self.state.apply(*state) {
                    info!("Engine state {} -> {}", previous, state);
                    self.events.emit(LinkEvent::EngineStateChanged(*state));
                } else {
                    debug!("Engine state confirmed: {}", state);
                }
            }
            Inbound::CallRejected => {
                info!("Peer reports call rejected");
                self.events.emit(LinkEvent::CallRejected);
            }
            Inbound::CallAccepted => {
                info!("Peer reports call accepted");
                self.events.emit(LinkEvent::CallAccepted);
            }
            Inbound::Unrecognized(text) => {
                warn!("Unhandled message: {}", text);
                self.events.emit(LinkEvent::MessageUnrecognized(text.clone()));
            }
        }

        Some(message)
    }

    /// Command an intent maps to, given the current engine state.
    ///
    /// The toggle decision uses the last reported state, which may be stale
    /// while a status report is still in flight.
    pub fn command_for(&self, intent: Intent) -> Command {
        match intent {
            Intent::ToggleIgnition => match self.state.get() {
                EngineState::On => Command::IgnitionOff,
                EngineState::Off | EngineState::Unknown => Command::IgnitionOn,
            },
            Intent::QueryStatus => Command::Status,
            Intent::NotifyIncomingCall => Command::CallIncoming,
        }
    }

    /// Send the command for an intent. Failures are reported, not retried.
    pub async fn execute(&self, intent: Intent) -> Result<Command> {
        let command = self.command_for(intent);
        match self.send(command).await {
            Ok(()) => Ok(command),
            Err(error) => {
                warn!("Failed to send {}: {}", command, error);
                self.events.emit(LinkEvent::SendFailed {
                    intent,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Write a single command line.
    pub async fn send(&self, command: Command) -> Result<()> {
        let line = command.to_line();
        self.session.write(line.as_bytes()).await?;
        info!("Command sent: {}", command);
        self.events.emit(LinkEvent::CommandSent(command));
        Ok(())
    }

    pub async fn toggle_ignition(&self) -> Result<Command> {
        self.execute(Intent::ToggleIgnition).await
    }

    pub async fn query_status(&self) -> Result<Command> {
        self.execute(Intent::QueryStatus).await
    }

    pub async fn notify_incoming_call(&self) -> Result<Command> {
        self.execute(Intent::NotifyIncomingCall).await
    }
}
