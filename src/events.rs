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

//! Events reported to observers of the link.

use tokio::sync::mpsc;
use tracing::debug;

use crate::bluetooth::Command;
use crate::engine::Intent;
use crate::error::LinkError;
use crate::state::{EngineState, LinkStatus};

/// Events emitted by the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Transport status changed.
    StatusChanged(LinkStatus),
    /// The peer reported a different engine state.
    EngineStateChanged(EngineState),
    /// The peer sent a line that is not part of the protocol.
    MessageUnrecognized(String),
    /// The peer reports it rejected a call.
    CallRejected,
    /// The peer reports it accepted a call.
    CallAccepted,
    /// A command was written and flushed.
    CommandSent(Command),
    /// An intent could not be delivered.
    SendFailed { intent: Intent, error: LinkError },
}

/// Receiving side of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Sending side of the event channel.
///
/// Emission never waits and never drops: events queue until the observer
/// reads them, so the line reader is not stalled by a slow consumer.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver observers read from.
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event.
    pub fn emit(&self, event: LinkEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.send(event) {
            debug!("No event observer, dropping {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(LinkEvent::EngineStateChanged(EngineState::On));
        sink.emit(LinkEvent::CallAccepted);

        assert_eq!(rx.try_recv().unwrap(), LinkEvent::EngineStateChanged(EngineState::On));
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::CallAccepted);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unread_events_are_never_dropped() {
        let (sink, mut rx) = EventSink::channel();
        for i in 0..1000 {
            let state = if i % 2 == 0 { EngineState::On } else { EngineState::Off };
            sink.emit(LinkEvent::EngineStateChanged(state));
        }
        sink.emit(LinkEvent::StatusChanged(LinkStatus::Disconnected));

        for i in 0..1000 {
            let state = if i % 2 == 0 { EngineState::On } else { EngineState::Off };
            assert_eq!(rx.try_recv().unwrap(), LinkEvent::EngineStateChanged(state));
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            LinkEvent::StatusChanged(LinkStatus::Disconnected)
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_and_disabled_sinks_are_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(LinkEvent::CallRejected);

        EventSink::disabled().emit(LinkEvent::CallAccepted);
    }
}
