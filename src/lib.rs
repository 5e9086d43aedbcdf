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

//! Ignition link.
//!
//! Keeps a Bluetooth SPP link to an ignition controller, relays ignition
//! commands and status queries over a newline-delimited text protocol, and
//! rejects incoming calls while the engine is reported on.

pub mod bluetooth;
pub mod call_gate;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod state;

pub use bluetooth::{Command, LinkManager};
pub use call_gate::{CallGate, CallTerminator, GateDecision};
pub use engine::{Intent, ProtocolEngine};
pub use error::{CallGateError, ConnectError, LinkError};
pub use events::{EventReceiver, EventSink, LinkEvent};
pub use state::{EngineState, EngineStateCell, LinkStatus};
