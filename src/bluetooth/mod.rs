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

//! Bluetooth communication module.
//!
//! Handles the RFCOMM client link to the ignition controller.

pub mod connection;
pub mod manager;
pub mod protocol;
pub mod reassembler;
pub mod rfcomm;
pub mod transport;

pub use connection::{LineReader, ReaderExit};
pub use manager::LinkManager;
pub use protocol::{encode_line, Command, Inbound};
pub use reassembler::LineReassembler;
pub use rfcomm::{RfcommConnector, SPP_UUID};
pub use transport::{
    ChannelStrategy, PeerConnector, PeerStream, SessionOptions, SessionReader, TransportSession,
};
