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

//! Line reader for a live connection.

use std::sync::Arc;
use tracing::{debug, error, info};

use super::reassembler::LineReassembler;
use super::transport::{SessionReader, TransportSession};
use crate::engine::ProtocolEngine;
use crate::error::LinkError;
use crate::state::LinkStatus;

/// Why the reader loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The session was closed or superseded locally.
    Cancelled,
    /// The peer closed the stream.
    PeerClosed,
    /// A read failed.
    Failed(String),
}

/// Drains one connection and dispatches each complete line to the engine.
pub struct LineReader {
    reader: SessionReader,
    reassembler: LineReassembler,
    engine: Arc<ProtocolEngine>,
    session: Arc<TransportSession>,
}

impl LineReader {
    pub fn new(
        reader: SessionReader,
        engine: Arc<ProtocolEngine>,
        session: Arc<TransportSession>,
    ) -> Self {
        Self {
            reader,
            reassembler: LineReassembler::new(),
            engine,
            session,
        }
    }

    /// Run until the connection ends. Never reconnects.
    pub async fn run(mut self) -> ReaderExit {
        let generation = self.reader.generation();
        info!("Line reader started for connection #{}", generation);

        let exit = loop {
            match self.reader.read_chunk().await {
                Ok(chunk) => {
                    debug!("Read {} bytes", chunk.len());
                    for line in self.reassembler.push(&chunk) {
                        self.engine.handle_message(&line);
                    }
                }
                Err(LinkError::Closed) if self.reader.is_cancelled() => {
                    break ReaderExit::Cancelled;
                }
                Err(LinkError::Closed) => {
                    info!("Connection closed by remote");
                    self.session
                        .release(generation, LinkStatus::Disconnected)
                        .await;
                    break ReaderExit::PeerClosed;
                }
                Err(e) => {
                    error!("Read error: {}", e);
                    let reason = e.to_string();
                    self.session
                        .release(generation, LinkStatus::Failed(reason.clone()))
                        .await;
                    break ReaderExit::Failed(reason);
                }
            }
        };

        if self.reassembler.pending_len() > 0 {
            debug!(
                "Discarding {} bytes of unterminated input",
                self.reassembler.pending_len()
            );
        }
        info!("Line reader for connection #{} stopped: {:?}", generation, exit);
        exit
    }
}
