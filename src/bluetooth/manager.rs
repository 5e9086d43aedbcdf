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

//! Link manager tying the session, reader task and protocol engine together.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{LineReader, ReaderExit};
use super::protocol::Command;
use super::transport::{PeerConnector, TransportSession};
use crate::config::LinkConfig;
use crate::engine::{Intent, ProtocolEngine};
use crate::error::{ConnectError, Result};
use crate::events::EventSink;
use crate::state::{EngineState, EngineStateCell, LinkStatus};

struct ReaderTask {
    generation: u64,
    handle: JoinHandle<ReaderExit>,
}

/// Manager for the link to one ignition controller.
///
/// Must be created inside a Tokio runtime; it spawns the intent worker
/// immediately and one line reader task per connection.
pub struct LinkManager {
    session: Arc<TransportSession>,
    engine: Arc<ProtocolEngine>,
    status_query_delay: Duration,
    connect_lock: tokio::sync::Mutex<()>,
    reader_task: Mutex<Option<ReaderTask>>,
    intent_tx: async_channel::Sender<Intent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LinkManager {
    /// Create a new link manager.
    pub fn new(connector: Arc<dyn PeerConnector>, config: &LinkConfig, events: EventSink) -> Self {
        let session = Arc::new(TransportSession::new(
            connector,
            config.session_options(),
            events.clone(),
        ));
        let engine = Arc::new(ProtocolEngine::new(
            session.clone(),
            EngineStateCell::new(),
            events,
        ));

        let (intent_tx, intent_rx) = async_channel::unbounded();
        let worker = tokio::spawn(Self::intent_loop(engine.clone(), intent_rx));

        Self {
            session,
            engine,
            status_query_delay: config.status_query_delay(),
            connect_lock: tokio::sync::Mutex::new(()),
            reader_task: Mutex::new(None),
            intent_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Connect to the peer and start reading from it.
    ///
    /// Any existing connection is closed first. No reconnection is attempted
    /// if the link later drops.
    pub async fn connect(&self, peer: &str) -> Result<(), ConnectError> {
        // Held until the reader task is recorded so concurrent connects
        // install their readers in connection order.
        let _connecting = self.connect_lock.lock().await;

        let reader = self.session.connect(peer).await?;
        let generation = reader.generation();
        let cancel = reader.cancellation_token();

        let line_reader = LineReader::new(reader, self.engine.clone(), self.session.clone());
        let previous = self.reader_task.lock().replace(ReaderTask {
            generation,
            handle: tokio::spawn(line_reader.run()),
        });
        if let Some(previous) = previous {
            debug!("Line reader for connection #{} detached", previous.generation);
        }

        if !self.status_query_delay.is_zero() {
            self.schedule_status_query(cancel);
        }

        info!("Link to {} ready", peer);
        Ok(())
    }

    fn schedule_status_query(&self, cancel: CancellationToken) {
        let engine = self.engine.clone();
        let delay = self.status_query_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Status query cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = engine.query_status().await {
                        warn!("Initial status query failed: {}", e);
                    }
                }
            }
        });
    }

    /// Close the link and wait for the line reader to stop.
    pub async fn disconnect(&self) {
        self.session.close().await;

        let task = self.reader_task.lock().take();
        if let Some(task) = task {
            match task.handle.await {
                Ok(exit) => debug!("Line reader exited: {:?}", exit),
                Err(e) => warn!("Line reader task failed: {}", e),
            }
        }
    }

    /// Queue an intent without waiting for I/O.
    ///
    /// Intents are sent in submission order; each outcome is reported as an
    /// event. Returns `false` once the manager is shutting down.
    pub fn submit(&self, intent: Intent) -> bool {
        match self.intent_tx.try_send(intent) {
            Ok(()) => true,
            Err(_) => {
                warn!("Intent queue closed, dropping {:?}", intent);
                false
            }
        }
    }

    async fn intent_loop(engine: Arc<ProtocolEngine>, intents: async_channel::Receiver<Intent>) {
        while let Ok(intent) = intents.recv().await {
            debug!("Processing {:?}", intent);
            // Outcome is reported through the event sink.
            let _ = engine.execute(intent).await;
        }
        debug!("Intent queue closed");
    }

    pub async fn toggle_ignition(&self) -> Result<Command> {
        self.engine.toggle_ignition().await
    }

    pub async fn query_status(&self) -> Result<Command> {
        self.engine.query_status().await
    }

    pub async fn notify_incoming_call(&self) -> Result<Command> {
        self.engine.notify_incoming_call().await
    }

    /// Last reported engine state.
    pub fn engine_state(&self) -> EngineState {
        self.engine.state().get()
    }

    /// Read handle to the engine state, for the call gate.
    pub fn state_handle(&self) -> Arc<EngineStateCell> {
        self.engine.state().clone()
    }

    pub fn engine(&self) -> &Arc<ProtocolEngine> {
        &self.engine
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn status(&self) -> LinkStatus {
        self.session.status()
    }

    /// Drain queued intents, then close the link.
    pub async fn shutdown(&self) {
        self.intent_tx.close();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("Intent worker failed: {}", e);
            }
        }
        self.disconnect().await;
        info!("Link manager stopped");
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        self.intent_tx.close();
        if let Some(task) = self.reader_task.get_mut().take() {
            task.handle.abort();
        }
    }
}
