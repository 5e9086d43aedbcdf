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

//! Transport session to a single peer.
//!
//! The session holds at most one live duplex stream. Writes go through a
//! single async mutex so command bytes never interleave on the wire; the
//! read half is handed to the line reader as a [`SessionReader`] that is
//! bound to the connection's cancellation token.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ConnectError, LinkError, Result};
use crate::events::{EventSink, LinkEvent};
use crate::state::LinkStatus;

/// Bytes requested per read.
const READ_CHUNK_SIZE: usize = 1024;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established duplex byte stream, split into halves.
pub struct PeerStream {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl PeerStream {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split a single duplex stream.
    pub fn from_duplex<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

/// How to negotiate the RFCOMM channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStrategy {
    /// Resolve the channel from the peer's SPP service record.
    ServiceRecord,
    /// Connect straight to a fixed channel.
    Channel(u8),
}

/// Platform capability that opens streams to peers.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Whether an adapter is present and usable.
    async fn is_ready(&self) -> bool;

    /// Whether the peer is a bonded device.
    async fn is_peer_paired(&self, peer: &str) -> bool;

    /// Open a stream to the peer using the given strategy.
    async fn acquire_transport(
        &self,
        peer: &str,
        strategy: ChannelStrategy,
    ) -> io::Result<PeerStream>;
}

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Channel tried when service record negotiation fails.
    pub fallback_channel: u8,
    /// Upper bound for each handshake attempt.
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fallback_channel: 1,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

struct Live {
    generation: u64,
    peer: String,
    cancel: CancellationToken,
}

struct WriterSlot {
    generation: u64,
    writer: BoxedWriter,
}

struct Inner {
    live: Option<Live>,
    status: LinkStatus,
}

/// Owner of the duplex stream to one peer.
pub struct TransportSession {
    connector: Arc<dyn PeerConnector>,
    options: SessionOptions,
    events: EventSink,
    connect_lock: tokio::sync::Mutex<()>,
    writer: tokio::sync::Mutex<Option<WriterSlot>>,
    inner: Mutex<Inner>,
    generations: AtomicU64,
}

impl TransportSession {
    pub fn new(connector: Arc<dyn PeerConnector>, options: SessionOptions, events: EventSink) -> Self {
        Self {
            connector,
            options,
            events,
            connect_lock: tokio::sync::Mutex::new(()),
            writer: tokio::sync::Mutex::new(None),
            inner: Mutex::new(Inner {
                live: None,
                status: LinkStatus::Disconnected,
            }),
            generations: AtomicU64::new(0),
        }
    }

    /// Connect to a peer, closing any existing connection first.
    ///
    /// On success the read half is returned; it must be drained by the
    /// caller for the lifetime of the connection.
    pub async fn connect(&self, peer: &str) -> Result<SessionReader, ConnectError> {
        let _connecting = self.connect_lock.lock().await;

        self.close().await;
        self.set_status(LinkStatus::Connecting);
        info!("Connecting to {}", peer);

        match self.establish(peer).await {
            Ok(stream) => Ok(self.install(peer, stream).await),
            Err(e) => {
                error!("Connection to {} failed: {}", peer, e);
                self.set_status(LinkStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn establish(&self, peer: &str) -> Result<PeerStream> {
        if !self.connector.is_ready().await {
            return Err(LinkError::NotReady);
        }
        if !self.connector.is_peer_paired(peer).await {
            return Err(LinkError::NotPaired(peer.to_string()));
        }

        let primary = match self.attempt(peer, ChannelStrategy::ServiceRecord).await {
            Ok(stream) => return Ok(stream),
            Err(e) => e,
        };
        warn!("Service record connection to {} failed: {}", peer, primary);

        let channel = self.options.fallback_channel;
        info!("Trying fallback RFCOMM channel {}", channel);
        self.attempt(peer, ChannelStrategy::Channel(channel))
            .await
            .map_err(|fallback| {
                LinkError::IoFailure(format!(
                    "{}; fallback channel {}: {}",
                    primary, channel, fallback
                ))
            })
    }

    async fn attempt(&self, peer: &str, strategy: ChannelStrategy) -> io::Result<PeerStream> {
        debug!("Connecting to {} via {:?}", peer, strategy);
        let handshake = self.connector.acquire_transport(peer, strategy);
        match tokio::time::timeout(self.options.connect_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "handshake timed out",
            )),
        }
    }

    async fn install(&self, peer: &str, stream: PeerStream) -> SessionReader {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        *self.writer.lock().await = Some(WriterSlot {
            generation,
            writer: stream.writer,
        });

        {
            let mut inner = self.inner.lock();
            inner.live = Some(Live {
                generation,
                peer: peer.to_string(),
                cancel: cancel.clone(),
            });
            self.update_status(&mut inner, LinkStatus::Connected);
        }
        info!("Connected to {} (connection #{})", peer, generation);

        SessionReader {
            reader: stream.reader,
            cancel,
            generation,
        }
    }

    /// Write the bytes and flush. Concurrent calls are serialized.
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        let (generation, cancel) = match self.inner.lock().live.as_ref() {
            Some(live) => (live.generation, live.cancel.clone()),
            None => {
                warn!("Cannot write: not connected");
                return Err(LinkError::SendFailure);
            }
        };

        let mut guard = self.writer.lock().await;
        let writer = match guard.as_mut() {
            Some(slot) if slot.generation == generation => &mut slot.writer,
            _ => return Err(LinkError::SendFailure),
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LinkError::Closed),
            res = write_all_flush(writer, bytes) => res,
        };
        drop(guard);

        if let Err(LinkError::IoFailure(reason)) = &outcome {
            error!("Write failed: {}", reason);
            self.release(generation, LinkStatus::Failed(reason.clone()))
                .await;
        }
        outcome
    }

    /// Release the stream. Safe to call repeatedly and from any task.
    pub async fn close(&self) {
        let live = self.inner.lock().live.take();
        match live {
            Some(live) => self.teardown(live, LinkStatus::Disconnected).await,
            None => debug!("Close requested with no active connection"),
        }
    }

    /// Tear down connection `generation` if it is still the live one.
    pub(crate) async fn release(&self, generation: u64, status: LinkStatus) {
        let live = {
            let mut inner = self.inner.lock();
            if inner.live.as_ref().is_some_and(|l| l.generation == generation) {
                inner.live.take()
            } else {
                None
            }
        };
        match live {
            Some(live) => self.teardown(live, status).await,
            None => debug!("Connection #{} already released", generation),
        }
    }

    async fn teardown(&self, live: Live, status: LinkStatus) {
        live.cancel.cancel();

        let slot = {
            let mut guard = self.writer.lock().await;
            if guard.as_ref().is_some_and(|s| s.generation == live.generation) {
                guard.take()
            } else {
                None
            }
        };
        if let Some(mut slot) = slot {
            if let Err(e) = slot.writer.shutdown().await {
                debug!("Error shutting down stream: {}", e);
            }
        }

        info!("Connection #{} to {} closed", live.generation, live.peer);

        let mut inner = self.inner.lock();
        if inner.live.is_none() {
            self.update_status(&mut inner, status);
        }
    }

    /// Non-blocking liveness snapshot.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().live.is_some()
    }

    pub fn status(&self) -> LinkStatus {
        self.inner.lock().status.clone()
    }

    /// Generation of the live connection, if any.
    pub fn generation(&self) -> Option<u64> {
        self.inner.lock().live.as_ref().map(|l| l.generation)
    }

    /// Identifier of the connected peer.
    pub fn peer(&self) -> Option<String> {
        self.inner.lock().live.as_ref().map(|l| l.peer.clone())
    }

    fn set_status(&self, status: LinkStatus) {
        let mut inner = self.inner.lock();
        self.update_status(&mut inner, status);
    }

    fn update_status(&self, inner: &mut Inner, status: LinkStatus) {
        if inner.status != status {
            debug!("Link status: {} -> {}", inner.status, status);
            inner.status = status.clone();
            self.events.emit(LinkEvent::StatusChanged(status));
        }
    }
}

async fn write_all_flush(writer: &mut BoxedWriter, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read half of a live connection.
pub struct SessionReader {
    reader: BoxedReader,
    cancel: CancellationToken,
    generation: u64,
}

impl SessionReader {
    /// Wait for the next chunk of bytes.
    ///
    /// Returns `Closed` when the peer hangs up or the session is closed
    /// locally, which also interrupts a pending read.
    pub async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            res = self.reader.read(&mut buf) => Some(res),
        };

        match read {
            None | Some(Ok(0)) => Err(LinkError::Closed),
            Some(Ok(n)) => Ok(buf[..n].to_vec()),
            Some(Err(e)) => Err(e.into()),
        }
    }

    /// Connection this reader belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the session closed this connection locally.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;

    const PEER: &str = "00:23:10:01:24:19";

    fn session(connector: &Arc<MockConnector>) -> Arc<TransportSession> {
        Arc::new(TransportSession::new(
            connector.clone(),
            SessionOptions::default(),
            EventSink::disabled(),
        ))
    }

    async fn read_line(remote: &mut tokio::io::DuplexStream) -> String {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            remote.read_exact(&mut byte).await.unwrap();
            out.push(byte[0]);
            if byte[0] == b'\n' {
                return String::from_utf8(out).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_connect_uses_service_record_first() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector);

        let reader = session.connect(PEER).await.unwrap();
        assert_eq!(reader.generation(), 1);
        assert!(session.is_connected());
        assert_eq!(session.status(), LinkStatus::Connected);
        assert_eq!(session.peer().as_deref(), Some(PEER));
        assert_eq!(connector.attempts(), vec![ChannelStrategy::ServiceRecord]);
    }

    #[tokio::test]
    async fn test_connect_not_ready() {
        let connector = Arc::new(MockConnector::new().not_ready());
        let session = session(&connector);

        assert_eq!(session.connect(PEER).await.err(), Some(LinkError::NotReady));
        assert!(connector.attempts().is_empty());
        assert!(matches!(session.status(), LinkStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_connect_not_paired() {
        let connector = Arc::new(MockConnector::new().unpaired());
        let session = session(&connector);

        assert_eq!(
            session.connect(PEER).await.err(),
            Some(LinkError::NotPaired(PEER.to_string()))
        );
        assert!(connector.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_channel() {
        let connector = Arc::new(MockConnector::new().failing_service_record());
        let session = session(&connector);

        session.connect(PEER).await.unwrap();
        assert_eq!(
            connector.attempts(),
            vec![ChannelStrategy::ServiceRecord, ChannelStrategy::Channel(1)]
        );
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_connect_both_strategies_fail() {
        let connector = Arc::new(
            MockConnector::new()
                .failing_service_record()
                .failing_channel(),
        );
        let session = session(&connector);

        let err = session.connect(PEER).await.err().unwrap();
        assert!(matches!(err, LinkError::IoFailure(_)));
        assert!(!session.is_connected());
        assert!(matches!(session.status(), LinkStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_write_without_connection_is_send_failure() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector);

        assert_eq!(session.write(b"STATUS\n").await, Err(LinkError::SendFailure));
        assert!(connector.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_write_reaches_peer_once() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector);
        let _reader = session.connect(PEER).await.unwrap();
        let mut remote = connector.take_remote();

        session.write(b"IGNITION_ON\n").await.unwrap();
        assert_eq!(read_line(&mut remote).await, "IGNITION_ON\n");

        let mut extra = [0u8; 16];
        let more = tokio::time::timeout(Duration::from_millis(50), remote.read(&mut extra)).await;
        assert!(more.is_err(), "unexpected extra bytes on the wire");
    }

    #[tokio::test]
    async fn test_concurrent_writes_do_not_interleave() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector);
        let _reader = session.connect(PEER).await.unwrap();
        let mut remote = connector.take_remote();

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let session = session.clone();
            let line = format!("{}\n", char::from(b'A' + i).to_string().repeat(100));
            tasks.push(tokio::spawn(async move {
                session.write(line.as_bytes()).await.unwrap();
            }));
        }

        for _ in 0..8 {
            let line = read_line(&mut remote).await;
            let body = line.trim_end();
            assert_eq!(body.len(), 100);
            let first = body.chars().next().unwrap();
            assert!(body.chars().all(|c| c == first), "interleaved line: {body}");
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector);
        let _reader = session.connect(PEER).await.unwrap();

        session.close().await;
        assert!(!session.is_connected());
        assert_eq!(session.status(), LinkStatus::Disconnected);

        session.close().await;
        assert_eq!(session.status(), LinkStatus::Disconnected);
        assert_eq!(session.write(b"STATUS\n").await, Err(LinkError::SendFailure));
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector);
        let mut reader = session.connect(PEER).await.unwrap();
        let _remote = connector.take_remote();

        let pending = tokio::spawn(async move { reader.read_chunk().await });
        tokio::task::yield_now().await;
        session.close().await;

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("reader stayed blocked")
            .unwrap();
        assert_eq!(result, Err(LinkError::Closed));
    }

    #[tokio::test]
    async fn test_peer_hangup_reads_closed() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector);
        let mut reader = session.connect(PEER).await.unwrap();
        let mut remote = connector.take_remote();

        remote.write_all(b"ON\n").await.unwrap();
        assert_eq!(reader.read_chunk().await.unwrap(), b"ON\n".to_vec());

        drop(remote);
        assert_eq!(reader.read_chunk().await, Err(LinkError::Closed));
        assert!(!reader.is_cancelled());
    }

    #[tokio::test]
    async fn test_reconnect_supersedes_previous_connection() {
        let connector = Arc::new(MockConnector::new());
        let session = session(&connector);

        let mut first = session.connect(PEER).await.unwrap();
        let mut first_remote = connector.take_remote();
        let second = session.connect(PEER).await.unwrap();
        let _second_remote = connector.take_remote();

        assert_eq!(second.generation(), 2);
        assert_eq!(first.read_chunk().await, Err(LinkError::Closed));
        assert!(first.is_cancelled());

        let mut buf = [0u8; 8];
        assert_eq!(first_remote.read(&mut buf).await.unwrap(), 0);

        // A stale release from the old reader leaves the new link alone.
        session
            .release(first.generation(), LinkStatus::Disconnected)
            .await;
        assert!(session.is_connected());
        assert_eq!(session.status(), LinkStatus::Connected);
    }

    #[tokio::test]
    async fn test_status_events_emitted() {
        let connector = Arc::new(MockConnector::new());
        let (events, mut rx) = EventSink::channel();
        let session = TransportSession::new(connector.clone(), SessionOptions::default(), events);

        let _reader = session.connect(PEER).await.unwrap();
        session.close().await;

        assert_eq!(rx.try_recv().unwrap(), LinkEvent::StatusChanged(LinkStatus::Connecting));
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::StatusChanged(LinkStatus::Connected));
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::StatusChanged(LinkStatus::Disconnected));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_timeout_is_io_failure() {
        let connector = Arc::new(MockConnector::new().hanging());
        let session = TransportSession::new(
            connector.clone(),
            SessionOptions {
                fallback_channel: 3,
                connect_timeout: Duration::from_millis(20),
            },
            EventSink::disabled(),
        );

        let result = tokio::time::timeout(Duration::from_secs(1), session.connect(PEER))
            .await
            .expect("connect did not time out");
        match result {
            Err(LinkError::IoFailure(reason)) => assert!(reason.contains("timed out"), "{reason}"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("connect should fail"),
        }
        assert_eq!(
            connector.attempts(),
            vec![ChannelStrategy::ServiceRecord, ChannelStrategy::Channel(3)]
        );
        assert!(matches!(session.status(), LinkStatus::Failed(_)));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_write_io_error_releases_connection() {
        let connector = Arc::new(MockConnector::new().broken_io());
        let (events, mut rx) = EventSink::channel();
        let session = TransportSession::new(connector.clone(), SessionOptions::default(), events);
        let _reader = session.connect(PEER).await.unwrap();

        let result = session.write(b"STATUS\n").await;
        assert!(matches!(result, Err(LinkError::IoFailure(_))));
        assert!(!session.is_connected());
        assert!(matches!(session.status(), LinkStatus::Failed(_)));

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let LinkEvent::StatusChanged(status) = event {
                statuses.push(status);
            }
        }
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0], LinkStatus::Connecting);
        assert_eq!(statuses[1], LinkStatus::Connected);
        assert!(matches!(statuses[2], LinkStatus::Failed(_)));

        assert_eq!(session.write(b"STATUS\n").await, Err(LinkError::SendFailure));
    }
}
