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

//! RFCOMM client connector backed by BlueZ.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ReqError, Role, SocketAddr, Stream};
use bluer::{Adapter, Address, Session};
use futures::StreamExt;
use std::fmt::Display;
use std::io;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{ChannelStrategy, PeerConnector, PeerStream};

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Opens SPP streams to bonded devices through the default adapter.
pub struct RfcommConnector {
    session: Session,
    adapter: Adapter,
}

impl RfcommConnector {
    /// Open a BlueZ session on the default adapter.
    pub async fn new() -> anyhow::Result<Self> {
        info!("Initializing Bluetooth connector...");

        let session = Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        Ok(Self { session, adapter })
    }

    /// Name of the adapter in use.
    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    fn parse_address(peer: &str) -> io::Result<Address> {
        peer.parse::<Address>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid Bluetooth address: {}", peer),
            )
        })
    }

    /// Connect through the SPP profile so BlueZ resolves the channel from
    /// the peer's service record.
    async fn connect_service_record(&self, address: Address) -> io::Result<Stream> {
        let profile = Profile {
            uuid: SPP_UUID,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut handle = self.session.register_profile(profile).await.map_err(to_io)?;
        let device = self.adapter.device(address).map_err(to_io)?;

        // BlueZ hands the socket to the profile while connect_profile is
        // still pending, so both are polled together.
        let connect = device.connect_profile(&SPP_UUID);
        tokio::pin!(connect);
        let mut profile_connected = false;

        let request = loop {
            tokio::select! {
                res = &mut connect, if !profile_connected => {
                    res.map_err(to_io)?;
                    profile_connected = true;
                    debug!("Profile connected to {}", address);
                }
                req = handle.next() => match req {
                    Some(req) if req.device() == address => break req,
                    Some(req) => {
                        debug!("Rejecting profile connection from {}", req.device());
                        req.reject(ReqError::Rejected);
                    }
                    None => {
                        return Err(io::Error::new(
                            io::ErrorKind::NotConnected,
                            "profile closed before a connection arrived",
                        ));
                    }
                },
            }
        };

        request.accept().map_err(to_io)
    }
}

#[async_trait]
impl PeerConnector for RfcommConnector {
    async fn is_ready(&self) -> bool {
        match self.adapter.is_powered().await {
            Ok(powered) => {
                if !powered {
                    warn!("Bluetooth adapter {} is powered off", self.adapter.name());
                }
                powered
            }
            Err(e) => {
                warn!("Bluetooth adapter unavailable: {}", e);
                false
            }
        }
    }

    async fn is_peer_paired(&self, peer: &str) -> bool {
        let Ok(address) = Self::parse_address(peer) else {
            warn!("Invalid Bluetooth address: {}", peer);
            return false;
        };
        let device = match self.adapter.device(address) {
            Ok(device) => device,
            Err(e) => {
                debug!("Device {} unknown: {}", peer, e);
                return false;
            }
        };
        device.is_paired().await.unwrap_or(false)
    }

    async fn acquire_transport(
        &self,
        peer: &str,
        strategy: ChannelStrategy,
    ) -> io::Result<PeerStream> {
        let address = Self::parse_address(peer)?;

        let stream = match strategy {
            ChannelStrategy::ServiceRecord => self.connect_service_record(address).await?,
            ChannelStrategy::Channel(channel) => {
                Stream::connect(SocketAddr::new(address, channel)).await?
            }
        };

        let (reader, writer) = stream.into_split();
        Ok(PeerStream::new(reader, writer))
    }
}

fn to_io(err: impl Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}
