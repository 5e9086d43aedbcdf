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

//! Ignition Link console.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ignition_link::bluetooth::RfcommConnector;
use ignition_link::call_gate::UnsupportedTerminator;
use ignition_link::config::Config;
use ignition_link::{CallGate, EventSink, GateDecision, Intent, LinkEvent, LinkManager};

/// Operator commands read from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Toggle,
    Status,
    Call,
    Ring,
    State,
    Connect,
    Disconnect,
    Quit,
}

impl ConsoleCommand {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "toggle" | "t" => Some(Self::Toggle),
            "status" | "s" => Some(Self::Status),
            "call" => Some(Self::Call),
            "ring" => Some(Self::Ring),
            "state" => Some(Self::State),
            "connect" => Some(Self::Connect),
            "disconnect" => Some(Self::Disconnect),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load_from(&config_path)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log.filter))?)
        .init();

    info!("Starting Ignition Link v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path.display());

    let connector = Arc::new(RfcommConnector::new().await?);
    info!("Bluetooth adapter: {}", connector.adapter_name());

    let (events, mut event_rx) = EventSink::channel();
    let manager = Arc::new(LinkManager::new(connector, &config.link, events));

    let mut gate = CallGate::new(manager.state_handle(), Arc::new(UnsupportedTerminator));
    gate.set_enabled(config.call_gate.enabled);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), describe(&event));
        }
    });

    let peer = config.link.peer_address.clone();
    spawn_connect(manager.clone(), peer.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Ready. Commands: toggle, status, call, ring, state, connect, disconnect, quit");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(command) = ConsoleCommand::parse(&line) else {
                    warn!("Unknown command: {}", line.trim());
                    continue;
                };
                match command {
                    ConsoleCommand::Toggle => {
                        manager.submit(Intent::ToggleIgnition);
                    }
                    ConsoleCommand::Status => {
                        manager.submit(Intent::QueryStatus);
                    }
                    ConsoleCommand::Call => {
                        manager.submit(Intent::NotifyIncomingCall);
                    }
                    ConsoleCommand::Ring => match gate.on_call_ringing() {
                        GateDecision::Allowed(state) => println!("Call allowed (engine {})", state),
                        GateDecision::Rejected => println!("Call rejected (engine ON)"),
                        GateDecision::RejectFailed(e) => println!("Call not rejected: {}", e),
                    },
                    ConsoleCommand::State => {
                        println!("Engine: {} | Bluetooth: {}", manager.engine_state(), manager.status());
                    }
                    ConsoleCommand::Connect => spawn_connect(manager.clone(), peer.clone()),
                    ConsoleCommand::Disconnect => {
                        let manager = manager.clone();
                        tokio::spawn(async move { manager.disconnect().await });
                    }
                    ConsoleCommand::Quit => {
                        info!("Quit requested");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.shutdown().await;
    info!("Ignition Link stopped");
    Ok(())
}

/// Connect in the background so the console stays responsive.
fn spawn_connect(manager: Arc<LinkManager>, peer: String) {
    tokio::spawn(async move {
        if let Err(e) = manager.connect(&peer).await {
            error!("Connection to {} failed: {}", peer, e);
        }
    });
}

fn describe(event: &LinkEvent) -> String {
    match event {
        LinkEvent::StatusChanged(status) => format!("Bluetooth: {}", status),
        LinkEvent::EngineStateChanged(state) => format!("Engine: {}", state),
        LinkEvent::MessageUnrecognized(text) => format!("Unhandled message: {}", text),
        LinkEvent::CallRejected => "Peer: call rejected".to_string(),
        LinkEvent::CallAccepted => "Peer: call accepted".to_string(),
        LinkEvent::CommandSent(command) => format!("Sent: {}", command),
        LinkEvent::SendFailed { intent, error } => format!("Failed to send {:?}: {}", intent, error),
    }
}
