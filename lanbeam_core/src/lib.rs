use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod discovery;
pub mod error;
pub mod transfer;

pub use config::{DiscoveryConfig, ReceiverConfig, SenderConfig};
pub use discovery::{
    DISCOVERY_PORT, DiscoveredHost, DiscoveryResponder, discover_all, discover_one,
};
pub use error::{HeaderError, ReceiveError, TransferError};
pub use transfer::{
    AUTO_HOST, CHUNK_SIZE, ReceivedFile, TRANSFER_PORT, TransferHeader, TransferRequest,
    receive_file, receive_file_with_timeout, run_server, send_file, send_file_with_config,
};

use transfer::send_request;

/// Magic bytes to identify our app's discovery datagrams (7 bytes: "LNBEAM\0")
pub const MAGIC_BYTES: &[u8] = b"LNBEAM\x00";

/// Discovery datagram payload, carried after `MAGIC_BYTES` as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryMsg {
    /// Broadcast by a sender looking for receivers
    Probe { name: String },
    /// Unicast reply from a receiver
    Announce { name: String, transfer_port: u16 },
}

impl DiscoveryMsg {
    pub fn to_packet(&self) -> Option<Vec<u8>> {
        let json_bytes = serde_json::to_vec(self).ok()?;
        let mut packet = MAGIC_BYTES.to_vec();
        packet.extend_from_slice(&json_bytes);
        Some(packet)
    }

    /// `None` for foreign traffic or malformed JSON
    pub fn from_packet(data: &[u8]) -> Option<Self> {
        let json = data.strip_prefix(MAGIC_BYTES)?;
        serde_json::from_slice(json).ok()
    }
}

//Commands from a front-end to the backend loop
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Probe the LAN and report every receiver found
    DiscoverHosts,
    /// Send files one at a time. `host` may be `"auto"`.
    SendFiles {
        files: Vec<PathBuf>,
        host: String,
        port: u16,
        /// Only honoured when exactly one file is sent
        dest_filename: Option<String>,
    },
    StartReceiver(ReceiverConfig),
    StopReceiver,
}

//Reports from the backend to a front-end
#[derive(Debug, Clone)]
pub enum AppEvent {
    Status(String),

    HostsFound(Vec<DiscoveredHost>),

    /// "auto" resolved to this address for the current batch
    HostResolved(String),

    TransferProgress {
        file_name: String,
        progress: f64,
    },
    TransferCompleted {
        file_name: String,
        dest_filename: String,
        bytes: u64,
    },
    /// Always the last event of a `SendFiles` batch
    BatchFinished {
        sent: usize,
        total: usize,
    },

    ReceiverStarted {
        addr: SocketAddr,
    },
    ReceiverStopped,
    ReceiveProgress {
        from: SocketAddr,
        progress: f64,
    },
    FileReceived {
        file_name: String,
        path: PathBuf,
        size: u64,
        from: SocketAddr,
    },

    Error(String),
}

/// Drive transfers and discovery on behalf of a front-end.
///
/// Blocking work runs on spawned tasks; everything the front-end needs to
/// know comes back through `event_tx`. Returns when `cmd_rx` closes.
pub async fn run_backend(
    mut cmd_rx: mpsc::Receiver<AppCommand>,
    event_tx: mpsc::Sender<AppEvent>,
    config: SenderConfig,
) {
    let mut receiver_cancel: Option<CancellationToken> = None;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            AppCommand::DiscoverHosts => {
                let _ = event_tx
                    .send(AppEvent::Status(
                        "Scanning for hosts on local network...".to_string(),
                    ))
                    .await;
                let evt = event_tx.clone();
                let discovery = config.discovery.clone();
                tokio::spawn(async move {
                    let hosts = discover_all(&discovery).await;
                    let _ = evt.send(AppEvent::HostsFound(hosts)).await;
                });
            }
            AppCommand::SendFiles {
                files,
                host,
                port,
                dest_filename,
            } => {
                tracing::info!(
                    "Initiating transfer to {}:{} with {} files",
                    host,
                    port,
                    files.len()
                );
                let evt = event_tx.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    send_batch(files, host, port, dest_filename, &config, &evt).await;
                });
            }
            AppCommand::StartReceiver(receiver) => {
                if receiver_cancel.is_some() {
                    let _ = event_tx
                        .send(AppEvent::Status("Receiver is already running".to_string()))
                        .await;
                    continue;
                }
                match start_receiver(receiver, &event_tx).await {
                    Ok((addr, cancel)) => {
                        receiver_cancel = Some(cancel);
                        let _ = event_tx.send(AppEvent::ReceiverStarted { addr }).await;
                    }
                    Err(e) => {
                        tracing::error!("Failed to start receiver: {:#}", e);
                        let _ = event_tx
                            .send(AppEvent::Error(format!("Cannot start receiver: {:#}", e)))
                            .await;
                    }
                }
            }
            AppCommand::StopReceiver => {
                if let Some(cancel) = receiver_cancel.take() {
                    cancel.cancel();
                    let _ = event_tx.send(AppEvent::ReceiverStopped).await;
                } else {
                    let _ = event_tx
                        .send(AppEvent::Status("Receiver is not running".to_string()))
                        .await;
                }
            }
        }
    }

    if let Some(cancel) = receiver_cancel {
        cancel.cancel();
    }
}

/// Send `files` sequentially over one connection each, stopping at the first failure
async fn send_batch(
    files: Vec<PathBuf>,
    host: String,
    port: u16,
    dest_filename: Option<String>,
    config: &SenderConfig,
    event_tx: &mpsc::Sender<AppEvent>,
) {
    let total = files.len();
    let mut sent = 0;

    if files.is_empty() {
        let _ = event_tx
            .send(AppEvent::Error("Please select a file to send.".to_string()))
            .await;
        let _ = event_tx.send(AppEvent::BatchFinished { sent, total }).await;
        return;
    }

    // Discovery runs once; the resolved host is reused for the whole batch.
    let host = if host.eq_ignore_ascii_case(AUTO_HOST) {
        let _ = event_tx
            .send(AppEvent::Status(
                "Discovering host on local network...".to_string(),
            ))
            .await;
        match discover_one(&config.discovery).await {
            Some(found) => {
                let ip = found.ip.to_string();
                let _ = event_tx.send(AppEvent::HostResolved(ip.clone())).await;
                ip
            }
            None => {
                let _ = event_tx
                    .send(AppEvent::Error(TransferError::NoReceiverFound.to_string()))
                    .await;
                let _ = event_tx.send(AppEvent::BatchFinished { sent, total }).await;
                return;
            }
        }
    } else {
        host
    };

    for file_path in &files {
        let file_name = base_name(file_path);
        let dest = match &dest_filename {
            Some(name) if total == 1 => name.clone(),
            _ => file_name.clone(),
        };

        let _ = event_tx
            .send(AppEvent::Status(format!("Sending {}...", file_name)))
            .await;

        let request = TransferRequest::new(file_path, host.as_str(), port, dest.as_str());
        let progress_tx = event_tx.clone();
        let progress_name = file_name.clone();
        let result = send_request(&request, config, |progress| {
            // Progress ticks may be dropped if the front-end lags behind.
            let _ = progress_tx.try_send(AppEvent::TransferProgress {
                file_name: progress_name.clone(),
                progress,
            });
        })
        .await;

        match result {
            Ok(bytes) => {
                sent += 1;
                let _ = event_tx
                    .send(AppEvent::TransferCompleted {
                        file_name,
                        dest_filename: dest,
                        bytes,
                    })
                    .await;
            }
            Err(e) => {
                tracing::error!("Transfer of {} failed: {}", file_path.display(), e);
                let _ = event_tx.send(AppEvent::Error(e.to_string())).await;
                break;
            }
        }
    }

    let _ = event_tx.send(AppEvent::BatchFinished { sent, total }).await;
}

async fn start_receiver(
    receiver: ReceiverConfig,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Result<(SocketAddr, CancellationToken)> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], receiver.port)))
        .await
        .with_context(|| format!("Cannot bind transfer port {}", receiver.port))?;
    let addr = listener.local_addr()?;
    let cancel = CancellationToken::new();

    match DiscoveryResponder::bind(receiver.discovery_port).await {
        Ok(responder) => {
            tokio::spawn(responder.run(receiver.name.clone(), addr.port(), cancel.clone()));
        }
        Err(e) => {
            // Explicit-address senders can still reach us.
            tracing::warn!(
                "Cannot bind discovery port {}: {}",
                receiver.discovery_port,
                e
            );
            let _ = event_tx
                .send(AppEvent::Status(format!(
                    "Discovery disabled: port {} unavailable",
                    receiver.discovery_port
                )))
                .await;
        }
    }

    tokio::spawn(run_server(
        listener,
        receiver.download_dir,
        receiver.header_timeout,
        event_tx.clone(),
        cancel.clone(),
    ));

    Ok((addr, cancel))
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}
