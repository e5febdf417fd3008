use crate::AppEvent;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::receiver::receive_file_with_timeout;

/// Accept incoming transfers until `cancel` fires.
///
/// Every connection carries exactly one file and is handled on its own task.
/// Peers that send no header within `header_timeout` are dropped.
pub async fn run_server(
    listener: TcpListener,
    download_dir: PathBuf,
    header_timeout: Duration,
    event_tx: mpsc::Sender<AppEvent>,
    cancel: CancellationToken,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("File server listening on {}", addr);
    }

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => {
                info!("File server stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            },
        };

        let event_tx = event_tx.clone();
        let download_dir = download_dir.clone();

        tokio::spawn(async move {
            let progress_tx = event_tx.clone();
            let result =
                receive_file_with_timeout(stream, &download_dir, header_timeout, |progress| {
                    let _ = progress_tx.try_send(AppEvent::ReceiveProgress {
                        from: peer,
                        progress,
                    });
                })
                .await;

            match result {
                Ok(file) => {
                    let _ = event_tx
                        .send(AppEvent::FileReceived {
                            file_name: file.file_name,
                            path: file.path,
                            size: file.size,
                            from: peer,
                        })
                        .await;
                }
                Err(e) => {
                    warn!("Receive from {} failed: {}", peer, e);
                    let _ = event_tx
                        .send(AppEvent::Error(format!("Receive from {} failed: {}", peer, e)))
                        .await;
                }
            }
        });
    }
}
