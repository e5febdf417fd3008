//! The channel-driven backend, as a front-end would use it.

use lanbeam_core::{
    AppCommand, AppEvent, DiscoveryConfig, DiscoveryResponder, ReceiverConfig, SenderConfig,
    run_backend,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn start_backend(config: SenderConfig) -> (mpsc::Sender<AppCommand>, mpsc::Receiver<AppEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    let (event_tx, event_rx) = mpsc::channel(1000);
    tokio::spawn(run_backend(cmd_rx, event_tx, config));
    (cmd_tx, event_rx)
}

async fn next_event(rx: &mut mpsc::Receiver<AppEvent>) -> AppEvent {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("Timed out waiting for event")
        .expect("Backend closed")
}

async fn start_receiver(
    cmd_tx: &mpsc::Sender<AppCommand>,
    events: &mut mpsc::Receiver<AppEvent>,
    download_dir: PathBuf,
) -> SocketAddr {
    cmd_tx
        .send(AppCommand::StartReceiver(ReceiverConfig {
            port: 0,
            discovery_port: 0,
            download_dir,
            name: "test-receiver".to_string(),
            ..ReceiverConfig::default()
        }))
        .await
        .unwrap();

    loop {
        if let AppEvent::ReceiverStarted { addr } = next_event(events).await {
            return addr;
        }
    }
}

#[tokio::test]
async fn test_batch_to_live_receiver() {
    let (cmd_tx, mut events) = start_backend(SenderConfig::default());
    let inbox = tempfile::tempdir().unwrap();
    let addr = start_receiver(&cmd_tx, &mut events, inbox.path().to_path_buf()).await;

    let outbox = tempfile::tempdir().unwrap();
    let first = outbox.path().join("one.txt");
    let second = outbox.path().join("two.bin");
    std::fs::write(&first, b"first file").unwrap();
    std::fs::write(&second, vec![9u8; 5000]).unwrap();

    cmd_tx
        .send(AppCommand::SendFiles {
            files: vec![first, second],
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            // Ignored for batches of more than one file
            dest_filename: Some("renamed.txt".to_string()),
        })
        .await
        .unwrap();

    let mut completed = Vec::new();
    let mut received = 0;
    let mut finished = None;
    while finished.is_none() || received < 2 {
        match next_event(&mut events).await {
            AppEvent::TransferCompleted { dest_filename, .. } => completed.push(dest_filename),
            AppEvent::FileReceived { .. } => received += 1,
            AppEvent::BatchFinished { sent, total } => finished = Some((sent, total)),
            AppEvent::Error(e) => panic!("Unexpected error: {}", e),
            _ => {}
        }
    }

    assert_eq!(completed, vec!["one.txt", "two.bin"]);
    assert_eq!(finished, Some((2, 2)));
    assert_eq!(std::fs::read(inbox.path().join("one.txt")).unwrap(), b"first file");
    assert_eq!(std::fs::read(inbox.path().join("two.bin")).unwrap().len(), 5000);

    cmd_tx.send(AppCommand::StopReceiver).await.unwrap();
}

#[tokio::test]
async fn test_single_file_uses_dest_filename() {
    let (cmd_tx, mut events) = start_backend(SenderConfig::default());
    let inbox = tempfile::tempdir().unwrap();
    let addr = start_receiver(&cmd_tx, &mut events, inbox.path().to_path_buf()).await;

    let outbox = tempfile::tempdir().unwrap();
    let file = outbox.path().join("draft.md");
    std::fs::write(&file, b"# notes").unwrap();

    cmd_tx
        .send(AppCommand::SendFiles {
            files: vec![file],
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            dest_filename: Some("final.md".to_string()),
        })
        .await
        .unwrap();

    let mut saw_progress = false;
    let mut received_path = None;
    let mut finished = false;
    while !finished || received_path.is_none() {
        match next_event(&mut events).await {
            AppEvent::TransferProgress { file_name, progress } => {
                assert_eq!(file_name, "draft.md");
                assert_eq!(progress, 100.0);
                saw_progress = true;
            }
            AppEvent::FileReceived { path, .. } => received_path = Some(path),
            AppEvent::BatchFinished { sent, total } => {
                assert_eq!((sent, total), (1, 1));
                finished = true;
            }
            AppEvent::Error(e) => panic!("Unexpected error: {}", e),
            _ => {}
        }
    }

    assert!(saw_progress);
    assert_eq!(received_path, Some(inbox.path().join("final.md")));
}

#[tokio::test]
async fn test_batch_stops_at_first_failure() {
    let (cmd_tx, mut events) = start_backend(SenderConfig::default());
    let inbox = tempfile::tempdir().unwrap();
    let addr = start_receiver(&cmd_tx, &mut events, inbox.path().to_path_buf()).await;

    let outbox = tempfile::tempdir().unwrap();
    let present = outbox.path().join("present.txt");
    std::fs::write(&present, b"ok").unwrap();

    cmd_tx
        .send(AppCommand::SendFiles {
            files: vec![outbox.path().join("missing.txt"), present],
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            dest_filename: None,
        })
        .await
        .unwrap();

    let mut errors = Vec::new();
    loop {
        match next_event(&mut events).await {
            AppEvent::Error(e) => errors.push(e),
            AppEvent::TransferCompleted { file_name, .. } => {
                panic!("{} should not be sent after a failure", file_name)
            }
            AppEvent::BatchFinished { sent, total } => {
                assert_eq!((sent, total), (0, 2));
                break;
            }
            _ => {}
        }
    }

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("missing.txt"));
}

#[tokio::test]
async fn test_auto_host_with_empty_network() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = SenderConfig {
        discovery: DiscoveryConfig::default()
            .with_port(silent.local_addr().unwrap().port())
            .with_targets(vec![Ipv4Addr::LOCALHOST])
            .with_window(Duration::from_millis(200)),
        ..SenderConfig::default()
    };
    let (cmd_tx, mut events) = start_backend(config);

    let outbox = tempfile::tempdir().unwrap();
    let file = outbox.path().join("a.txt");
    std::fs::write(&file, b"a").unwrap();

    cmd_tx
        .send(AppCommand::SendFiles {
            files: vec![file],
            host: "auto".to_string(),
            port: 9999,
            dest_filename: None,
        })
        .await
        .unwrap();

    let mut errors = Vec::new();
    loop {
        match next_event(&mut events).await {
            AppEvent::Error(e) => errors.push(e),
            AppEvent::HostResolved(host) => panic!("Nothing should resolve, got {}", host),
            AppEvent::BatchFinished { sent, total } => {
                assert_eq!((sent, total), (0, 1));
                break;
            }
            _ => {}
        }
    }

    assert_eq!(errors, vec!["No file server found on local network"]);
}

#[tokio::test]
async fn test_auto_host_resolves_then_sends() {
    let responder = DiscoveryResponder::bind(0).await.unwrap();
    let discovery_port = responder.local_addr().unwrap().port();
    let config = SenderConfig {
        discovery: DiscoveryConfig::default()
            .with_port(discovery_port)
            .with_targets(vec![Ipv4Addr::LOCALHOST])
            .with_window(Duration::from_secs(5)),
        ..SenderConfig::default()
    };
    let (cmd_tx, mut events) = start_backend(config);
    let inbox = tempfile::tempdir().unwrap();
    let addr = start_receiver(&cmd_tx, &mut events, inbox.path().to_path_buf()).await;

    let cancel = CancellationToken::new();
    tokio::spawn(responder.run("loopback".to_string(), addr.port(), cancel.clone()));

    let outbox = tempfile::tempdir().unwrap();
    let file = outbox.path().join("auto.txt");
    std::fs::write(&file, b"resolved").unwrap();

    cmd_tx
        .send(AppCommand::SendFiles {
            files: vec![file],
            host: "auto".to_string(),
            port: addr.port(),
            dest_filename: None,
        })
        .await
        .unwrap();

    let mut resolved = None;
    let mut completed = false;
    let mut received = false;
    while !completed || !received {
        match next_event(&mut events).await {
            AppEvent::HostResolved(host) => resolved = Some(host),
            AppEvent::TransferCompleted { dest_filename, .. } => {
                assert_eq!(resolved.as_deref(), Some("127.0.0.1"));
                assert_eq!(dest_filename, "auto.txt");
                completed = true;
            }
            AppEvent::FileReceived { .. } => received = true,
            AppEvent::Error(e) => panic!("Unexpected error: {}", e),
            _ => {}
        }
    }

    assert_eq!(std::fs::read(inbox.path().join("auto.txt")).unwrap(), b"resolved");
    cancel.cancel();
}

#[tokio::test]
async fn test_discover_hosts_reports_empty_list() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = SenderConfig {
        discovery: DiscoveryConfig::default()
            .with_port(silent.local_addr().unwrap().port())
            .with_targets(vec![Ipv4Addr::LOCALHOST])
            .with_window(Duration::from_millis(200)),
        ..SenderConfig::default()
    };
    let (cmd_tx, mut events) = start_backend(config);

    cmd_tx.send(AppCommand::DiscoverHosts).await.unwrap();

    loop {
        if let AppEvent::HostsFound(hosts) = next_event(&mut events).await {
            assert!(hosts.is_empty());
            break;
        }
    }
}

#[tokio::test]
async fn test_stop_receiver_twice() {
    let (cmd_tx, mut events) = start_backend(SenderConfig::default());
    let inbox = tempfile::tempdir().unwrap();
    start_receiver(&cmd_tx, &mut events, inbox.path().to_path_buf()).await;

    cmd_tx.send(AppCommand::StopReceiver).await.unwrap();
    assert!(matches!(next_event(&mut events).await, AppEvent::ReceiverStopped));

    cmd_tx.send(AppCommand::StopReceiver).await.unwrap();
    assert!(matches!(next_event(&mut events).await, AppEvent::Status(_)));
}
