use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use lanbeam_core::{
    AUTO_HOST, AppCommand, AppEvent, DISCOVERY_PORT, DiscoveryConfig, ReceiverConfig,
    SenderConfig, TRANSFER_PORT, discover_all, discover_one, run_backend,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lanbeam", version, about = "Send files to a receiver on the local network")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send files one after another to a receiver
    Send {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Receiver address, or "auto" to discover one
        #[arg(long, default_value = AUTO_HOST)]
        host: String,
        #[arg(short, long, default_value_t = TRANSFER_PORT)]
        port: u16,
        /// Name to store the file under (single file only)
        #[arg(long = "as", value_name = "NAME")]
        dest: Option<String>,
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        discovery_port: u16,
    },
    /// List receivers on the local network
    Discover {
        /// Stop at the first receiver that answers
        #[arg(long)]
        one: bool,
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        port: u16,
        #[arg(long, default_value_t = 3000)]
        window_ms: u64,
    },
    /// Accept incoming files until Ctrl-C
    Receive {
        #[arg(short, long, default_value_t = TRANSFER_PORT)]
        port: u16,
        #[arg(long, default_value_t = DISCOVERY_PORT)]
        discovery_port: u16,
        /// Where received files are written (default: ~/lanbeam)
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Name announced to senders (default: hostname)
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Send {
            files,
            host,
            port,
            dest,
            discovery_port,
        } => {
            let config = SenderConfig {
                discovery: DiscoveryConfig::default().with_port(discovery_port),
                ..SenderConfig::default()
            };
            send(config, files, host, port, dest).await
        }
        Command::Discover {
            one,
            port,
            window_ms,
        } => {
            let config = DiscoveryConfig::default()
                .with_port(port)
                .with_window(Duration::from_millis(window_ms));
            discover(&config, one).await
        }
        Command::Receive {
            port,
            discovery_port,
            dir,
            name,
        } => {
            let defaults = ReceiverConfig::default();
            let config = ReceiverConfig {
                port,
                discovery_port,
                download_dir: dir.unwrap_or(defaults.download_dir),
                name: name.unwrap_or(defaults.name),
                header_timeout: defaults.header_timeout,
            };
            receive(config).await
        }
    }
}

fn spawn_backend(config: SenderConfig) -> (mpsc::Sender<AppCommand>, mpsc::Receiver<AppEvent>) {
    // Bounded with capacity 1000 for backpressure
    let (tx_cmd, rx_cmd) = mpsc::channel::<AppCommand>(1000);
    let (tx_event, rx_event) = mpsc::channel::<AppEvent>(1000);
    tokio::spawn(run_backend(rx_cmd, tx_event, config));
    (tx_cmd, rx_event)
}

async fn send(
    config: SenderConfig,
    files: Vec<PathBuf>,
    host: String,
    port: u16,
    dest_filename: Option<String>,
) -> Result<()> {
    let (tx_cmd, mut rx_event) = spawn_backend(config);
    tx_cmd
        .send(AppCommand::SendFiles {
            files,
            host,
            port,
            dest_filename,
        })
        .await?;

    let mut failed = false;
    while let Some(event) = rx_event.recv().await {
        match event {
            AppEvent::Status(msg) => println!("{}", msg),
            AppEvent::HostResolved(host) => println!("Discovered host: {}", host),
            AppEvent::TransferProgress {
                file_name,
                progress,
            } => {
                print!("\rSending {}... {:.1}%", file_name, progress);
                let _ = std::io::stdout().flush();
            }
            AppEvent::TransferCompleted {
                dest_filename,
                bytes,
                ..
            } => println!("\nFile sent successfully as '{}' ({} bytes)", dest_filename, bytes),
            AppEvent::Error(e) => {
                eprintln!("\nError: {}", e);
                failed = true;
            }
            AppEvent::BatchFinished { sent, total } => {
                println!("{}/{} files sent", sent, total);
                break;
            }
            _ => {}
        }
    }

    if failed {
        bail!("Failed to send file");
    }
    Ok(())
}

async fn discover(config: &DiscoveryConfig, one: bool) -> Result<()> {
    println!("Scanning for hosts on local network...");

    let hosts = if one {
        discover_one(config).await.into_iter().collect()
    } else {
        discover_all(config).await
    };

    if hosts.is_empty() {
        println!("No file servers found on the local network.");
        if one {
            bail!("No file server found");
        }
        return Ok(());
    }

    for host in hosts {
        match (host.name, host.transfer_port) {
            (Some(name), Some(port)) => println!("{}\t{} (port {})", host.ip, name, port),
            _ => println!("{}", host.ip),
        }
    }
    Ok(())
}

async fn receive(config: ReceiverConfig) -> Result<()> {
    let (tx_cmd, mut rx_event) = spawn_backend(SenderConfig::default());
    let download_dir = config.download_dir.clone();
    tx_cmd.send(AppCommand::StartReceiver(config)).await?;

    let mut started = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tx_cmd.send(AppCommand::StopReceiver).await?;
            }
            event = rx_event.recv() => match event {
                Some(AppEvent::ReceiverStarted { addr }) => {
                    started = true;
                    println!("Listening on {}, saving to {}", addr, download_dir.display());
                }
                Some(AppEvent::FileReceived { file_name, size, from, .. }) => {
                    println!("Received '{}' ({} bytes) from {}", file_name, size, from);
                }
                Some(AppEvent::Status(msg)) => println!("{}", msg),
                Some(AppEvent::Error(e)) if !started => bail!(e),
                Some(AppEvent::Error(e)) => eprintln!("Error: {}", e),
                Some(AppEvent::ReceiverStopped) | None => break,
                Some(_) => {}
            },
        }
    }

    Ok(())
}
