//! Syncboard CLI - keep a clipboard in sync with a shared remote profile.
//!
//! The clipboard is a plain text file; the remote is a directory laid out
//! like a clipboard server share (a profile document plus a `file/` folder),
//! so it can live on any mounted network drive.

mod clipboard;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use syncboard_common::ContentSnapshot;
use syncboard_server::{ServerConfig, ServerService};
use syncboard_storage::{DirectoryRemote, RemoteStore};
use syncboard_sync::{
    MemoryClipboard, PushOutcome, SyncConfig, SyncEngine, TracingNotifier, TracingStatus,
};

use crate::clipboard::FileClipboard;

/// How often the clipboard file is checked for changes.
const WATCH_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "syncboard")]
#[command(about = "Syncboard - clipboard synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: <config dir>/syncboard/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize until interrupted.
    Run {
        /// Remote directory.
        #[arg(short, long)]
        remote: PathBuf,

        /// Clipboard text file.
        #[arg(short = 'f', long)]
        clipboard: PathBuf,

        /// Do not upload local changes.
        #[arg(long)]
        no_push: bool,

        /// Do not download remote changes.
        #[arg(long)]
        no_pull: bool,
    },

    /// Show the remote content.
    Status {
        /// Remote directory.
        #[arg(short, long)]
        remote: PathBuf,
    },

    /// Upload text once, with the configured retries.
    Push {
        /// Remote directory.
        #[arg(short, long)]
        remote: PathBuf,

        /// Text to upload.
        #[arg(short, long)]
        text: String,
    },

    /// Serve a remote directory to other devices until interrupted.
    Serve {
        /// Directory to serve.
        #[arg(short, long)]
        root: PathBuf,

        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Port to listen on.
        #[arg(short, long, default_value_t = 5033)]
        port: u16,

        /// Basic authentication user.
        #[arg(short, long, default_value = "admin")]
        user: String,

        /// Basic authentication password.
        #[arg(long)]
        password: String,
    },

    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            remote,
            clipboard,
            no_push,
            no_pull,
        } => cmd_run(config, &remote, &clipboard, no_push, no_pull).await,

        Commands::Status { remote } => cmd_status(config, &remote).await,

        Commands::Push { remote, text } => cmd_push(config, &remote, text).await,

        Commands::Serve {
            root,
            bind,
            port,
            user,
            password,
        } => {
            let server = ServerConfig {
                switch_on: true,
                bind,
                port,
                user_name: user,
                password,
                ..ServerConfig::default()
            };
            cmd_serve(&root, server).await
        }

        Commands::Config => cmd_config(&config),
    }
}

/// Load the configuration from `path`, or from the default location when it
/// exists, or fall back to defaults.
fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    if let Some(path) = path {
        return SyncConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    match dirs::config_dir().map(|dir| dir.join("syncboard").join("config.json")) {
        Some(path) if path.exists() => SyncConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        _ => Ok(SyncConfig::default()),
    }
}

fn open_remote(root: &Path) -> Result<Arc<dyn RemoteStore>> {
    let remote = DirectoryRemote::new(root)
        .with_context(|| format!("Failed to open remote {}", root.display()))?;
    Ok(Arc::new(remote))
}

/// Run both loops until Ctrl-C.
async fn cmd_run(
    mut config: SyncConfig,
    remote: &Path,
    clipboard: &Path,
    no_push: bool,
    no_pull: bool,
) -> Result<()> {
    config.push_enabled &= !no_push;
    config.pull_enabled &= !no_pull;

    let remote = open_remote(remote)?;
    let clipboard = Arc::new(FileClipboard::new(clipboard)?);
    let engine = SyncEngine::new(
        remote,
        clipboard.clone(),
        Arc::new(TracingStatus),
        Arc::new(TracingNotifier),
        config,
    )
    .context("Invalid configuration")?;

    let shutdown = CancellationToken::new();
    let watcher = clipboard.watch(WATCH_INTERVAL, shutdown.clone());
    engine.start();
    info!("Syncing {} (Ctrl-C to stop)", clipboard.path().display());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    shutdown.cancel();
    engine.shutdown().await;
    let _ = watcher.await;
    Ok(())
}

/// Print the remote content.
async fn cmd_status(config: SyncConfig, remote: &Path) -> Result<()> {
    let remote = open_remote(remote)?;
    let token = CancellationToken::new();

    let snapshot = tokio::time::timeout(config.request_timeout, remote.fetch_snapshot(&token))
        .await
        .context("Timed out reading remote")?
        .context("Failed to read remote")?;

    println!("Remote: {}", remote.name());
    println!("  Kind: {}", snapshot.kind());
    println!("  Content: {}", snapshot.describe());
    if let Some(size) = snapshot.size() {
        println!("  Size: {} bytes", size);
    }

    Ok(())
}

/// Upload `text` through the push loop.
async fn cmd_push(config: SyncConfig, remote: &Path, text: String) -> Result<()> {
    let remote = open_remote(remote)?;
    let local = Arc::new(MemoryClipboard::with_content(ContentSnapshot::text(text)));
    let engine = SyncEngine::new(
        remote,
        local,
        Arc::new(TracingStatus),
        Arc::new(TracingNotifier),
        SyncConfig {
            pull_enabled: false,
            ..config
        },
    )
    .context("Invalid configuration")?;

    match engine.push().sync_now().await {
        PushOutcome::Uploaded { attempts } => {
            println!("Uploaded after {} attempt(s).", attempts);
            Ok(())
        }
        PushOutcome::InSync { .. } => {
            println!("Remote already holds this text.");
            Ok(())
        }
        PushOutcome::Failed { attempts } => {
            anyhow::bail!("Upload failed after {} attempt(s)", attempts)
        }
        outcome => anyhow::bail!("Upload did not complete: {:?}", outcome),
    }
}

/// Serve `root` until Ctrl-C.
async fn cmd_serve(root: &Path, config: ServerConfig) -> Result<()> {
    let service = ServerService::new(root, Arc::new(TracingStatus), Arc::new(TracingNotifier));
    service
        .start(config)
        .await
        .context("Failed to start sync server")?;

    if let Some(address) = service.local_addr().await {
        info!("Serving {} on {} (Ctrl-C to stop)", root.display(), address);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    service.stop().await;
    Ok(())
}

/// Print the effective configuration as JSON.
fn cmd_config(config: &SyncConfig) -> Result<()> {
    println!("{}", config.to_json()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncboard_storage::PAYLOAD_DIRNAME;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_remote_uses_directory_layout() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("share");

        let remote = open_remote(&root).unwrap();

        assert_eq!(remote.name(), "directory");
        assert!(root.join(PAYLOAD_DIRNAME).is_dir());
        let token = CancellationToken::new();
        remote.upload(&ContentSnapshot::text("hi"), &token).await.unwrap();
        let fetched = remote.fetch_snapshot(&token).await.unwrap();
        assert_eq!(fetched.as_text(), Some("hi"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(load_config(Some(&temp.path().join("absent.json"))).is_err());
    }
}
