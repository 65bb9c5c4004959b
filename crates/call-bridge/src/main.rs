mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use session_journal::{JournalEntry, SessionEvent, SessionJournal};
use stream_bridge::{
    CallStreamTransformer, ListenerConfig, MediaStreamListener, RemoteStreamTransformer,
    StreamConnector, StreamType,
};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref listen) = cli.listen {
        cfg.network.listen_addr = listen.clone();
    }
    if let Some(ref url) = cli.remote_url {
        cfg.remote.url = url.clone();
    }
    if let Some(ref agent_id) = cli.agent_id {
        cfg.remote.agent_id = Some(agent_id.clone());
    }
    if let Some(ref journal) = cli.journal {
        cfg.logging.journal_path = journal.clone();
    }

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!(
        config_file = %cli.config.display(),
        listen = %cfg.network.listen_addr,
        media_path = %cfg.network.media_path,
        "call-bridge starting"
    );

    // 4. Start the session journal.
    let (journal, journal_handle) = SessionJournal::start(&cfg.logging.journal_path)
        .await
        .context("failed to start session journal")?;

    // 5. Build the connector. Transformers are built per call from these
    //    factories, so chunk numbering restarts with every session.
    let endpoint = cfg.remote.endpoint().context("invalid remote configuration")?;
    let connector = StreamConnector::new(StreamType::Bidirectional, endpoint)
        .context("invalid remote configuration")?
        .with_call_transformer(|| CallStreamTransformer)
        .with_remote_transformer(RemoteStreamTransformer::new)
        .with_journal(journal.clone());

    let listen_addr: std::net::SocketAddr = cfg
        .network
        .listen_addr
        .parse()
        .context("invalid listen address")?;

    let listener = MediaStreamListener::new(
        ListenerConfig {
            listen_addr,
            media_path: cfg.network.media_path.clone(),
        },
        connector,
    )
    .with_journal(journal.clone());

    journal
        .record(JournalEntry::new(
            SessionEvent::ServerStarted,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "listen_addr": listen_addr.to_string(),
                "media_path": cfg.network.media_path,
            }),
        ))
        .await;

    // 6. Cancel the root token on ctrl-c or SIGTERM.
    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.cancel();
    });

    // 7. Serve until shutdown; in-flight calls are closed before this returns.
    let result = listener.serve(shutdown).await;

    info!("call-bridge shutting down");

    journal
        .record(JournalEntry::new(
            SessionEvent::ServerStopped,
            serde_json::json!({
                "result": format!("{:?}", result),
            }),
        ))
        .await;

    // Let the journal writer flush before exiting.
    drop(listener);
    drop(journal);
    let _ = journal_handle.await;

    result
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::warn!(%err, "failed to register SIGTERM handler");
                    ctrl_c.await.ok();
                    info!("received SIGINT (ctrl-c)");
                    return;
                }
            };

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (ctrl-c)");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT (ctrl-c)");
    }
}
