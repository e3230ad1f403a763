use clap::Parser;
use log::info;
use server::broadcast::BroadcastRouter;
use server::registry::SessionRegistry;
use server::relay::Relay;
use server::routes::{self, AppState};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Reconciliation cycles per second (at least 1)
    #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    tick_rate: u32,

    /// Maximum number of concurrent sessions
    #[arg(short, long, default_value = "64")]
    max_sessions: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let registry = Arc::new(RwLock::new(SessionRegistry::new(args.max_sessions)));
    let router = Arc::new(BroadcastRouter::new());
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let state = AppState::new(Arc::clone(&registry), Arc::clone(&router), inbound_tx);
    let app = routes::router(state);

    let address = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        "Relay listening on {} (up to {} sessions)",
        address, args.max_sessions
    );

    let mut relay = Relay::new(
        registry,
        router,
        inbound_rx,
        Duration::from_secs_f32(1.0 / args.tick_rate as f32),
    );
    let relay_handle = tokio::spawn(async move {
        relay.run().await;
    });

    // Graceful shutdown: stop accepting, close open connections (which runs
    // each connection's disconnect cleanup), then return.
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        eprintln!("Server error: {}", e);
    }

    // Connections are down; cancel and await the relay so queued envelopes
    // are dropped deliberately rather than leaked mid-cycle.
    relay_handle.abort();
    let _ = relay_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Received Ctrl+C, shutting down gracefully...");
}
