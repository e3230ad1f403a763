mod bootstrap;
mod mover;
mod network;

use clap::Parser;
use log::info;
use shared::{PLAYER_SIZE, WORLD_HEIGHT};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay HTTP origin to connect to
    #[arg(short = 's', long, default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Display name to request when joining
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Patrol speed in world units per second
    #[arg(long, default_value = "200.0")]
    speed: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let bootstrap = bootstrap::BootstrapClient::new(&args.server);
    let session = bootstrap.join(args.name.as_deref()).await?;
    info!("Joined as {} ({})", session.display_name, session.id);

    let connection = network::Connection::open(&bootstrap.ws_url(&session.id)).await?;
    let mover = mover::PatrolMover::new(0.0, (WORLD_HEIGHT - PLAYER_SIZE) / 2.0, args.speed);
    let session_id = session.id.clone();
    let mut client = network::SyncClient::new(session, connection, mover);

    tokio::select! {
        _ = client.run() => {
            info!("Sync loop ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    // Retire the session before dropping the socket so peers get exactly
    // one disconnect notice for us.
    bootstrap.leave(&session_id).await?;
    client.shutdown().await;

    Ok(())
}
