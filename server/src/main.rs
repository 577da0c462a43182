use clap::Parser;
use log::info;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Seconds per lockstep tick
    #[arg(short, long, default_value_t = shared::DEFAULT_TICK_INTERVAL)]
    tick_interval: f32,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value = "5")]
    connection_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    info!(
        "Starting lockstep server on {} ({}s per tick)",
        address, args.tick_interval
    );

    let mut server = Server::new(
        &address,
        args.tick_interval,
        Duration::from_secs(args.connection_timeout),
    )
    .await?;

    server.run().await?;

    Ok(())
}
