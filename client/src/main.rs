use clap::Parser;
use client::input::ScriptedInput;
use client::network::Client;
use client::session::ClientSession;
use client::world::LoggingWorld;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Seconds per lockstep tick
    #[arg(short, long, default_value_t = shared::DEFAULT_TICK_INTERVAL)]
    tick_interval: f32,

    /// Local movement scale applied to frame input
    #[arg(short, long, default_value_t = shared::DEFAULT_MOVE_SPEED)]
    move_speed: f32,

    /// Replay the recorded frame history locally after leaving the room
    #[arg(long)]
    replay: bool,
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
    info!("Press Ctrl+C to leave the room");

    let join_token: u64 = rand::random();
    let mut session = ClientSession::new(
        LoggingWorld::new(),
        Box::new(ScriptedInput::square_walk()),
        join_token,
    );
    session.set_move_speed(args.move_speed);

    let mut client = Client::new(&args.server, session, args.tick_interval, args.replay).await?;

    client.run().await?;

    Ok(())
}
