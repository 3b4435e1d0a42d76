use clap::Parser;
use client::input::WanderInput;
use client::network::{Client, ClientConfig, SessionEnd};
use log::{error, info};
use shared::{DriftPolicy, DEFAULT_HOST, DEFAULT_PORT, TICK_RATE};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value_t = format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT))]
    server: String,

    /// Movement reports per second
    #[arg(short, long, default_value_t = TICK_RATE)]
    tick_rate: u32,

    /// Local simulation frames per second
    #[arg(short, long, default_value_t = 60)]
    frame_rate: u32,

    /// Drop late time instead of carrying it into the next tick
    #[arg(long)]
    discard_drift: bool,

    /// Seed for the wandering bot
    #[arg(long)]
    seed: Option<u64>,

    /// Disconnect after this many seconds
    #[arg(long)]
    run_for: Option<u64>,
}

impl Args {
    fn into_config(self) -> ClientConfig {
        ClientConfig {
            server_addr: self.server,
            tick_rate: self.tick_rate,
            drift_policy: if self.discard_drift {
                DriftPolicy::Discard
            } else {
                DriftPolicy::Accumulate
            },
            frame_rate: self.frame_rate,
            idle_timeout: None,
            run_for: self.run_for.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let seed = args.seed;
    let config = args.into_config();
    info!("Connecting to {}", config.server_addr);

    let mut client = Client::connect(config, Box::new(WanderInput::new(seed))).await;

    let end = tokio::select! {
        end = client.run() => end,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, disconnecting");
            client.network().close();
            SessionEnd::Finished
        }
    };

    match end {
        SessionEnd::ConnectFailed(reason) => {
            error!("Could not reach server: {}", reason);
            Err(reason.into())
        }
        SessionEnd::Disconnected(reason) => {
            info!("Session ended: {:?}", reason);
            Ok(())
        }
        SessionEnd::Finished => {
            if let Some(player) = client.game().local_player() {
                info!(
                    "Finished at ({:.1}, {:.1}) with {} health, standing on {} items",
                    player.motion.x,
                    player.motion.y,
                    player.health,
                    client.game().items_underfoot().len()
                );
            }
            Ok(())
        }
    }
}
