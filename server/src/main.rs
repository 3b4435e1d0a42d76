use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use shared::{DriftPolicy, DEFAULT_HOST, DEFAULT_PORT, TICK_RATE, WORLD_HEIGHT, WORLD_WIDTH};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = TICK_RATE)]
    tick_rate: u32,

    /// Drop late time instead of carrying it into the next tick
    #[arg(long)]
    discard_drift: bool,

    /// Maximum number of concurrent sessions
    #[arg(short, long, default_value_t = 32)]
    max_sessions: usize,

    /// Seconds without traffic before a session is closed, 0 to disable
    #[arg(long, default_value_t = 10)]
    idle_timeout: u64,

    #[arg(long, default_value_t = WORLD_WIDTH)]
    world_width: f32,

    #[arg(long, default_value_t = WORLD_HEIGHT)]
    world_height: f32,

    /// Enemies kept alive at once
    #[arg(short, long, default_value_t = 3)]
    enemies: usize,

    /// Seed for spawn positions
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            addr: format!("{}:{}", self.host, self.port),
            tick_rate: self.tick_rate,
            drift_policy: if self.discard_drift {
                DriftPolicy::Discard
            } else {
                DriftPolicy::Accumulate
            },
            max_sessions: self.max_sessions,
            idle_timeout: (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout)),
            world_width: self.world_width,
            world_height: self.world_height,
            max_enemies: self.enemies,
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.into_config();
    info!(
        "Starting server on {} at {}Hz, up to {} sessions",
        config.addr, config.tick_rate, config.max_sessions
    );

    let mut server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    server.shutdown().await;
    Ok(())
}
