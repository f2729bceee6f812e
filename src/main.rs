//! Console client: reads commands from stdin, one per line.
//!
//! ```text
//! login {host:port} {username} {password}
//! join {game_name}
//! exit {game_name}
//! report {file}
//! summary {game_name} {user} {file}
//! logout
//! ```

use anyhow::Context;
use clap::Parser;

use stomp_gameday::client::{stdout_sink, Client};
use stomp_gameday::config::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_STOMP_HOST};
use stomp_gameday::{ClientConfig, StompProtocol, TcpTransport};

#[derive(Parser, Debug)]
#[command(name = "stomp-gameday")]
#[command(version)]
#[command(about = "Report and follow live game events over STOMP")]
struct Cli {
    /// Virtual host sent in the CONNECT frame
    #[arg(long, default_value = DEFAULT_STOMP_HOST)]
    stomp_host: String,

    /// Largest inbound frame accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Log protocol traffic to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = ClientConfig::new()
        .with_stomp_host(cli.stomp_host)
        .with_max_frame_size(cli.max_frame_size);
    log::debug!("starting with {:?}", config);

    let transport = TcpTransport::new(config.max_frame_size);
    let mut client = Client::new(StompProtocol::new(transport, config), stdout_sink());

    let stdin = std::io::stdin();
    client
        .run(stdin.lock())
        .context("failed to read commands from stdin")?;
    Ok(())
}
