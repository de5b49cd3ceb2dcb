use clap::Parser;
use log::info;
use server::network::Server;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, seeds the starter world and runs the
/// server's event loop until shutdown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Maximum number of concurrent sessions
        #[clap(short, long, default_value = "32")]
        max_sessions: usize,
        /// Bot movement interval in milliseconds
        #[clap(short, long, default_value = "1000")]
        bot_interval_ms: u64,
        /// Skip seeding the starter world with its two bots
        #[clap(long)]
        no_seed: bool,
    }

    env_logger::init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let mut server = Server::new(
        &address,
        Duration::from_millis(args.bot_interval_ms),
        args.max_sessions,
    )
    .await?;

    if !args.no_seed {
        server.seed_starter_world();
    }

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
