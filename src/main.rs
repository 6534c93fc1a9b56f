//! uid-bridge service binary: loads configuration, serves the control API and
//! stops any running job on SIGINT/SIGTERM.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use uid_bridge::log_buffer::init_tracing;
use uid_bridge::{Config, Dispatcher, Error, Result, run_with_shutdown};

#[derive(Debug, Parser)]
#[command(name = "uid-bridge", version, about)]
struct Args {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the API bind address
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides();
    if let Some(bind) = args.bind {
        config.server.api.bind_address = bind;
    }

    let logs = init_tracing(&config.logging);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        agent = %config.agent.endpoint,
        "uid-bridge starting"
    );

    let dispatcher = Arc::new(Dispatcher::with_legacy_tls(config)?);
    let mut server = dispatcher.spawn_api_server(logs);

    tokio::select! {
        joined = &mut server => {
            // The server only returns on failure; stop the engine before exiting
            dispatcher.shutdown().await;
            return match joined {
                Ok(result) => result,
                Err(e) => Err(Error::ApiServerError(e.to_string())),
            };
        }
        result = run_with_shutdown(&dispatcher) => {
            result?;
            server.abort();
        }
    }

    tracing::info!("uid-bridge stopped");
    Ok(())
}
