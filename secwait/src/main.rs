//! Secwait - SecHub integration test synchronisation tool
//!
//! Waits until a SecHub/PDS job, the event inspection trace or the
//! auto-cleanup counters reach the expected state
use clap::Parser;
use log::{debug, error};
use sechub_testkit::{SecHubClient, SecHubConfig};
use secwait::{Result, cli, commands};

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();

    // Initialize logging, RUST_LOG wins over --debug
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(&args).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            error!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(args: &cli::Cli) -> Result<String> {
    let config = SecHubConfig::from_env()?;
    debug!("using SecHub server {}", config.server_url);

    let client = SecHubClient::new(config)?;
    commands::execute(&client, args).await
}
