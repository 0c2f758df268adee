use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use log::info;

use chord_dns::query::SystemDns;
use chord_dns::threads::setup;
use chord_dns::utils::cli::Cli;
use chord_dns::utils::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    simple_logger::SimpleLogger::new()
        .env()
        .with_level(args.log_level)
        .init()
        .unwrap();

    let config = match args.config {
        Some(ref path) => Config::from_ini(path)?,
        None => Config::default(),
    };

    let handle = setup::start(args.bind, args.peer, Arc::new(config), Arc::new(SystemDns)).await?;
    info!(
        "Node {} is up at ring position {}",
        handle.node.address, handle.node.id
    );

    handle.wait().await;
    Ok(())
}
