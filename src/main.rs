// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

mod api;
mod cli;
mod config;
mod favorites;
mod rate_limit;
mod server;
mod service;
mod store;

use anyhow::Result;
use api::Favorites;
use clap::Parser;
use cli::Cli;
use config::Configuration;
use env_logger::Env;
use server::Server;
use service::{Event, Notifications, Signals};

async fn process() -> Result<()> {
    Notifications::starting()?;
    let args = Cli::parse();
    let configuration = Configuration::load(args.config.as_deref())?;
    let mut signals = Signals::new()?;
    let settings = configuration.server()?;
    let store = store::open(configuration.storage()?, settings.request_timeout()).await?;
    let mut server = Server::start(settings, Favorites::new(store)).await?;
    log::info!("running");
    Notifications::ready(server.address())?;

    loop {
        match signals.next().await {
            Event::Reload => {
                Notifications::reloading()?;
                log::info!("reloading");
                // storage settings only take effect on restart
                match Configuration::load(args.config.as_deref())
                    .and_then(|configuration| configuration.server())
                {
                    Ok(settings) => server = server.reload(settings).await?,
                    Err(err) => log::error!("keeping previous configuration: {err:#}"),
                }
                Notifications::ready(server.address())?;
            }
            Event::Shutdown => {
                Notifications::stopping()?;
                log::info!("shutting down");
                server.shutdown().await?;
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match process().await {
        Ok(_) => {}
        Err(err) => {
            _ = Notifications::failed(1312, &err.to_string());
            return Err(err);
        }
    }

    Ok(())
}
