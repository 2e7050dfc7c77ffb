// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::{
    net::TcpListener,
    sync::mpsc::{self, Receiver, Sender},
    task::JoinHandle,
};

use crate::{api, config};

#[derive(Debug)]
enum Command {
    Shutdown,
}

/// A running HTTP listener serving the favorites API.
pub(crate) struct Server {
    task: JoinHandle<Result<()>>,
    control: Sender<Command>,
    /// The configured address, which may name port 0.
    listen: SocketAddr,
    address: SocketAddr,
    favorites: api::Favorites,
}

async fn bind(config: &config::Server) -> Result<TcpListener> {
    TcpListener::bind(config.listen())
        .await
        .with_context(|| format!("failed to bind {}", config.listen()))
}

impl Server {
    pub(crate) async fn start(config: config::Server, favorites: api::Favorites) -> Result<Self> {
        let listener = bind(&config).await?;
        Self::spawn(listener, config, favorites)
    }

    fn spawn(
        listener: TcpListener,
        config: config::Server,
        favorites: api::Favorites,
    ) -> Result<Self> {
        let address = listener.local_addr()?;
        log::info!("listening on {address}");

        let app = api::router(&config, favorites.clone());
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            let result = serve(listener, app, rx).await;
            if let Err(ref err) = result {
                log::error!("{err}");
            }
            result
        });

        Ok(Self {
            task,
            control: tx,
            listen: config.listen(),
            address,
            favorites,
        })
    }

    pub(crate) fn address(&self) -> SocketAddr {
        self.address
    }

    /// Replaces this listener with one using `config`, keeping the store.
    ///
    /// The new address is bound before the old listener stops. If it cannot
    /// be bound, the old listener keeps serving with its settings.
    pub(crate) async fn reload(self, config: config::Server) -> Result<Self> {
        log::info!("restarting http server");
        let favorites = self.favorites.clone();

        let listener = match bind(&config).await {
            Ok(listener) => listener,
            // still held by this listener, so it has to go first
            Err(_) if config.listen() == self.listen => {
                self.shutdown().await?;
                return Self::start(config, favorites).await;
            }
            Err(err) => {
                log::error!("keeping previous http server on {}: {err:#}", self.address);
                return Ok(self);
            }
        };

        self.shutdown().await?;
        Self::spawn(listener, config, favorites)
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub(crate) async fn shutdown(self) -> Result<()> {
        log::info!("shutting down http server on {}", self.address);
        if !self.control.is_closed() {
            self.control.send(Command::Shutdown).await?;
        }
        self.task.await??;
        Ok(())
    }
}

async fn serve(listener: TcpListener, app: Router, mut control: Receiver<Command>) -> Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        match control.recv().await {
            Some(Command::Shutdown) | None => log::debug!("http server received shutdown"),
        }
    })
    .await?;

    Ok(())
}
