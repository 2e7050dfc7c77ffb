// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

pub(crate) mod memory;
pub(crate) mod postgres;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tokio::task;

use crate::{config::Storage, favorites::Favorite};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("favorite {0:?} already exists")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

/// Durable collection of favorites, keyed by id.
///
/// Implementations must enforce id uniqueness on their own: `insert` of an
/// id that is already present fails with [`StoreError::Duplicate`].
pub(crate) trait FavoriteStore: Send + Sync {
    /// All favorites, most recently created first.
    fn list(&self) -> Result<Vec<Favorite>, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Favorite>, StoreError>;

    fn insert(&self, favorite: Favorite) -> Result<Favorite, StoreError>;

    /// Removes the favorite with `id`, reporting whether there was one.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

pub(crate) async fn open(storage: Storage, timeout: Duration) -> Result<Arc<dyn FavoriteStore>> {
    Ok(match storage {
        Storage::Memory => {
            log::warn!("using in-memory storage, favorites will not survive a restart");
            Arc::new(memory::MemoryStore::default())
        }
        Storage::Postgres(database) => {
            // pool setup and migrations block on the database
            let store = task::spawn_blocking(move || {
                postgres::PostgresStore::connect(&database, timeout)
            })
            .await??;
            Arc::new(store)
        }
    })
}
