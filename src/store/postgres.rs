// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

pub(super) mod models;
pub(super) mod schema;

use std::error::Error;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use diesel::{
    PgConnection,
    pg::Pg,
    prelude::*,
    r2d2::{ConnectionManager, Pool, PooledConnection},
    result::DatabaseErrorKind,
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use super::{FavoriteStore, StoreError};
use crate::{config::Database, favorites::Favorite};
use models::{FavoriteRow, NewFavorite};
use schema::favorites;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn run_migrations(
    connection: &mut impl MigrationHarness<Pg>,
) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    connection.run_pending_migrations(MIGRATIONS)?;

    Ok(())
}

pub(crate) struct PostgresStore {
    pool: Pool<ConnectionManager<PgConnection>>,
}

impl PostgresStore {
    /// Opens a connection pool and brings the schema up to date.
    ///
    /// `timeout` bounds every connection checkout.
    pub(crate) fn connect(database: &Database, timeout: Duration) -> Result<Self> {
        let manager = ConnectionManager::<PgConnection>::new(database.url());
        let pool = Pool::builder()
            .max_size(database.pool_size())
            .connection_timeout(timeout)
            .build(manager)
            .context("failed to connect to database")?;

        let mut connection = pool.get()?;
        run_migrations(&mut *connection).map_err(|err| anyhow!(err.to_string()))?;
        log::info!("database schema is up to date");

        Ok(Self { pool })
    }

    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        Ok(self.pool.get()?)
    }
}

impl FavoriteStore for PostgresStore {
    fn list(&self) -> Result<Vec<Favorite>, StoreError> {
        let rows = favorites::table
            .order(favorites::created_at.desc())
            .select(FavoriteRow::as_select())
            .load(&mut self.connection()?)?;

        Ok(rows.into_iter().map(Favorite::from).collect())
    }

    fn get(&self, id: &str) -> Result<Option<Favorite>, StoreError> {
        let row = favorites::table
            .find(id)
            .select(FavoriteRow::as_select())
            .first(&mut self.connection()?)
            .optional()?;

        Ok(row.map(Favorite::from))
    }

    fn insert(&self, favorite: Favorite) -> Result<Favorite, StoreError> {
        diesel::insert_into(favorites::table)
            .values(NewFavorite::from(&favorite))
            .returning(FavoriteRow::as_returning())
            .get_result(&mut self.connection()?)
            .map(Favorite::from)
            .map_err(|err| match err {
                diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    StoreError::Duplicate(favorite.id.clone())
                }
                err => err.into(),
            })
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed =
            diesel::delete(favorites::table.find(id)).execute(&mut self.connection()?)?;

        Ok(removed > 0)
    }
}

#[cfg(test)]
mod test {
    use std::env;
    use std::time::Duration;

    use chrono::Utc;
    use test_log::test;

    use super::PostgresStore;
    use crate::config::Database;
    use crate::favorites::{Candidate, Clock};
    use crate::store::{FavoriteStore, StoreError};

    const DATABASE_URL: &str = "JOKEKEEPER_TEST_DATABASE_URL";

    #[test]
    fn round_trip_against_live_database() {
        let Ok(url) = env::var(DATABASE_URL) else {
            log::info!("{DATABASE_URL} is not set, skipping");
            return;
        };
        let database = Database::for_tests(url);
        let store = PostgresStore::connect(&database, Duration::from_secs(5)).unwrap();
        let clock = Clock::default();
        let id = format!("test-{}", Utc::now().timestamp_micros());

        let favorite = Candidate {
            id: Some(id.clone()),
            text: Some("Chuck Norris counted to infinity twice.".to_string()),
            image: Some("http://x/img.png".to_string()),
        }
        .favorite(&clock)
        .unwrap();

        let stored = store.insert(favorite.clone()).unwrap();
        assert_eq!(stored, favorite);
        assert!(matches!(
            store.insert(favorite.clone()),
            Err(StoreError::Duplicate(duplicate)) if duplicate == id
        ));
        assert_eq!(store.get(&id).unwrap(), Some(favorite));
        assert_eq!(
            store
                .list()
                .unwrap()
                .iter()
                .filter(|favorite| favorite.id == id)
                .count(),
            1
        );

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert_eq!(store.get(&id).unwrap(), None);
    }
}
