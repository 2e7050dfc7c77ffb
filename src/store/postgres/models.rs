// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::favorites::Favorite;

#[derive(Queryable, Selectable)]
#[diesel(table_name = super::schema::favorites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct FavoriteRow {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) image: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

impl From<FavoriteRow> for Favorite {
    fn from(row: FavoriteRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            image: row.image,
            created_at: row.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = super::schema::favorites)]
pub(crate) struct NewFavorite<'a> {
    pub(crate) id: &'a str,
    pub(crate) text: &'a str,
    pub(crate) image: Option<&'a str>,
    pub(crate) created_at: DateTime<Utc>,
}

impl<'a> From<&'a Favorite> for NewFavorite<'a> {
    fn from(favorite: &'a Favorite) -> Self {
        Self {
            id: &favorite.id,
            text: &favorite.text,
            image: favorite.image.as_deref(),
            created_at: favorite.created_at,
        }
    }
}
