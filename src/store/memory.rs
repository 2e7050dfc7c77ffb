// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, PoisonError};

use super::{FavoriteStore, StoreError};
use crate::favorites::Favorite;

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    favorites: Mutex<HashMap<String, Favorite>>,
}

impl FavoriteStore for MemoryStore {
    fn list(&self) -> Result<Vec<Favorite>, StoreError> {
        let favorites = self.favorites.lock().unwrap_or_else(PoisonError::into_inner);
        let mut result: Vec<_> = favorites.values().cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(result)
    }

    fn get(&self, id: &str) -> Result<Option<Favorite>, StoreError> {
        Ok(self
            .favorites
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn insert(&self, favorite: Favorite) -> Result<Favorite, StoreError> {
        let mut favorites = self.favorites.lock().unwrap_or_else(PoisonError::into_inner);

        match favorites.entry(favorite.id.clone()) {
            Entry::Occupied(entry) => Err(StoreError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => Ok(entry.insert(favorite).clone()),
        }
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .favorites
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::MemoryStore;
    use crate::favorites::{Candidate, Clock, Favorite};
    use crate::store::{FavoriteStore, StoreError};

    fn favorite(clock: &Clock, id: &str) -> Favorite {
        Candidate {
            id: Some(id.to_string()),
            text: Some(format!("joke {id}")),
            image: None,
        }
        .favorite(clock)
        .unwrap()
    }

    #[test]
    fn insert_and_get() {
        let clock = Clock::default();
        let store = MemoryStore::default();
        let stored = store.insert(favorite(&clock, "1")).unwrap();

        assert_eq!(store.get("1").unwrap(), Some(stored));
        assert_eq!(store.get("2").unwrap(), None);
    }

    #[test]
    fn duplicate_insert_keeps_original() {
        let clock = Clock::default();
        let store = MemoryStore::default();
        let original = store.insert(favorite(&clock, "1")).unwrap();

        let mut again = favorite(&clock, "1");
        again.text = "another joke".to_string();
        assert!(matches!(
            store.insert(again),
            Err(StoreError::Duplicate(id)) if id == "1"
        ));
        assert_eq!(store.list().unwrap(), vec![original]);
    }

    #[test]
    fn list_is_newest_first() {
        let clock = Clock::default();
        let store = MemoryStore::default();
        for id in ["a", "b", "c"] {
            store.insert(favorite(&clock, id)).unwrap();
        }

        let ids: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|favorite| favorite.id)
            .collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn delete_reports_removal() {
        let clock = Clock::default();
        let store = MemoryStore::default();
        store.insert(favorite(&clock, "1")).unwrap();

        assert!(store.delete("1").unwrap());
        assert!(!store.delete("1").unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
