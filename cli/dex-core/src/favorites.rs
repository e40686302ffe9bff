//! The user's favorite items.
//!
//! Favorites are kept in memory and written through to a [KeyValueStore] as
//! a JSON array after every mutation. If the store can't be read or written
//! the set keeps working from memory and reports itself as degraded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dex_catalog::ItemId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::storage::{KeyValueStore, MemoryStore};

pub const FAVORITES_KEY: &str = "dex-favorites";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub id: ItemId,
    pub name: String,
    pub image_url: String,
    pub added_at: DateTime<Utc>,
}

impl FavoriteEntry {
    fn added_now(favorite: NewFavorite) -> Self {
        Self {
            id: favorite.id,
            name: favorite.name,
            image_url: favorite.image_url,
            added_at: Utc::now(),
        }
    }
}

/// What the caller knows about an item when favoriting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFavorite {
    pub id: ItemId,
    pub name: String,
    pub image_url: String,
}

impl NewFavorite {
    pub fn new(id: ItemId, name: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            image_url: image_url.into(),
        }
    }
}

#[derive(Debug)]
pub struct FavoritesStore {
    storage: Arc<dyn KeyValueStore>,
    entries: Mutex<Vec<FavoriteEntry>>,
    degraded: AtomicBool,
}

impl FavoritesStore {
    /// Load favorites from `storage`.
    ///
    /// Unreadable storage yields an empty, degraded set.
    /// Corrupt content yields an empty set that overwrites it on the next
    /// mutation.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let mut degraded = false;
        let entries = match storage.get(FAVORITES_KEY) {
            Ok(None) => Vec::new(),
            Ok(Some(contents)) => match serde_json::from_str::<Vec<FavoriteEntry>>(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(%err, "stored favorites are corrupt, starting empty");
                    Vec::new()
                },
            },
            Err(err) => {
                warn!(%err, "couldn't read favorites, keeping them in memory only");
                degraded = true;
                Vec::new()
            },
        };
        debug!(count = entries.len(), "loaded favorites");

        Self {
            storage,
            entries: Mutex::new(entries),
            degraded: AtomicBool::new(degraded),
        }
    }

    /// A store that is never persisted beyond the process.
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStore::new()))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FavoriteEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Favorites in the order they were added.
    pub fn list(&self) -> Vec<FavoriteEntry> {
        self.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_favorite(&self, id: ItemId) -> bool {
        self.lock().iter().any(|entry| entry.id == id)
    }

    /// Whether persistence failed and favorites only live in memory.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Returns `false` if the item already is a favorite.
    pub fn add(&self, favorite: NewFavorite) -> bool {
        let mut entries = self.lock();
        if entries.iter().any(|entry| entry.id == favorite.id) {
            return false;
        }
        entries.push(FavoriteEntry::added_now(favorite));
        self.persist(&entries);
        true
    }

    /// Returns `false` if the item wasn't a favorite.
    pub fn remove(&self, id: ItemId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return false;
        }
        self.persist(&entries);
        true
    }

    /// Returns whether the item is a favorite afterwards.
    pub fn toggle(&self, favorite: NewFavorite) -> bool {
        let mut entries = self.lock();
        let is_favorite = match entries.iter().position(|entry| entry.id == favorite.id) {
            Some(position) => {
                entries.remove(position);
                false
            },
            None => {
                entries.push(FavoriteEntry::added_now(favorite));
                true
            },
        };
        self.persist(&entries);
        is_favorite
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        if self.is_degraded() {
            return;
        }
        if let Err(err) = self.storage.remove(FAVORITES_KEY) {
            self.degrade(&err);
        }
    }

    /// Called with the entries lock held, so writes happen in mutation order.
    fn persist(&self, entries: &[FavoriteEntry]) {
        if self.is_degraded() {
            debug!("favorites storage is degraded, not persisting");
            return;
        }
        let result = serde_json::to_string(entries)
            .map_err(StorageError::Serialize)
            .and_then(|contents| self.storage.set(FAVORITES_KEY, &contents));
        if let Err(err) = result {
            self.degrade(&err);
        }
    }

    fn degrade(&self, err: &StorageError) {
        warn!(%err, "couldn't persist favorites, keeping them in memory only");
        self.degraded.store(true, Ordering::SeqCst);
    }
}
