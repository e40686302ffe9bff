//! Data orchestration for the catalog browser.
//!
//! Everything between the catalog client and a presentation layer lives here:
//! the shared detail cache, the persisted favorites and theme, filter and sort
//! state, scroll and debounce scheduling, request cancellation and the
//! [`ListOrchestrator`] that ties them into a single display-ready view.

pub mod cache;
pub mod error;
pub mod favorites;
pub mod filter;
pub mod orchestrator;
pub mod requests;
pub mod scheduler;
pub mod scroll;
pub mod storage;
pub mod theme;

pub use cache::{BatchConfig, Cache, CacheSnapshot, ItemCache, SpeciesCache};
pub use error::{ErrorKind, StorageError};
pub use favorites::{FavoriteEntry, FavoritesStore, NewFavorite};
pub use filter::{CategoryFilter, FilterState, SortKey, SortOrder, Source};
pub use orchestrator::{ListOrchestrator, ListView, OrchestratorConfig, Phase};
pub use requests::RequestManager;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use theme::{Theme, ThemePreference};
