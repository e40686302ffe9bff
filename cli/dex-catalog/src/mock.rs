//! In-memory catalog backed by canned data.
//!
//! [MockClient] serves listing, detail, species and category requests from a
//! [MockData] set, either built in code or loaded from a JSON file.
//! It counts the requests it serves, can fail chosen requests and can delay
//! responses, which makes in-flight behavior observable in tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::ClientTrait;
use crate::error::FetchError;
use crate::types::*;

const MOCK_BASE_URL: &str = "https://catalog.mock/api/v2";

#[derive(Debug, Error)]
pub enum MockDataError {
    #[error("couldn't read mock data file")]
    ReadFile(#[source] std::io::Error),
    #[error("couldn't parse mock data file")]
    Parse(#[source] serde_json::Error),
}

/// Canned catalog content.
///
/// Items are listed in the order given here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockData {
    #[serde(default)]
    pub items: Vec<ItemDetail>,
    #[serde(default)]
    pub species: Vec<SpeciesMeta>,
    /// Category name to member ids.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<ItemId>>,
}

impl MockData {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MockDataError> {
        let contents = std::fs::read_to_string(path).map_err(MockDataError::ReadFile)?;
        serde_json::from_str(&contents).map_err(MockDataError::Parse)
    }
}

/// Number of requests served per endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCallCounts {
    pub list_page: usize,
    pub detail: usize,
    pub species: usize,
    pub categories: usize,
    pub by_category: usize,
}

#[derive(Debug, Default)]
struct Counters {
    list_page: AtomicUsize,
    detail: AtomicUsize,
    species: AtomicUsize,
    categories: AtomicUsize,
    by_category: AtomicUsize,
}

#[derive(Debug, Default)]
struct Failures {
    /// Failures returned by the next listing requests, in order.
    listing: VecDeque<FetchError>,
    /// Failures returned by every detail request for an id.
    detail: HashMap<ItemId, FetchError>,
}

/// A catalog client that answers from memory.
#[derive(Debug)]
pub struct MockClient {
    data: MockData,
    base_url: String,
    latency: Duration,
    counters: Counters,
    failures: Mutex<Failures>,
}

impl MockClient {
    pub fn new(data: MockData) -> Self {
        Self {
            data,
            base_url: MOCK_BASE_URL.to_string(),
            latency: Duration::ZERO,
            counters: Counters::default(),
            failures: Default::default(),
        }
    }

    /// Load canned data from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MockDataError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading mock catalog data");
        Ok(Self::new(MockData::from_file(path)?))
    }

    /// Delay every response by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next listing request (page or category) fail with `err`.
    pub fn fail_next_listing(&self, err: FetchError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.listing.push_back(err);
        }
    }

    /// Make every detail request for `id` fail with `err`.
    pub fn fail_detail(&self, id: ItemId, err: FetchError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.detail.insert(id, err);
        }
    }

    pub fn calls(&self) -> MockCallCounts {
        MockCallCounts {
            list_page: self.counters.list_page.load(Ordering::SeqCst),
            detail: self.counters.detail.load(Ordering::SeqCst),
            species: self.counters.species.load(Ordering::SeqCst),
            categories: self.counters.categories.load(Ordering::SeqCst),
            by_category: self.counters.by_category.load(Ordering::SeqCst),
        }
    }

    pub fn data(&self) -> &MockData {
        &self.data
    }

    fn identity(&self, detail: &ItemDetail) -> ItemIdentity {
        ItemIdentity::from_id(&self.base_url, detail.id, detail.name.clone())
    }

    fn find(&self, key: &ItemKey) -> Option<&ItemDetail> {
        self.data.items.iter().find(|item| match key {
            ItemKey::Id(id) => item.id == *id,
            ItemKey::Name(name) => item.name == *name,
        })
    }

    fn next_listing_failure(&self) -> Option<FetchError> {
        self.failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.listing.pop_front())
    }

    fn detail_failure(&self, key: &ItemKey) -> Option<FetchError> {
        let id = match key {
            ItemKey::Id(id) => *id,
            ItemKey::Name(_) => self.find(key)?.id,
        };
        self.failures
            .lock()
            .ok()
            .and_then(|failures| failures.detail.get(&id).cloned())
    }

    /// Simulate the network round trip.
    async fn respond(&self, cancel: &CancellationToken) -> Result<(), FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if self.latency.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(self.latency) => Ok(()),
        }
    }
}

impl ClientTrait for MockClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list_page(
        &self,
        offset: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Page, FetchError> {
        self.counters.list_page.fetch_add(1, Ordering::SeqCst);
        self.respond(cancel).await?;
        if let Some(err) = self.next_listing_failure() {
            return Err(err);
        }

        let total = self.data.items.len();
        let start = (offset as usize).min(total);
        let end = start.saturating_add(limit as usize).min(total);
        let items = self.data.items[start..end]
            .iter()
            .map(|item| self.identity(item))
            .collect();
        let next = if end < total {
            PageCursor::Offset(end as u32)
        } else {
            PageCursor::End
        };

        Ok(Page {
            items,
            next,
            count: Some(total as u64),
        })
    }

    async fn get_detail(
        &self,
        key: &ItemKey,
        cancel: &CancellationToken,
    ) -> Result<ItemDetail, FetchError> {
        self.counters.detail.fetch_add(1, Ordering::SeqCst);
        self.respond(cancel).await?;
        if let Some(err) = self.detail_failure(key) {
            return Err(err);
        }
        self.find(key).cloned().ok_or_else(|| FetchError::NotFound {
            what: format!("item '{key}'"),
        })
    }

    async fn get_species(
        &self,
        key: &ItemKey,
        cancel: &CancellationToken,
    ) -> Result<SpeciesMeta, FetchError> {
        self.counters.species.fetch_add(1, Ordering::SeqCst);
        self.respond(cancel).await?;
        self.data
            .species
            .iter()
            .find(|species| match key {
                ItemKey::Id(id) => species.id == *id,
                ItemKey::Name(name) => species.name == *name,
            })
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                what: format!("species '{key}'"),
            })
    }

    async fn list_categories(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<CategoryRef>, FetchError> {
        self.counters.categories.fetch_add(1, Ordering::SeqCst);
        self.respond(cancel).await?;
        Ok(self
            .data
            .categories
            .keys()
            .enumerate()
            .map(|(n, name)| CategoryRef {
                name: name.clone(),
                reference: format!("{}/type/{}/", self.base_url, n + 1),
            })
            .collect())
    }

    async fn list_by_category(
        &self,
        category: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ItemIdentity>, FetchError> {
        self.counters.by_category.fetch_add(1, Ordering::SeqCst);
        self.respond(cancel).await?;
        if let Some(err) = self.next_listing_failure() {
            return Err(err);
        }

        let members = self
            .data
            .categories
            .get(category)
            .ok_or_else(|| FetchError::NotFound {
                what: format!("type '{category}'"),
            })?;
        Ok(members
            .iter()
            .filter_map(|id| self.find(&ItemKey::Id(*id)))
            .map(|item| self.identity(item))
            .collect())
    }
}
