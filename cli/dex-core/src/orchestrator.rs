//! The list state machine.
//!
//! A [ListOrchestrator] turns a [FilterState] into a display-ready list:
//!
//! 1. select the source (favorites, a category or the paged catalog) and load
//!    its identities
//! 2. filter identities by the text query and sort them
//! 3. resolve the details of every identity through the shared [ItemCache],
//!    publishing a new [ListView] as each detail arrives
//!
//! Every call to [ListOrchestrator::set_filter_state] starts a new generation.
//! Starting a generation cancels all requests of the previous one, and results
//! that arrive for an old generation are discarded.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dex_catalog::{
    ClientTrait,
    FetchError,
    ItemDetail,
    ItemId,
    ItemIdentity,
    PageCursor,
    RetryPolicy,
    retry,
};
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cache::{BatchConfig, ItemCache};
use crate::error::ErrorKind;
use crate::favorites::{FavoritesStore, NewFavorite};
use crate::filter::{FilterState, Source, filter_by_query, sort_identities};
use crate::requests::RequestManager;

pub const DEFAULT_PAGE_SIZE: u32 = 40;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Items per catalog page.
    pub page_size: u32,
    pub batch: BatchConfig,
    /// Applied to source listings and page loads.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch: BatchConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum Phase {
    #[default]
    Idle,
    LoadingSource,
    DetailsPending,
    Ready,
    Error,
}

/// What a presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListView {
    /// Resolved details in list order.
    pub items: Vec<Arc<ItemDetail>>,
    pub has_more: bool,
    pub is_loading_more: bool,
    pub error: Option<ErrorKind>,
    pub phase: Phase,
    pub generation: u64,
    /// Identities matching the text query, resolved or not.
    pub total: usize,
    /// Identities whose detail couldn't be resolved.
    pub failed: usize,
}

impl ListView {
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }
}

#[derive(Debug, Default)]
struct State {
    filter: FilterState,
    generation: u64,
    cancel: CancellationToken,
    phase: Phase,
    /// The source `identities` were loaded from, once loaded.
    source: Option<Source>,
    identities: Vec<ItemIdentity>,
    cursor: PageCursor,
    loading_more: bool,
    /// Number of detail resolutions running for this generation.
    resolving: usize,
    failed: HashMap<ItemId, ErrorKind>,
    /// References of identities without a numeric id.
    unresolvable: HashSet<String>,
    error: Option<ErrorKind>,
}

#[derive(Debug)]
pub struct ListOrchestrator<C> {
    cache: Arc<ItemCache<C>>,
    favorites: Arc<FavoritesStore>,
    requests: Arc<RequestManager>,
    request_key: String,
    config: OrchestratorConfig,
    state: Mutex<State>,
    view: watch::Sender<ListView>,
}

impl<C> ListOrchestrator<C>
where
    C: ClientTrait + 'static,
{
    /// Catalog requests go through the client of `cache`.
    pub fn new(
        cache: Arc<ItemCache<C>>,
        favorites: Arc<FavoritesStore>,
        requests: Arc<RequestManager>,
        config: OrchestratorConfig,
    ) -> Self {
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let (view, _) = watch::channel(ListView::default());
        Self {
            cache,
            favorites,
            requests,
            request_key: format!("list-{instance}"),
            config,
            state: Mutex::new(State::default()),
            view,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every published view, starting with the current one.
    pub fn subscribe(&self) -> watch::Receiver<ListView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> ListView {
        self.view.borrow().clone()
    }

    pub fn filter_state(&self) -> FilterState {
        self.lock_state().filter.clone()
    }

    /// Identities of the current source after filtering and sorting.
    pub fn ordered_identities(&self) -> Vec<ItemIdentity> {
        let state = self.lock_state();
        self.ordered(&state)
    }

    pub fn is_favorite(&self, id: ItemId) -> bool {
        self.favorites.is_favorite(id)
    }

    /// Toggle a favorite, returning whether it is a favorite afterwards.
    ///
    /// While only favorites are listed the list is reloaded.
    pub async fn toggle_favorite(&self, id: ItemId, name: &str, image_url: &str) -> bool {
        let is_favorite = self
            .favorites
            .toggle(NewFavorite::new(id, name, image_url));
        let reload = {
            let state = self.lock_state();
            state.filter.favorites_only.then(|| state.filter.clone())
        };
        if let Some(filter) = reload {
            self.set_filter_state(filter).await;
        }
        is_favorite
    }

    /// Apply a new filter state and load the list for it.
    ///
    /// Returns once every detail of the filtered list is resolved, or the
    /// generation was superseded.
    #[instrument(skip_all, fields(filter = %filter.to_query_string()))]
    pub async fn set_filter_state(&self, filter: FilterState) {
        self.load(filter, false).await
    }

    /// Reload the current source from scratch.
    #[instrument(skip_all)]
    pub async fn retry(&self) {
        let filter = self.filter_state();
        self.load(filter, true).await
    }

    /// Cancel all outstanding work of the current generation.
    ///
    /// The view settles on what was loaded so far. A later [Self::load_more]
    /// or [Self::retry] picks up from there.
    pub fn cancel(&self) {
        let mut state = self.lock_state();
        self.requests.cancel(&self.request_key);
        state.cancel.cancel();
        state.loading_more = false;
        state.resolving = 0;
        state.phase = match state.phase {
            Phase::Error => Phase::Error,
            _ if state.source.is_some() => Phase::Ready,
            _ => Phase::Idle,
        };
        debug!(generation = state.generation, phase = %state.phase, "cancelled");
        self.publish(&state);
    }

    async fn load(&self, filter: FilterState, force_reload: bool) {
        let (generation, cancel, reload) = {
            let mut state = self.lock_state();
            let source = filter.source();
            // favorites are a snapshot that may have changed since
            let reload = force_reload
                || source == Source::Favorites
                || state.source.as_ref() != Some(&source);

            let cancel = self.requests.issue(&self.request_key);
            state.generation += 1;
            state.filter = filter;
            state.cancel = cancel.clone();
            state.loading_more = false;
            state.resolving = 0;
            state.error = None;
            state.failed.clear();
            state.unresolvable.clear();
            if reload {
                state.source = None;
                state.identities.clear();
                state.cursor = PageCursor::Offset(0);
                state.phase = Phase::LoadingSource;
            } else {
                state.phase = Phase::DetailsPending;
            }
            debug!(generation = state.generation, reload, "starting generation");
            self.publish(&state);
            (state.generation, cancel, reload)
        };

        if reload && !self.load_source(generation, &cancel).await {
            return;
        }
        self.resolve_details(generation, &cancel).await;
    }

    /// Returns whether identities for `generation` were loaded.
    async fn load_source(&self, generation: u64, cancel: &CancellationToken) -> bool {
        let source = self.lock_state().filter.source();
        let client = self.cache.client();
        let page_size = self.config.page_size;

        let result = match &source {
            Source::Favorites => {
                let identities = self
                    .favorites
                    .list()
                    .into_iter()
                    .map(|favorite| {
                        ItemIdentity::from_id(client.base_url(), favorite.id, favorite.name)
                    })
                    .collect();
                Ok((identities, PageCursor::End))
            },
            Source::Category(name) => {
                retry(&self.config.retry, cancel, || client.list_by_category(name, cancel))
                    .await
                    .map(|identities| (identities, PageCursor::End))
            },
            Source::Catalog => {
                retry(&self.config.retry, cancel, || client.list_page(0, page_size, cancel))
                    .await
                    .map(|page| (page.items, page.next))
            },
        };

        let mut state = self.lock_state();
        if state.generation != generation {
            debug!(generation, "discarding source listing of superseded generation");
            return false;
        }
        match result {
            Ok((identities, cursor)) => {
                debug!(generation, ?source, count = identities.len(), "loaded source");
                state.identities = identities;
                state.cursor = cursor;
                state.source = Some(source);
                state.phase = Phase::DetailsPending;
                self.publish(&state);
                true
            },
            Err(FetchError::Cancelled) => {
                debug!(generation, "source listing cancelled");
                false
            },
            Err(err) => {
                warn!(generation, ?source, %err, "couldn't load source listing");
                state.phase = Phase::Error;
                state.error = Some(ErrorKind::from(&err));
                self.publish(&state);
                false
            },
        }
    }

    /// Load the next catalog page and resolve its details.
    ///
    /// Does nothing and returns `false` while a page is loading, when the
    /// current source isn't the catalog, when the catalog is exhausted or
    /// after the request manager shut down. Returns `false` as well when the
    /// page load itself is cancelled.
    /// A failed page leaves the cursor in place so the page can be retried.
    #[instrument(skip_all)]
    pub async fn load_more(&self) -> bool {
        let (generation, cancel, offset) = {
            let mut state = self.lock_state();
            if state.loading_more {
                debug!("page load already in flight");
                return false;
            }
            if state.source != Some(Source::Catalog) {
                return false;
            }
            let Some(offset) = state.cursor.offset() else {
                return false;
            };
            // resume after an explicit cancel
            if state.cancel.is_cancelled() {
                state.cancel = self.requests.issue(&self.request_key);
                if state.cancel.is_cancelled() {
                    debug!("requests are shut down");
                    return false;
                }
            }
            state.loading_more = true;
            self.publish(&state);
            (state.generation, state.cancel.clone(), offset)
        };

        let client = self.cache.client();
        let page_size = self.config.page_size;
        let result = retry(&self.config.retry, &cancel, || {
            client.list_page(offset, page_size, &cancel)
        })
        .await;

        {
            let mut state = self.lock_state();
            if state.generation != generation {
                debug!(generation, offset, "discarding page of superseded generation");
                return true;
            }
            state.loading_more = false;
            match result {
                Ok(page) => {
                    debug!(offset, count = page.items.len(), "loaded page");
                    state.identities.extend(page.items);
                    state.cursor = page.next;
                    state.error = None;
                    state.phase = Phase::DetailsPending;
                    self.publish(&state);
                },
                Err(FetchError::Cancelled) => {
                    self.publish(&state);
                    return false;
                },
                Err(err) => {
                    warn!(offset, %err, "couldn't load next page");
                    state.phase = Phase::Error;
                    state.error = Some(ErrorKind::from(&err));
                    self.publish(&state);
                    return true;
                },
            }
        }

        self.resolve_details(generation, &cancel).await;
        true
    }

    async fn resolve_details(&self, generation: u64, cancel: &CancellationToken) {
        let pending = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            let pending = self.unresolved(&mut state);
            state.resolving += 1;
            pending
        };

        if !pending.is_empty() {
            debug!(generation, count = pending.len(), "resolving details");
            let results = self
                .cache
                .resolve_many(pending, cancel, self.config.batch.clone());
            futures::pin_mut!(results);

            while let Some((id, result)) = results.next().await {
                let mut state = self.lock_state();
                if state.generation != generation {
                    debug!(generation, "discarding details of superseded generation");
                    return;
                }
                match result {
                    Ok(_) => {},
                    Err(FetchError::Cancelled) => break,
                    Err(err) => {
                        warn!(%id, %err, "couldn't resolve item detail");
                        state.failed.insert(id, ErrorKind::from(&err));
                    },
                }
                self.publish(&state);
            }
        }

        let mut state = self.lock_state();
        if state.generation != generation {
            return;
        }
        state.resolving = state.resolving.saturating_sub(1);
        if state.resolving == 0 && state.phase == Phase::DetailsPending {
            state.phase = Phase::Ready;
        }
        self.publish(&state);
    }

    /// Ids in list order that have neither a fresh detail nor a recorded
    /// failure. Identities without an id are recorded as unresolvable.
    fn unresolved(&self, state: &mut State) -> Vec<ItemId> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for identity in self.ordered(state) {
            match identity.id() {
                Some(id) => {
                    if seen.insert(id)
                        && !state.failed.contains_key(&id)
                        && self.cache.get(id).is_none()
                    {
                        pending.push(id);
                    }
                },
                None => {
                    if state.unresolvable.insert(identity.reference.clone()) {
                        warn!(
                            name = %identity.name,
                            reference = %identity.reference,
                            "identity has no numeric id"
                        );
                    }
                },
            }
        }
        pending
    }

    fn ordered(&self, state: &State) -> Vec<ItemIdentity> {
        let mut identities = filter_by_query(&state.identities, &state.filter.query);
        sort_identities(
            &mut identities,
            state.filter.sort_by,
            state.filter.sort_order,
            |id| self.cache.peek(id),
        );
        identities
    }

    fn publish(&self, state: &State) {
        let ordered = self.ordered(state);
        let items = ordered
            .iter()
            .filter_map(ItemIdentity::id)
            .filter_map(|id| self.cache.peek(id))
            .collect();
        let view = ListView {
            items,
            has_more: state.source == Some(Source::Catalog) && !state.cursor.is_end(),
            is_loading_more: state.loading_more,
            error: state.error,
            phase: state.phase,
            generation: state.generation,
            total: ordered.len(),
            failed: state.failed.len() + state.unresolvable.len(),
        };
        self.view.send_replace(view);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dex_catalog::{MockClient, MockData, fixtures};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cache::DEFAULT_TTL;
    use crate::filter::{CategoryFilter, SEARCH_DEBOUNCE, SortKey, SortOrder};
    use crate::scheduler::DebouncedTask;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            page_size: 4,
            batch: BatchConfig {
                concurrency: 20,
                delay: Duration::ZERO,
            },
            retry: RetryPolicy::no_retry(),
        }
    }

    struct Harness {
        client: Arc<MockClient>,
        favorites: Arc<FavoritesStore>,
        requests: Arc<RequestManager>,
        orchestrator: ListOrchestrator<MockClient>,
    }

    fn harness(client: MockClient) -> Harness {
        harness_with(client, config())
    }

    fn harness_with(client: MockClient, config: OrchestratorConfig) -> Harness {
        let client = Arc::new(client);
        let cache = Arc::new(ItemCache::new(Arc::clone(&client), DEFAULT_TTL));
        let favorites = Arc::new(FavoritesStore::in_memory());
        let requests = Arc::new(RequestManager::new());
        let orchestrator = ListOrchestrator::new(
            cache,
            Arc::clone(&favorites),
            Arc::clone(&requests),
            config,
        );
        Harness {
            client,
            favorites,
            requests,
            orchestrator,
        }
    }

    /// Wait for the first published view matching `accept`.
    async fn first_view(
        views: &mut watch::Receiver<ListView>,
        accept: impl Fn(&ListView) -> bool,
    ) -> ListView {
        loop {
            views.changed().await.unwrap();
            let view = views.borrow_and_update().clone();
            if accept(&view) {
                return view;
            }
        }
    }

    fn sample() -> Harness {
        harness(MockClient::new(fixtures::sample_data()))
    }

    fn slow_sample(latency_ms: u64) -> MockClient {
        MockClient::new(fixtures::sample_data()).with_latency(Duration::from_millis(latency_ms))
    }

    fn ids(values: &[u64]) -> Vec<ItemId> {
        values.iter().copied().map(ItemId).collect()
    }

    fn identity_ids(identities: &[ItemIdentity]) -> Vec<ItemId> {
        identities.iter().filter_map(ItemIdentity::id).collect()
    }

    fn category(name: &str) -> FilterState {
        FilterState {
            category: CategoryFilter::from(name),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn text_query_resolves_only_matching_items() {
        let data = MockData {
            items: vec![
                fixtures::detail(4, "charmander", 6, 85, &["fire"]),
                fixtures::detail(6, "charizard", 17, 905, &["fire", "flying"]),
                fixtures::detail(1, "bulbasaur", 7, 69, &["grass", "poison"]),
            ],
            ..Default::default()
        };
        let Harness {
            client,
            orchestrator,
            ..
        } = harness(MockClient::new(data));

        orchestrator
            .set_filter_state(FilterState {
                query: "char".to_string(),
                ..Default::default()
            })
            .await;

        let names: Vec<_> = orchestrator
            .ordered_identities()
            .into_iter()
            .map(|identity| identity.name)
            .collect();
        assert_eq!(names, ["charmander", "charizard"]);

        let view = orchestrator.view();
        assert_eq!(view.ids(), ids(&[4, 6]));
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.total, 2);
        assert_eq!(view.error, None);
        assert_eq!(client.calls().detail, 2);
    }

    #[tokio::test]
    async fn subscribers_see_the_latest_view() {
        let Harness { orchestrator, .. } = sample();
        let mut views = orchestrator.subscribe();

        orchestrator.set_filter_state(FilterState::default()).await;

        assert!(views.has_changed().unwrap());
        let view = views.borrow_and_update().clone();
        assert_eq!(view.generation, 1);
        assert_eq!(view.ids(), ids(&[1, 2, 3, 4]));
        assert!(view.has_more);
    }

    #[tokio::test]
    async fn changing_the_query_keeps_the_loaded_source() {
        let Harness {
            client,
            orchestrator,
            ..
        } = sample();

        orchestrator.set_filter_state(FilterState::default()).await;
        orchestrator
            .set_filter_state(FilterState {
                query: "saur".to_string(),
                ..Default::default()
            })
            .await;

        assert_eq!(orchestrator.view().ids(), ids(&[1, 2, 3]));
        assert_eq!(client.calls().list_page, 1);
        assert_eq!(client.calls().detail, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_is_not_reentrant() {
        let Harness {
            client,
            orchestrator,
            ..
        } = harness(slow_sample(50));

        orchestrator.set_filter_state(FilterState::default()).await;
        let (first, second) = tokio::join!(orchestrator.load_more(), orchestrator.load_more());

        assert!(first);
        assert!(!second);
        assert_eq!(client.calls().list_page, 2);
        assert_eq!(orchestrator.view().ids(), ids(&[1, 2, 3, 4, 5, 6, 7, 8]));
        assert!(!orchestrator.view().is_loading_more);
    }

    #[tokio::test]
    async fn exhausted_catalog_stays_exhausted() {
        let Harness {
            client,
            orchestrator,
            ..
        } = sample();

        orchestrator.set_filter_state(FilterState::default()).await;
        assert!(orchestrator.load_more().await);
        assert!(orchestrator.view().has_more);
        assert!(orchestrator.load_more().await);

        let view = orchestrator.view();
        assert!(!view.has_more);
        assert_eq!(view.items.len(), 10);

        assert!(!orchestrator.load_more().await);
        assert!(!orchestrator.view().has_more);
        assert_eq!(client.calls().list_page, 3);
    }

    #[tokio::test]
    async fn favorites_source_ignores_catalog_progress() {
        let Harness {
            client,
            favorites,
            orchestrator,
            ..
        } = sample();
        for (id, name) in [(4, "charmander"), (7, "squirtle")] {
            favorites.add(NewFavorite::new(ItemId(id), name, ""));
        }

        orchestrator.set_filter_state(FilterState::default()).await;
        orchestrator.load_more().await;
        orchestrator
            .set_filter_state(FilterState {
                favorites_only: true,
                ..Default::default()
            })
            .await;

        assert_eq!(identity_ids(&orchestrator.ordered_identities()), ids(&[4, 7]));
        let view = orchestrator.view();
        assert_eq!(view.ids(), ids(&[4, 7]));
        assert!(!view.has_more);
        assert!(!orchestrator.load_more().await);
        assert_eq!(client.calls().list_page, 2);
    }

    #[tokio::test]
    async fn toggling_a_favorite_reloads_the_favorites_list() {
        let Harness {
            favorites,
            orchestrator,
            ..
        } = sample();
        favorites.add(NewFavorite::new(ItemId(4), "charmander", ""));
        favorites.add(NewFavorite::new(ItemId(7), "squirtle", ""));
        orchestrator
            .set_filter_state(FilterState {
                favorites_only: true,
                ..Default::default()
            })
            .await;

        assert!(!orchestrator.toggle_favorite(ItemId(4), "charmander", "").await);
        assert!(!orchestrator.is_favorite(ItemId(4)));
        assert_eq!(orchestrator.view().ids(), ids(&[7]));

        assert!(orchestrator.toggle_favorite(ItemId(25), "pikachu", "").await);
        assert_eq!(orchestrator.view().ids(), ids(&[7, 25]));
    }

    #[tokio::test]
    async fn category_source_sorted_by_weight() {
        let Harness {
            client,
            orchestrator,
            ..
        } = sample();

        orchestrator
            .set_filter_state(FilterState {
                sort_by: SortKey::Weight,
                sort_order: SortOrder::Desc,
                ..category("fire")
            })
            .await;

        let view = orchestrator.view();
        assert_eq!(view.ids(), ids(&[6, 5, 4]));
        assert!(!view.has_more);
        assert_eq!(client.calls().by_category, 1);
        assert_eq!(client.calls().list_page, 0);
    }

    #[tokio::test]
    async fn failed_details_are_excluded() {
        let client = MockClient::new(fixtures::sample_data());
        client.fail_detail(ItemId(2), FetchError::NotFound {
            what: "item '2'".to_string(),
        });
        let Harness { orchestrator, .. } = harness(client);

        orchestrator.set_filter_state(FilterState::default()).await;

        let view = orchestrator.view();
        assert_eq!(view.ids(), ids(&[1, 3, 4]));
        assert_eq!(view.failed, 1);
        assert_eq!(view.total, 4);
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.error, None);
    }

    #[tokio::test]
    async fn source_failure_is_recoverable() {
        let client = MockClient::new(fixtures::sample_data());
        client.fail_next_listing(FetchError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        });
        let Harness { orchestrator, .. } = harness(client);

        orchestrator.set_filter_state(FilterState::default()).await;
        let view = orchestrator.view();
        assert_eq!(view.phase, Phase::Error);
        assert_eq!(view.error, Some(ErrorKind::Network));
        assert!(view.items.is_empty());
        assert!(!orchestrator.load_more().await);

        orchestrator.retry().await;
        let view = orchestrator.view();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.error, None);
        assert_eq!(view.ids(), ids(&[1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn failed_page_can_be_retried() {
        let Harness {
            client,
            orchestrator,
            ..
        } = sample();
        orchestrator.set_filter_state(FilterState::default()).await;

        client.fail_next_listing(FetchError::Timeout(Duration::from_secs(10)));
        assert!(orchestrator.load_more().await);
        let view = orchestrator.view();
        assert_eq!(view.phase, Phase::Error);
        assert_eq!(view.error, Some(ErrorKind::Network));
        assert_eq!(view.ids(), ids(&[1, 2, 3, 4]));
        assert!(view.has_more);

        assert!(orchestrator.load_more().await);
        let view = orchestrator.view();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.error, None);
        assert_eq!(view.ids(), ids(&[1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_generation_is_discarded() {
        let Harness {
            client,
            orchestrator,
            ..
        } = harness(slow_sample(100));

        let switch_category = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            orchestrator.set_filter_state(category("water")).await;
        };
        tokio::join!(orchestrator.set_filter_state(category("fire")), switch_category);

        let view = orchestrator.view();
        assert_eq!(view.generation, 2);
        assert_eq!(view.ids(), ids(&[7, 8, 9]));
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.error, None);
        assert_eq!(client.calls().by_category, 2);
        assert_eq!(client.calls().detail, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_settles_the_view() {
        let Harness {
            client,
            orchestrator,
            ..
        } = harness(slow_sample(50));

        // the listing arrives after 50ms, the details would after 100ms
        let cancel_soon = async {
            tokio::time::sleep(Duration::from_millis(70)).await;
            orchestrator.cancel();
        };
        tokio::join!(orchestrator.set_filter_state(FilterState::default()), cancel_soon);

        let view = orchestrator.view();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.error, None);
        assert!(view.items.is_empty());
        assert!(view.has_more);
        assert!(!view.is_loading_more);

        assert!(orchestrator.load_more().await);
        let view = orchestrator.view();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.ids(), ids(&[1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(client.calls().list_page, 2);
    }

    #[tokio::test]
    async fn cancel_before_loading_is_idle() {
        let Harness { orchestrator, .. } = sample();
        orchestrator.cancel();
        let view = orchestrator.view();
        assert_eq!(view.phase, Phase::Idle);
        assert!(!orchestrator.load_more().await);
    }

    #[tokio::test]
    async fn load_more_after_shutdown_does_nothing() {
        let Harness {
            client,
            requests,
            orchestrator,
            ..
        } = sample();
        orchestrator.set_filter_state(FilterState::default()).await;
        requests.shutdown();

        assert!(!orchestrator.load_more().await);
        assert!(!orchestrator.view().is_loading_more);
        assert_eq!(client.calls().list_page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn details_are_published_as_they_arrive() {
        let Harness { orchestrator, .. } = harness_with(
            slow_sample(50),
            OrchestratorConfig {
                batch: BatchConfig {
                    concurrency: 2,
                    delay: Duration::from_millis(100),
                },
                ..config()
            },
        );
        let mut views = orchestrator.subscribe();

        let (_, partial) = tokio::join!(
            orchestrator.set_filter_state(FilterState::default()),
            first_view(&mut views, |view| {
                view.phase == Phase::DetailsPending && !view.items.is_empty()
            }),
        );

        let view = orchestrator.view();
        assert_eq!(view.phase, Phase::Ready);
        assert_eq!(view.ids(), ids(&[1, 2, 3, 4]));
        assert!(partial.items.len() < view.items.len());
        assert_eq!(partial.ids(), view.ids()[..partial.items.len()].to_vec());
        assert_eq!(partial.total, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn weight_order_does_not_depend_on_arrival() {
        let Harness { orchestrator, .. } = harness_with(
            slow_sample(50),
            OrchestratorConfig {
                batch: BatchConfig {
                    concurrency: 2,
                    delay: Duration::from_millis(100),
                },
                ..config()
            },
        );
        let mut views = orchestrator.subscribe();

        // unresolved entries all weigh the same, so details arrive in id order
        let (_, partial) = tokio::join!(
            orchestrator.set_filter_state(FilterState {
                sort_by: SortKey::Weight,
                ..Default::default()
            }),
            first_view(&mut views, |view| {
                view.phase == Phase::DetailsPending && view.items.len() == 2
            }),
        );

        assert_eq!(partial.ids(), ids(&[1, 2]));
        assert_eq!(orchestrator.view().ids(), ids(&[1, 4, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_search_applies_the_last_query() {
        let Harness { orchestrator, .. } = sample();
        let orchestrator = Arc::new(orchestrator);
        let search = DebouncedTask::new(SEARCH_DEBOUNCE);

        for query in ["c", "ch", "char"] {
            let orchestrator = Arc::clone(&orchestrator);
            search.schedule(async move {
                orchestrator
                    .set_filter_state(FilterState {
                        query: query.to_string(),
                        ..Default::default()
                    })
                    .await;
            });
            tokio::time::sleep(SEARCH_DEBOUNCE / 3).await;
        }
        tokio::time::sleep(SEARCH_DEBOUNCE * 2).await;

        let view = orchestrator.view();
        assert_eq!(orchestrator.filter_state().query, "char");
        assert_eq!(view.generation, 1);
        assert_eq!(view.ids(), ids(&[4]));
    }

    #[tokio::test]
    async fn details_are_shared_between_lists() {
        let client = Arc::new(MockClient::new(fixtures::sample_data()));
        let cache = Arc::new(ItemCache::new(Arc::clone(&client), DEFAULT_TTL));
        let favorites = Arc::new(FavoritesStore::in_memory());
        let requests = Arc::new(RequestManager::new());
        let first = ListOrchestrator::new(
            Arc::clone(&cache),
            Arc::clone(&favorites),
            Arc::clone(&requests),
            config(),
        );
        let second = ListOrchestrator::new(cache, favorites, requests, config());

        first.set_filter_state(category("fire")).await;
        second.set_filter_state(FilterState::default()).await;

        assert_eq!(first.view().ids(), ids(&[4, 5, 6]));
        assert_eq!(second.view().ids(), ids(&[1, 2, 3, 4]));
        assert_eq!(client.calls().detail, 6);
    }
}
