//! Catalog client talking to the remote JSON API.

use std::fmt::Debug;
use std::future::Future;
use std::str::FromStr;

use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::config::CatalogClientConfig;
use crate::error::FetchError;
use crate::mock::MockClient;
use crate::types::*;
use crate::util::matches_query;

/// Number of items `search` scans when no limit is given.
pub const DEFAULT_SEARCH_LIMIT: u32 = 1000;

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// The complete catalog API interface.
///
/// Every call takes a [CancellationToken]; a cancelled call resolves to
/// [FetchError::Cancelled] without side effects.
///
/// This trait enables alternate implementations:
/// - **HTTP**: REST calls to the catalog service via [`CatalogClient`]
/// - **Mock**: canned in-memory data via [`MockClient`]
pub trait ClientTrait: Send + Sync {
    /// Base URL used to build item references.
    fn base_url(&self) -> &str;

    /// Fetch one page of the full listing.
    fn list_page(
        &self,
        offset: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Page, FetchError>> + Send;

    /// Fetch the detail record of a single item.
    fn get_detail(
        &self,
        key: &ItemKey,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ItemDetail, FetchError>> + Send;

    /// Fetch species metadata of a single item.
    fn get_species(
        &self,
        key: &ItemKey,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<SpeciesMeta, FetchError>> + Send;

    /// Enumerate all categories.
    fn list_categories(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<CategoryRef>, FetchError>> + Send;

    /// List every member of a category in one response.
    fn list_by_category(
        &self,
        category: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<ItemIdentity>, FetchError>> + Send;

    /// Search names among the first `limit` items of the listing.
    ///
    /// The catalog has no search endpoint, so filtering happens client side.
    fn search(
        &self,
        query: &str,
        limit: u32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<ItemIdentity>, FetchError>> + Send {
        async move {
            let page = self.list_page(0, limit, cancel).await?;
            Ok(page
                .items
                .into_iter()
                .filter(|identity| matches_query(&identity.name, query))
                .collect())
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// A client for the catalog service.
///
/// This is a wrapper around a [reqwest::Client] that handles:
/// - HTTP client configuration with timeouts and default headers
/// - Mapping of transport and status failures to [FetchError]
/// - Cancellation of in-flight requests
pub struct CatalogClient {
    http: reqwest::Client,
    base: Url,
    config: CatalogClientConfig,
}

impl Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("catalog_url", &self.config.catalog_url)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Create a new catalog client from configuration.
    pub fn new(config: CatalogClientConfig) -> Result<Self, FetchError> {
        let base = parse_catalog_url(&config.catalog_url)?;
        let http = build_http_client(&config)?;
        Ok(Self { http, base, config })
    }

    /// Get the configured catalog URL.
    pub fn catalog_url(&self) -> &str {
        &self.config.catalog_url
    }

    /// The catalog URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // the base is checked to have a path in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET the endpoint at `path` and decode the JSON body.
    ///
    /// A 404 is reported as [FetchError::NotFound] naming `what`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &[&str],
        query: &[(&str, String)],
        what: impl FnOnce() -> String,
        cancel: &CancellationToken,
    ) -> Result<T, FetchError> {
        let url = self.endpoint(path);
        let timeout = self.config.timeout;

        let request = async {
            let response = self
                .http
                .get(url.clone())
                .query(query)
                .send()
                .await
                .map_err(|err| FetchError::from_transport(err, timeout))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound { what: what() });
            }
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("unknown").to_string(),
                });
            }

            response
                .json::<T>()
                .await
                .map_err(|err| FetchError::from_transport(err, timeout))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%url, "request cancelled");
                Err(FetchError::Cancelled)
            },
            result = request => result,
        }
    }
}

impl ClientTrait for CatalogClient {
    fn base_url(&self) -> &str {
        self.catalog_url()
    }

    #[instrument(skip_all, fields(offset = offset, limit = limit))]
    async fn list_page(
        &self,
        offset: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Page, FetchError> {
        let query = [("offset", offset.to_string()), ("limit", limit.to_string())];
        let response: wire::ListResponse = self
            .get_json(&["pokemon"], &query, || "listing".to_string(), cancel)
            .await?;
        let page = Page::from(response);
        debug!(
            n_items = page.items.len(),
            next = ?page.next,
            "received listing page"
        );
        Ok(page)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get_detail(
        &self,
        key: &ItemKey,
        cancel: &CancellationToken,
    ) -> Result<ItemDetail, FetchError> {
        let detail: wire::Detail = self
            .get_json(
                &["pokemon", &key.to_string()],
                &[],
                || format!("item '{key}'"),
                cancel,
            )
            .await?;
        Ok(detail.into())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get_species(
        &self,
        key: &ItemKey,
        cancel: &CancellationToken,
    ) -> Result<SpeciesMeta, FetchError> {
        let species: wire::Species = self
            .get_json(
                &["pokemon-species", &key.to_string()],
                &[],
                || format!("species '{key}'"),
                cancel,
            )
            .await?;
        Ok(species.into())
    }

    #[instrument(skip_all)]
    async fn list_categories(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<CategoryRef>, FetchError> {
        let response: wire::ListResponse = self
            .get_json(&["type"], &[], || "type listing".to_string(), cancel)
            .await?;
        Ok(response
            .results
            .into_iter()
            .map(CategoryRef::from)
            .collect())
    }

    #[instrument(skip_all, fields(category = %category))]
    async fn list_by_category(
        &self,
        category: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ItemIdentity>, FetchError> {
        let response: wire::CategoryResponse = self
            .get_json(
                &["type", category],
                &[],
                || format!("type '{category}'"),
                cancel,
            )
            .await?;
        let members = response
            .pokemon
            .into_iter()
            .map(|member| ItemIdentity::from(member.pokemon))
            .collect::<Vec<_>>();
        debug!(n_members = members.len(), "received category members");
        Ok(members)
    }
}

// ---------------------------------------------------------------------------
// Client selection
// ---------------------------------------------------------------------------

/// Either an HTTP or an in-memory catalog, chosen at startup.
#[derive(Debug, derive_more::From)]
pub enum Client {
    Catalog(CatalogClient),
    Mock(MockClient),
}

impl ClientTrait for Client {
    fn base_url(&self) -> &str {
        match self {
            Client::Catalog(client) => client.base_url(),
            Client::Mock(client) => client.base_url(),
        }
    }

    async fn list_page(
        &self,
        offset: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Page, FetchError> {
        match self {
            Client::Catalog(client) => client.list_page(offset, limit, cancel).await,
            Client::Mock(client) => client.list_page(offset, limit, cancel).await,
        }
    }

    async fn get_detail(
        &self,
        key: &ItemKey,
        cancel: &CancellationToken,
    ) -> Result<ItemDetail, FetchError> {
        match self {
            Client::Catalog(client) => client.get_detail(key, cancel).await,
            Client::Mock(client) => client.get_detail(key, cancel).await,
        }
    }

    async fn get_species(
        &self,
        key: &ItemKey,
        cancel: &CancellationToken,
    ) -> Result<SpeciesMeta, FetchError> {
        match self {
            Client::Catalog(client) => client.get_species(key, cancel).await,
            Client::Mock(client) => client.get_species(key, cancel).await,
        }
    }

    async fn list_categories(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<CategoryRef>, FetchError> {
        match self {
            Client::Catalog(client) => client.list_categories(cancel).await,
            Client::Mock(client) => client.list_categories(cancel).await,
        }
    }

    async fn list_by_category(
        &self,
        category: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ItemIdentity>, FetchError> {
        match self {
            Client::Catalog(client) => client.list_by_category(category, cancel).await,
            Client::Mock(client) => client.list_by_category(category, cancel).await,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client builder
// ---------------------------------------------------------------------------

fn parse_catalog_url(catalog_url: &str) -> Result<Url, FetchError> {
    let invalid = |reason: &str| FetchError::Network {
        message: format!("invalid catalog URL '{catalog_url}': {reason}"),
    };
    let url = Url::parse(catalog_url).map_err(|e| invalid(&e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL"));
    }
    Ok(url)
}

fn build_http_client(config: &CatalogClientConfig) -> Result<reqwest::Client, FetchError> {
    let invalid = |message: String| FetchError::Network { message };
    let mut headers = HeaderMap::new();

    for (key, value) in &config.extra_headers {
        headers.insert(
            header::HeaderName::from_str(key).map_err(|e| invalid(e.to_string()))?,
            header::HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?,
        );
    }

    debug!(
        catalog_url = %config.catalog_url,
        extra_headers = config.extra_headers.len(),
        timeout = ?config.timeout,
        "building catalog HTTP client"
    );

    let client_builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout);

    let client_builder = if let Some(ref user_agent) = config.user_agent {
        client_builder.user_agent(user_agent)
    } else {
        client_builder
    };

    client_builder.build().map_err(|e| invalid(e.to_string()))
}
