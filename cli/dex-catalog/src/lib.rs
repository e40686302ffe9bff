//! HTTP client infrastructure for the remote item catalog.
//!
//! This crate provides:
//! - the [`ClientTrait`] contract every catalog backend satisfies
//! - [`CatalogClient`], the HTTP implementation with timeouts and cancellation
//! - [`MockClient`], an in-memory catalog for offline use and tests
//! - a typed [`FetchError`] and a [`RetryPolicy`] callers may apply
//!
//! ## Usage
//!
//! ```ignore
//! use dex_catalog::{CatalogClient, CatalogClientConfig, ClientTrait};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = CatalogClient::new(CatalogClientConfig::default())?;
//! let page = client.list_page(0, 40, &CancellationToken::new()).await?;
//! ```

mod client;
mod config;
mod error;
mod mock;
mod retry;
mod types;
pub mod util;

#[cfg(any(test, feature = "tests"))]
pub mod fixtures;

pub use client::{CatalogClient, Client, ClientTrait, DEFAULT_SEARCH_LIMIT};
pub use config::{CatalogClientConfig, DEFAULT_CATALOG_URL, DEFAULT_REQUEST_TIMEOUT};
pub use error::FetchError;
pub use mock::{MockCallCounts, MockClient, MockData, MockDataError};
pub use retry::{retry, RetryPolicy};
pub use types::*;
