//! Filter and sort state of the list, and the pure functions applying it.
//!
//! [FilterState] round-trips through a URL query string so that a
//! presentation layer can mirror it in its location.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dex_catalog::util::matches_query;
use dex_catalog::{ItemDetail, ItemId, ItemIdentity};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

/// Wait between the last keystroke and applying a text query.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {what} '{value}'")]
pub struct ParseFilterError {
    what: &'static str,
    value: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    #[display("id")]
    Id,
    #[display("name")]
    Name,
    #[display("height")]
    Height,
    #[display("weight")]
    Weight,
}

impl FromStr for SortKey {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(SortKey::Id),
            "name" => Ok(SortKey::Name),
            "height" => Ok(SortKey::Height),
            "weight" => Ok(SortKey::Weight),
            _ => Err(ParseFilterError {
                what: "sort key",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[display("asc")]
    Asc,
    #[display("desc")]
    Desc,
}

impl FromStr for SortOrder {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ParseFilterError {
                what: "sort order",
                value: s.to_string(),
            }),
        }
    }
}

/// Either every category or a single named one.
///
/// Serializes as `"all"` or the category name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(String),
}

impl CategoryFilter {
    pub fn name(&self) -> Option<&str> {
        match self {
            CategoryFilter::All => None,
            CategoryFilter::Only(name) => Some(name),
        }
    }
}

impl From<String> for CategoryFilter {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == "all" {
            CategoryFilter::All
        } else {
            CategoryFilter::Only(trimmed.to_lowercase())
        }
    }
}

impl From<&str> for CategoryFilter {
    fn from(value: &str) -> Self {
        CategoryFilter::from(value.to_string())
    }
}

impl From<CategoryFilter> for String {
    fn from(value: CategoryFilter) -> Self {
        match value {
            CategoryFilter::All => "all".to_string(),
            CategoryFilter::Only(name) => name,
        }
    }
}

impl std::fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name().unwrap_or("all"))
    }
}

/// Where the identities of the list come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Snapshot of the favorites, one page.
    Favorites,
    /// Members of a category, one page.
    Category(String),
    /// The whole catalog, paged on demand.
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub query: String,
    pub category: CategoryFilter,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
    pub favorites_only: bool,
}

impl FilterState {
    /// Favorites take precedence over a category.
    pub fn source(&self) -> Source {
        if self.favorites_only {
            Source::Favorites
        } else if let CategoryFilter::Only(name) = &self.category {
            Source::Category(name.clone())
        } else {
            Source::Catalog
        }
    }

    /// Whether anything but the text query differs from the defaults.
    pub fn has_active_filters(&self) -> bool {
        self.category != CategoryFilter::All
            || self.sort_by != SortKey::default()
            || self.sort_order != SortOrder::default()
            || self.favorites_only
    }

    /// Reset everything but the text query.
    #[must_use]
    pub fn cleared(&self) -> Self {
        Self {
            query: self.query.clone(),
            ..Default::default()
        }
    }

    /// Encode the non-default fields, e.g. `q=char&sortOrder=desc`.
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        if !self.query.is_empty() {
            serializer.append_pair("q", &self.query);
        }
        if let CategoryFilter::Only(name) = &self.category {
            serializer.append_pair("type", name);
        }
        if self.sort_by != SortKey::default() {
            serializer.append_pair("sortBy", &self.sort_by.to_string());
        }
        if self.sort_order != SortOrder::default() {
            serializer.append_pair("sortOrder", &self.sort_order.to_string());
        }
        if self.favorites_only {
            serializer.append_pair("favorites", "true");
        }
        serializer.finish()
    }

    /// Decode a query string, with or without a leading `?`.
    ///
    /// Unknown parameters are ignored and invalid values keep their default.
    pub fn from_query_string(query: &str) -> Self {
        let mut state = Self::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "q" => state.query = value.into_owned(),
                "type" => state.category = CategoryFilter::from(value.as_ref()),
                "sortBy" => state.sort_by = value.parse().unwrap_or_default(),
                "sortOrder" => state.sort_order = value.parse().unwrap_or_default(),
                "favorites" => state.favorites_only = value == "true",
                _ => {},
            }
        }
        state
    }
}

/// Identities whose name contains `query`, in their original order.
///
/// A blank query keeps every identity.
pub fn filter_by_query(identities: &[ItemIdentity], query: &str) -> Vec<ItemIdentity> {
    identities
        .iter()
        .filter(|identity| matches_query(&identity.name, query))
        .cloned()
        .collect()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue<'a> {
    Number(u64),
    Text(&'a str),
}

/// Stable sort of `identities` by `sort_by`.
///
/// Height and weight come from `detail`. An identity without a resolved
/// detail sorts as 0 until its detail arrives, so unresolved items lead an
/// ascending list.
pub fn sort_identities<F>(
    identities: &mut Vec<ItemIdentity>,
    sort_by: SortKey,
    sort_order: SortOrder,
    detail: F,
) where
    F: Fn(ItemId) -> Option<Arc<ItemDetail>>,
{
    let mut keyed: Vec<(SortValue<'_>, usize)> = identities
        .iter()
        .enumerate()
        .map(|(position, identity)| {
            let value = match sort_by {
                SortKey::Id => SortValue::Number(identity.id().map_or(0, |id| id.0)),
                SortKey::Name => SortValue::Text(&identity.name),
                SortKey::Height => SortValue::Number(
                    identity
                        .id()
                        .and_then(&detail)
                        .map_or(0, |detail| u64::from(detail.height)),
                ),
                SortKey::Weight => SortValue::Number(
                    identity
                        .id()
                        .and_then(&detail)
                        .map_or(0, |detail| u64::from(detail.weight)),
                ),
            };
            (value, position)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        let ordering: Ordering = a.cmp(b);
        match sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let order: Vec<usize> = keyed.into_iter().map(|(_, position)| position).collect();
    let mut slots: Vec<Option<ItemIdentity>> = identities.drain(..).map(Some).collect();
    identities.extend(order.into_iter().filter_map(|position| slots[position].take()));
}
