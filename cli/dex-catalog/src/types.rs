//! Catalog interaction types.
//!
//! The public types are the domain model shared by every consumer.
//! The `wire` module mirrors the JSON documents served by the catalog and is
//! converted into the domain model right after decoding.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::util::{item_id_from_reference, normalize_flavor_text};

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Stable, globally unique numeric identifier of a catalog item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    derive_more::Display,
    derive_more::From,
    derive_more::FromStr,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ItemId(pub u64);

/// How a single item is addressed on the detail endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Id(ItemId),
    Name(String),
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKey::Id(id) => write!(f, "{id}"),
            ItemKey::Name(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for ItemKey {
    type Err = std::convert::Infallible;

    /// Numeric input addresses an id, anything else a lowercased name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<u64>() {
            Ok(id) => ItemKey::Id(ItemId(id)),
            Err(_) => ItemKey::Name(s.to_lowercase()),
        })
    }
}

impl From<ItemId> for ItemKey {
    fn from(id: ItemId) -> Self {
        ItemKey::Id(id)
    }
}

/// Minimal reference to a catalog entry as returned by listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemIdentity {
    pub name: String,
    /// Locator of the detail record, ending in `/<id>/`.
    pub reference: String,
}

impl ItemIdentity {
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
        }
    }

    /// Build the identity of an item known only by id and name.
    pub fn from_id(base_url: &str, id: ItemId, name: impl Into<String>) -> Self {
        Self::new(
            name,
            format!("{}/pokemon/{id}/", base_url.trim_end_matches('/')),
        )
    }

    /// The numeric id encoded in the reference, if any.
    pub fn id(&self) -> Option<ItemId> {
        item_id_from_reference(&self.reference)
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Position in the incremental catalog listing.
///
/// Once [PageCursor::End] is reached the listing never resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageCursor {
    Offset(u32),
    #[default]
    End,
}

impl PageCursor {
    /// Parse the `offset` parameter out of a "next page" link.
    ///
    /// A missing link, an unparsable link or a link without `offset` all
    /// mark the end of the listing.
    pub fn from_next_link(next: Option<&str>) -> Self {
        let Some(next) = next else {
            return PageCursor::End;
        };
        let Ok(url) = Url::parse(next) else {
            return PageCursor::End;
        };
        url.query_pairs()
            .find(|(key, _)| key == "offset")
            .and_then(|(_, value)| value.parse().ok())
            .map_or(PageCursor::End, PageCursor::Offset)
    }

    pub fn offset(&self) -> Option<u32> {
        match self {
            PageCursor::Offset(offset) => Some(*offset),
            PageCursor::End => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, PageCursor::End)
    }
}

/// One page of the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<ItemIdentity>,
    pub next: PageCursor,
    /// Total number of items in the catalog, as reported by the server.
    pub count: Option<u64>,
}

// ---------------------------------------------------------------------------
// Detail records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub slot: u8,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityRef {
    pub slot: u8,
    pub name: String,
    #[serde(default)]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatValue {
    pub name: String,
    pub base_value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprites {
    pub front_default: Option<String>,
    pub front_shiny: Option<String>,
    pub official_artwork: Option<String>,
    pub official_artwork_shiny: Option<String>,
}

/// Fully resolved attributes of one catalog item.
///
/// Detail content for an id never changes within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub id: ItemId,
    pub name: String,
    /// Height in decimetres.
    pub height: u32,
    /// Weight in hectograms.
    pub weight: u32,
    /// Ordered by slot.
    pub types: Vec<TypeRef>,
    /// Ordered by slot.
    pub abilities: Vec<AbilityRef>,
    pub stats: Vec<StatValue>,
    pub base_experience: Option<u32>,
    #[serde(default)]
    pub sprites: Sprites,
}

impl ItemDetail {
    pub fn total_stats(&self) -> u32 {
        self.stats.iter().map(|stat| stat.base_value).sum()
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.iter().any(|t| t.name == name)
    }
}

/// Descriptive metadata about the species of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesMeta {
    pub id: ItemId,
    pub name: String,
    /// English description with whitespace normalized.
    pub description: Option<String>,
    /// English genus, e.g. "Seed Pokémon".
    pub genus: Option<String>,
    #[serde(default)]
    pub is_legendary: bool,
    #[serde(default)]
    pub is_mythical: bool,
}

/// A category (type) the catalog can be filtered by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,
    pub reference: String,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

pub(crate) mod wire {
    use serde::Deserialize;

    use super::*;

    const ENGLISH: &str = "en";

    #[derive(Debug, Deserialize)]
    pub struct NamedResource {
        pub name: String,
        pub url: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct ListResponse {
        pub count: Option<u64>,
        pub next: Option<String>,
        pub results: Vec<NamedResource>,
    }

    impl From<ListResponse> for Page {
        fn from(response: ListResponse) -> Self {
            Page {
                next: PageCursor::from_next_link(response.next.as_deref()),
                count: response.count,
                items: response.results.into_iter().map(ItemIdentity::from).collect(),
            }
        }
    }

    impl From<NamedResource> for ItemIdentity {
        fn from(resource: NamedResource) -> Self {
            ItemIdentity::new(resource.name, resource.url)
        }
    }

    impl From<NamedResource> for CategoryRef {
        fn from(resource: NamedResource) -> Self {
            CategoryRef {
                name: resource.name,
                reference: resource.url,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct CategoryMember {
        pub pokemon: NamedResource,
    }

    #[derive(Debug, Deserialize)]
    pub struct CategoryResponse {
        pub pokemon: Vec<CategoryMember>,
    }

    #[derive(Debug, Deserialize)]
    pub struct TypeSlot {
        pub slot: u8,
        #[serde(rename = "type")]
        pub type_: NamedResource,
    }

    #[derive(Debug, Deserialize)]
    pub struct AbilitySlot {
        pub slot: u8,
        pub is_hidden: bool,
        pub ability: NamedResource,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stat {
        pub base_stat: u32,
        pub stat: NamedResource,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct ArtworkSprites {
        pub front_default: Option<String>,
        pub front_shiny: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct OtherSprites {
        #[serde(rename = "official-artwork", default)]
        pub official_artwork: ArtworkSprites,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct SpriteSet {
        pub front_default: Option<String>,
        pub front_shiny: Option<String>,
        #[serde(default)]
        pub other: OtherSprites,
    }

    #[derive(Debug, Deserialize)]
    pub struct Detail {
        pub id: u64,
        pub name: String,
        pub height: u32,
        pub weight: u32,
        pub base_experience: Option<u32>,
        #[serde(default)]
        pub types: Vec<TypeSlot>,
        #[serde(default)]
        pub abilities: Vec<AbilitySlot>,
        #[serde(default)]
        pub stats: Vec<Stat>,
        #[serde(default)]
        pub sprites: SpriteSet,
    }

    impl From<Detail> for ItemDetail {
        fn from(detail: Detail) -> Self {
            let mut types = detail
                .types
                .into_iter()
                .map(|slot| TypeRef {
                    slot: slot.slot,
                    name: slot.type_.name,
                })
                .collect::<Vec<_>>();
            types.sort_by_key(|t| t.slot);

            let mut abilities = detail
                .abilities
                .into_iter()
                .map(|slot| AbilityRef {
                    slot: slot.slot,
                    name: slot.ability.name,
                    is_hidden: slot.is_hidden,
                })
                .collect::<Vec<_>>();
            abilities.sort_by_key(|a| a.slot);

            ItemDetail {
                id: ItemId(detail.id),
                name: detail.name,
                height: detail.height,
                weight: detail.weight,
                types,
                abilities,
                stats: detail
                    .stats
                    .into_iter()
                    .map(|stat| StatValue {
                        name: stat.stat.name,
                        base_value: stat.base_stat,
                    })
                    .collect(),
                base_experience: detail.base_experience,
                sprites: Sprites {
                    front_default: detail.sprites.front_default,
                    front_shiny: detail.sprites.front_shiny,
                    official_artwork: detail.sprites.other.official_artwork.front_default,
                    official_artwork_shiny: detail.sprites.other.official_artwork.front_shiny,
                },
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct Language {
        pub name: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct FlavorText {
        pub flavor_text: String,
        pub language: Language,
    }

    #[derive(Debug, Deserialize)]
    pub struct Genus {
        pub genus: String,
        pub language: Language,
    }

    #[derive(Debug, Deserialize)]
    pub struct Species {
        pub id: u64,
        pub name: String,
        #[serde(default)]
        pub flavor_text_entries: Vec<FlavorText>,
        #[serde(default)]
        pub genera: Vec<Genus>,
        #[serde(default)]
        pub is_legendary: bool,
        #[serde(default)]
        pub is_mythical: bool,
    }

    impl From<Species> for SpeciesMeta {
        fn from(species: Species) -> Self {
            let description = species
                .flavor_text_entries
                .iter()
                .find(|entry| entry.language.name == ENGLISH)
                .map(|entry| normalize_flavor_text(&entry.flavor_text));
            let genus = species
                .genera
                .into_iter()
                .find(|genus| genus.language.name == ENGLISH)
                .map(|genus| genus.genus);
            SpeciesMeta {
                id: ItemId(species.id),
                name: species.name,
                description,
                genus,
                is_legendary: species.is_legendary,
                is_mythical: species.is_mythical,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn cursor_from_next_link() {
        assert_eq!(
            PageCursor::from_next_link(Some(
                "https://pokeapi.co/api/v2/pokemon?offset=40&limit=40"
            )),
            PageCursor::Offset(40)
        );
        assert_eq!(PageCursor::from_next_link(None), PageCursor::End);
        assert_eq!(
            PageCursor::from_next_link(Some("https://pokeapi.co/api/v2/pokemon?limit=40")),
            PageCursor::End
        );
        assert_eq!(PageCursor::from_next_link(Some("not a url")), PageCursor::End);
    }

    #[test]
    fn item_key_parses_ids_and_names() {
        assert_eq!("25".parse::<ItemKey>().unwrap(), ItemKey::Id(ItemId(25)));
        assert_eq!(
            " Pikachu ".parse::<ItemKey>().unwrap(),
            ItemKey::Name("pikachu".to_string())
        );
    }

    #[test]
    fn identity_from_id_round_trips_id() {
        let identity = ItemIdentity::from_id("https://pokeapi.co/api/v2/", ItemId(7), "squirtle");
        assert_eq!(identity.reference, "https://pokeapi.co/api/v2/pokemon/7/");
        assert_eq!(identity.id(), Some(ItemId(7)));
    }

    #[test]
    fn detail_from_wire_orders_slots() {
        let raw = json!({
            "id": 6,
            "name": "charizard",
            "height": 17,
            "weight": 905,
            "base_experience": 267,
            "types": [
                { "slot": 2, "type": { "name": "flying", "url": "https://x/type/3/" } },
                { "slot": 1, "type": { "name": "fire", "url": "https://x/type/10/" } }
            ],
            "abilities": [
                { "slot": 3, "is_hidden": true, "ability": { "name": "solar-power", "url": "https://x/ability/94/" } },
                { "slot": 1, "is_hidden": false, "ability": { "name": "blaze", "url": "https://x/ability/66/" } }
            ],
            "stats": [
                { "base_stat": 78, "effort": 0, "stat": { "name": "hp", "url": "https://x/stat/1/" } }
            ],
            "sprites": {
                "front_default": "front.png",
                "front_shiny": null,
                "other": { "official-artwork": { "front_default": "art.png", "front_shiny": "art-shiny.png" } }
            }
        });
        let detail: ItemDetail = serde_json::from_value::<wire::Detail>(raw).unwrap().into();

        assert_eq!(detail.id, ItemId(6));
        assert_eq!(
            detail.types.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            ["fire", "flying"]
        );
        assert_eq!(detail.abilities[0].name, "blaze");
        assert!(detail.abilities[1].is_hidden);
        assert_eq!(detail.sprites.official_artwork.as_deref(), Some("art.png"));
        assert_eq!(detail.total_stats(), 78);
    }

    #[test]
    fn species_picks_english_entries() {
        let raw = json!({
            "id": 1,
            "name": "bulbasaur",
            "flavor_text_entries": [
                { "flavor_text": "Une étrange graine", "language": { "name": "fr", "url": "" } },
                { "flavor_text": "A strange seed was\nplanted on its\u{0C}back at birth.", "language": { "name": "en", "url": "" } }
            ],
            "genera": [
                { "genus": "Seed Pokémon", "language": { "name": "en", "url": "" } }
            ],
            "is_legendary": false,
            "is_mythical": false
        });
        let species: SpeciesMeta = serde_json::from_value::<wire::Species>(raw).unwrap().into();
        assert_eq!(
            species.description.as_deref(),
            Some("A strange seed was planted on its back at birth.")
        );
        assert_eq!(species.genus.as_deref(), Some("Seed Pokémon"));
    }
}
