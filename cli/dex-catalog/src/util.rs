//! Small helpers shared by the client and its consumers.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::ItemId;

const SPRITES_BASE_URL: &str = "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon";

static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)/$").expect("static regex is valid"));
static REPEATED_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("static regex is valid"));

/// Extract the numeric id from a reference of the form `.../<digits>/`.
pub fn item_id_from_reference(reference: &str) -> Option<ItemId> {
    TRAILING_ID
        .captures(reference)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
        .map(ItemId)
}

/// Which artwork to link for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageVariant {
    #[default]
    Official,
    Default,
}

pub fn image_url(id: ItemId, variant: ImageVariant) -> String {
    match variant {
        ImageVariant::Official => format!("{SPRITES_BASE_URL}/other/official-artwork/{id}.png"),
        ImageVariant::Default => format!("{SPRITES_BASE_URL}/{id}.png"),
    }
}

/// Turn `mr-mime` into `Mr Mime`.
pub fn display_name(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Flavor texts are hard-wrapped with `\n` and `\f`.
pub fn normalize_flavor_text(text: &str) -> String {
    let flattened = text.replace(['\u{c}', '\n'], " ");
    REPEATED_SPACES
        .replace_all(&flattened, " ")
        .trim()
        .to_string()
}

/// Case-insensitive substring match of a trimmed query.
///
/// An empty or whitespace-only query matches everything.
pub fn matches_query(name: &str, query: &str) -> bool {
    let query = query.trim();
    query.is_empty() || name.to_lowercase().contains(&query.to_lowercase())
}
