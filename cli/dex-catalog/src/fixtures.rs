//! Canned catalog content for tests.

use std::collections::BTreeMap;

use crate::mock::MockData;
use crate::types::*;
use crate::util::{ImageVariant, image_url};

/// Build a detail record with the given physical attributes and types.
pub fn detail(id: u64, name: &str, height: u32, weight: u32, types: &[&str]) -> ItemDetail {
    let id = ItemId(id);
    ItemDetail {
        id,
        name: name.to_string(),
        height,
        weight,
        types: types
            .iter()
            .enumerate()
            .map(|(n, name)| TypeRef {
                slot: n as u8 + 1,
                name: name.to_string(),
            })
            .collect(),
        abilities: vec![],
        stats: vec![StatValue {
            name: "hp".to_string(),
            base_value: 45,
        }],
        base_experience: None,
        sprites: Sprites {
            front_default: Some(image_url(id, ImageVariant::Default)),
            official_artwork: Some(image_url(id, ImageVariant::Official)),
            ..Default::default()
        },
    }
}

/// The first three evolution lines plus pikachu.
pub fn sample_items() -> Vec<ItemDetail> {
    vec![
        detail(1, "bulbasaur", 7, 69, &["grass", "poison"]),
        detail(2, "ivysaur", 10, 130, &["grass", "poison"]),
        detail(3, "venusaur", 20, 1000, &["grass", "poison"]),
        detail(4, "charmander", 6, 85, &["fire"]),
        detail(5, "charmeleon", 11, 190, &["fire"]),
        detail(6, "charizard", 17, 905, &["fire", "flying"]),
        detail(7, "squirtle", 5, 90, &["water"]),
        detail(8, "wartortle", 10, 225, &["water"]),
        detail(9, "blastoise", 16, 855, &["water"]),
        detail(25, "pikachu", 4, 60, &["electric"]),
    ]
}

pub fn sample_data() -> MockData {
    let items = sample_items();

    let mut categories: BTreeMap<String, Vec<ItemId>> = BTreeMap::new();
    for item in &items {
        for t in &item.types {
            categories.entry(t.name.clone()).or_default().push(item.id);
        }
    }

    let species = vec![
        SpeciesMeta {
            id: ItemId(1),
            name: "bulbasaur".to_string(),
            description: Some("A strange seed was planted on its back at birth.".to_string()),
            genus: Some("Seed Pokémon".to_string()),
            is_legendary: false,
            is_mythical: false,
        },
        SpeciesMeta {
            id: ItemId(25),
            name: "pikachu".to_string(),
            description: Some(
                "When several of these gather, their electricity could build and cause lightning storms."
                    .to_string(),
            ),
            genus: Some("Mouse Pokémon".to_string()),
            is_legendary: false,
            is_mythical: false,
        },
    ];

    MockData {
        items,
        species,
        categories,
    }
}
