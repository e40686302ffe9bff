use std::fmt::Write;

use anyhow::Result;
use bpaf::Bpaf;
use dex_catalog::util::display_name;
use dex_catalog::{ItemDetail, ItemKey, SpeciesMeta};
use dex_core::SpeciesCache;
use indoc::formatdoc;
use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, instrument};

use super::Session;
use crate::config::Config;

// Show the details of a single entry
#[derive(Debug, Bpaf, Clone)]
pub struct Show {
    /// Display the entry as JSON
    #[bpaf(long)]
    pub json: bool,

    /// The entry to show, by id or name
    #[bpaf(positional("id|name"))]
    pub item: ItemKey,
}

#[derive(Serialize)]
struct ShowOutput<'a> {
    #[serde(flatten)]
    detail: &'a ItemDetail,
    species: Option<&'a SpeciesMeta>,
    favorite: bool,
}

impl Show {
    #[instrument(name = "show", skip_all, fields(item = %self.item))]
    pub async fn handle(self, config: Config) -> Result<()> {
        let session = Session::open(config)?;
        let cache = session.item_cache();
        let detail = session.resolve(&cache, &self.item).await?;

        let species_cache = SpeciesCache::new(session.client.clone(), session.config.cache_ttl());
        let cancel = session.requests.issue("species");
        // the description is optional, the entry is shown without it
        let species = match species_cache.resolve(ItemKey::Id(detail.id), &cancel).await {
            Ok(species) => Some(species),
            Err(e) => {
                debug!(%e, "couldn't load species");
                None
            },
        };
        let favorite = session.favorites().is_favorite(detail.id);
        session.save_item_cache(&cache);

        if self.json {
            let output = ShowOutput {
                detail: &detail,
                species: species.as_deref(),
                favorite,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print!("{}", render_detail(&detail, species.as_deref(), favorite));
        }
        Ok(())
    }
}

fn render_detail(detail: &ItemDetail, species: Option<&SpeciesMeta>, favorite: bool) -> String {
    let marker = if favorite { " ★" } else { "" };
    let types = detail.types.iter().map(|t| t.name.as_str()).join(", ");
    let abilities = detail
        .abilities
        .iter()
        .map(|ability| {
            if ability.is_hidden {
                format!("{} (hidden)", display_name(&ability.name))
            } else {
                display_name(&ability.name)
            }
        })
        .join(", ");

    let mut out = formatdoc! {"
        {name} #{id}{marker}
        Types:     {types}
        Height:    {height:.1} m
        Weight:    {weight:.1} kg
        Abilities: {abilities}
        ",
        name = display_name(&detail.name),
        id = detail.id,
        height = f64::from(detail.height) / 10.0,
        weight = f64::from(detail.weight) / 10.0,
    };

    if let Some(experience) = detail.base_experience {
        let _ = writeln!(out, "Base exp.: {experience}");
    }

    if !detail.stats.is_empty() {
        let _ = writeln!(out, "Stats:     total {}", detail.total_stats());
        for stat in &detail.stats {
            let _ = writeln!(out, "  {:<16} {:>3}", display_name(&stat.name), stat.base_value);
        }
    }

    if let Some(species) = species {
        if let Some(genus) = &species.genus {
            let _ = writeln!(out, "Genus:     {genus}");
        }
        if species.is_legendary {
            let _ = writeln!(out, "Legendary");
        } else if species.is_mythical {
            let _ = writeln!(out, "Mythical");
        }
        if let Some(description) = &species.description {
            let _ = write!(out, "\n{description}\n");
        }
    }
    out
}
