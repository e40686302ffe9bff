use anyhow::{Result, bail};
use bpaf::Bpaf;
use dex_catalog::ItemKey;
use dex_catalog::util::{ImageVariant, display_name, image_url};
use dex_core::{FavoriteEntry, FavoritesStore, NewFavorite};
use tracing::instrument;

use super::Session;
use crate::config::Config;
use crate::utils::message;

// Manage favorites
#[derive(Debug, Bpaf, Clone)]
pub enum Favorites {
    /// List favorites in the order they were added
    #[bpaf(command)]
    List {
        /// Display favorites as a JSON array
        #[bpaf(long)]
        json: bool,
    },

    /// Add an entry to the favorites
    #[bpaf(command)]
    Add(#[bpaf(positional("id|name"))] ItemKey),

    /// Remove an entry from the favorites
    #[bpaf(command)]
    Remove(#[bpaf(positional("id|name"))] ItemKey),

    /// Add an entry if it isn't a favorite yet, remove it otherwise
    #[bpaf(command)]
    Toggle(#[bpaf(positional("id|name"))] ItemKey),

    /// Remove all favorites
    #[bpaf(command)]
    Clear,
}

impl Favorites {
    pub async fn handle(self, config: Config) -> Result<()> {
        let session = Session::open(config)?;
        self.run(&session).await
    }

    #[instrument(name = "favorites", skip_all)]
    async fn run(self, session: &Session) -> Result<()> {
        let favorites = session.favorites();
        match self {
            Favorites::List { json } => list(&favorites.list(), json)?,
            Favorites::Add(key) => {
                let favorite = lookup(session, &key).await?;
                let name = display_name(&favorite.name);
                if favorites.add(favorite) {
                    message::created(format!("Added '{name}' to favorites"));
                } else {
                    message::plain(format!("'{name}' already is a favorite"));
                }
            },
            Favorites::Remove(key) => {
                let Some(entry) = find(&favorites, &key) else {
                    bail!("'{key}' is not a favorite");
                };
                favorites.remove(entry.id);
                message::deleted(format!(
                    "Removed '{}' from favorites",
                    display_name(&entry.name)
                ));
            },
            Favorites::Toggle(key) => {
                // no need to look up what is about to be removed
                let favorite = match find(&favorites, &key) {
                    Some(entry) => NewFavorite::new(entry.id, entry.name, entry.image_url),
                    None => lookup(session, &key).await?,
                };
                let name = display_name(&favorite.name);
                if favorites.toggle(favorite) {
                    message::created(format!("Added '{name}' to favorites"));
                } else {
                    message::deleted(format!("Removed '{name}' from favorites"));
                }
            },
            Favorites::Clear => {
                let count = favorites.count();
                favorites.clear();
                message::deleted(format!("Removed {count} favorites"));
            },
        }

        if favorites.is_degraded() {
            message::warning(format!(
                "Favorites couldn't be saved to {}, changes only last for this run",
                session.config.data_dir.display()
            ));
        }
        Ok(())
    }
}

/// A stored favorite by id or name
fn find(favorites: &FavoritesStore, key: &ItemKey) -> Option<FavoriteEntry> {
    favorites.list().into_iter().find(|entry| match key {
        ItemKey::Id(id) => entry.id == *id,
        ItemKey::Name(name) => entry.name == *name,
    })
}

async fn lookup(session: &Session, key: &ItemKey) -> Result<NewFavorite> {
    let cache = session.item_cache();
    let detail = session.resolve(&cache, key).await?;
    session.save_item_cache(&cache);
    Ok(NewFavorite::new(
        detail.id,
        detail.name.clone(),
        image_url(detail.id, ImageVariant::Official),
    ))
}

fn list(entries: &[FavoriteEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        message::plain("No favorites yet, add some with 'dex favorites add <id|name>'.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "#{:<5} {:<16} added {}",
            entry.id.0,
            display_name(&entry.name),
            entry.added_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
