mod browse;
mod favorites;
mod show;
mod theme;
mod types;

use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use bpaf::Bpaf;
use dex_catalog::{Client, ClientTrait, ItemDetail, ItemId, ItemKey};
use dex_core::{
    CacheSnapshot,
    FavoritesStore,
    FileStore,
    ItemCache,
    KeyValueStore,
    RequestManager,
};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::utils::init::init_catalog_client;
use crate::utils::message;

const DEX_DESCRIPTION: &str = "Browse, search and bookmark entries of the Pokémon catalog";

/// Key of the detail cache snapshot in the cache directory
const DETAILS_SNAPSHOT_KEY: &str = "details";

#[derive(Bpaf, Clone, Copy, Debug)]
pub enum Verbosity {
    Verbose(
        /// Increase logging verbosity
        ///
        /// Invoke multiple times for increasing detail.
        #[bpaf(short('v'), long("verbose"), req_flag(()), many, map(vec_len))]
        usize,
    ),

    /// Silence logs except for errors
    #[bpaf(short, long)]
    Quiet,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

fn vec_len<T>(x: Vec<T>) -> usize {
    Vec::len(&x)
}

#[derive(Bpaf)]
#[bpaf(options, descr(DEX_DESCRIPTION))]
pub struct DexCli(#[bpaf(external(dex_args))] pub DexArgs);

/// Main dex args parser
///
/// To parse the dex CLI, use [`DexCli`] instead using [`dex_cli()`].
#[derive(Debug, Bpaf)]
#[bpaf(ignore_rustdoc)] // we don't want this struct to be interpreted as a group
pub struct DexArgs {
    /// Verbose mode
    ///
    /// Invoke multiple times for increasing detail.
    #[bpaf(external, fallback(Default::default()))]
    pub verbosity: Verbosity,

    #[bpaf(external(commands))]
    command: Commands,
}

impl DexArgs {
    pub async fn handle(self, config: Config) -> Result<()> {
        match self.command {
            Commands::Browse(args) => args.handle(config).await,
            Commands::Show(args) => args.handle(config).await,
            Commands::Favorites(args) => args.handle(config).await,
            Commands::Types(args) => args.handle(config).await,
            Commands::Theme(args) => args.handle(config),
            Commands::Config(args) => args.handle(config),
        }
    }
}

#[derive(Bpaf, Clone, Debug)]
enum Commands {
    /// List catalog entries, optionally filtered and sorted
    #[bpaf(command)]
    Browse(#[bpaf(external(browse::browse))] browse::Browse),

    /// Show the details of a single entry
    #[bpaf(command)]
    Show(#[bpaf(external(show::show))] show::Show),

    /// Manage favorites
    #[bpaf(command)]
    Favorites(#[bpaf(external(favorites::favorites))] favorites::Favorites),

    /// List the types entries can be filtered by
    #[bpaf(command)]
    Types(#[bpaf(external(types::types))] types::Types),

    /// Show or change the color theme
    #[bpaf(command)]
    Theme(#[bpaf(external(theme::theme))] theme::Theme),

    /// Show the effective configuration
    #[bpaf(command)]
    Config(#[bpaf(external(show_config))] ShowConfig),
}

#[derive(Bpaf, Clone, Debug)]
struct ShowConfig {}

impl ShowConfig {
    fn handle(self, config: Config) -> Result<()> {
        let rendered = toml::to_string_pretty(&config).context("Could not render config")?;
        print!("{rendered}");
        Ok(())
    }
}

/// Catalog access and local state shared by the commands
#[derive(Debug)]
pub(crate) struct Session {
    pub config: Config,
    pub client: Arc<Client>,
    pub requests: Arc<RequestManager>,
    data: Arc<FileStore>,
    cache: FileStore,
    favorites: OnceLock<Arc<FavoritesStore>>,
}

impl Session {
    pub fn open(config: Config) -> Result<Self> {
        let client = init_catalog_client(&config)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Config, client: impl Into<Client>) -> Self {
        let client = Arc::new(client.into());
        let data = Arc::new(FileStore::new(&config.data_dir));
        let cache = FileStore::new(&config.cache_dir);
        Self {
            config,
            client,
            requests: Arc::new(RequestManager::new()),
            data,
            cache,
            favorites: OnceLock::new(),
        }
    }

    /// Key value storage in the data directory
    pub fn storage(&self) -> Arc<dyn KeyValueStore> {
        self.data.clone()
    }

    /// The favorites of this run, loaded on first use
    pub fn favorites(&self) -> Arc<FavoritesStore> {
        let favorites = self
            .favorites
            .get_or_init(|| Arc::new(FavoritesStore::load(self.storage())));
        Arc::clone(favorites)
    }

    /// A detail cache primed with the entries saved by a previous run
    pub fn item_cache(&self) -> Arc<ItemCache<Client>> {
        let cache = ItemCache::new(Arc::clone(&self.client), self.config.cache_ttl());
        match self.read_snapshot() {
            Ok(Some(snapshot)) => {
                let restored = cache.restore(snapshot);
                debug!(restored, "restored detail cache");
            },
            Ok(None) => {},
            Err(e) => debug!("ignoring detail cache snapshot: {e:#}"),
        }
        Arc::new(cache)
    }

    fn read_snapshot(&self) -> Result<Option<CacheSnapshot<ItemId, ItemDetail>>> {
        let Some(contents) = self.cache.get(DETAILS_SNAPSHOT_KEY)? else {
            return Ok(None);
        };
        let snapshot = serde_json::from_str(&contents)?;
        Ok(Some(snapshot))
    }

    /// Save the detail cache for the next run
    ///
    /// Failing to do so only costs refetching, so it is reported as a warning.
    pub fn save_item_cache(&self, cache: &ItemCache<Client>) {
        let result = serde_json::to_string(&cache.snapshot())
            .context("Could not serialize detail cache")
            .and_then(|contents| {
                self.cache
                    .set(DETAILS_SNAPSHOT_KEY, &contents)
                    .context("Could not write detail cache")
            });
        if let Err(e) = result {
            message::warning(format!("{e:#}"));
        }
    }

    /// Resolve an entry by id through the cache, or by name through the
    /// catalog.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn resolve(
        &self,
        cache: &ItemCache<Client>,
        key: &ItemKey,
    ) -> Result<Arc<ItemDetail>> {
        let cancel = self.requests.issue("resolve");
        let detail = match key {
            ItemKey::Id(id) => cache.resolve(*id, &cancel).await,
            ItemKey::Name(_) => self
                .client
                .get_detail(key, &cancel)
                .await
                .map(|detail| cache.insert(detail)),
        };
        detail.with_context(|| format!("couldn't look up '{key}'"))
    }
}
