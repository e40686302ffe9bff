use std::sync::Arc;

use anyhow::{Result, bail};
use bpaf::Bpaf;
use dex_catalog::ItemDetail;
use dex_catalog::util::display_name;
use dex_core::{CategoryFilter, FilterState, ListOrchestrator, ListView, SortKey, SortOrder};
use itertools::Itertools;
use tracing::{debug, instrument};

use super::Session;
use crate::config::Config;
use crate::utils::message;

// List catalog entries
#[derive(Debug, Bpaf, Clone)]
pub struct Browse {
    /// Start from a saved filter, e.g. 'type=fire&sortBy=weight'
    ///
    /// Options given next to it take precedence.
    #[bpaf(long("filter"), argument("query-string"))]
    pub saved_filter: Option<String>,

    /// Only list entries whose name contains <query>
    #[bpaf(short('q'), long("query"), argument("query"))]
    pub query: Option<String>,

    /// Only list entries of <type> (see 'dex types')
    #[bpaf(short('t'), long("type"), argument("type"))]
    pub category: Option<String>,

    /// Sort by 'id', 'name', 'height' or 'weight'
    #[bpaf(long("sort"), argument("key"))]
    pub sort_by: Option<SortKey>,

    /// Sort in descending order
    #[bpaf(long)]
    pub desc: bool,

    /// Only list favorites
    #[bpaf(long)]
    pub favorites: bool,

    /// Number of catalog pages to load
    #[bpaf(long, argument("n"), fallback(1))]
    pub pages: usize,

    /// Display the list as a JSON array
    #[bpaf(long)]
    pub json: bool,
}

impl Browse {
    fn filter_state(&self) -> FilterState {
        let mut filter = self
            .saved_filter
            .as_deref()
            .map(FilterState::from_query_string)
            .unwrap_or_default();
        if let Some(query) = &self.query {
            filter.query = query.clone();
        }
        if let Some(category) = &self.category {
            filter.category = CategoryFilter::from(category.as_str());
        }
        if let Some(sort_by) = self.sort_by {
            filter.sort_by = sort_by;
        }
        if self.desc {
            filter.sort_order = SortOrder::Desc;
        }
        if self.favorites {
            filter.favorites_only = true;
        }
        filter
    }

    #[instrument(name = "browse", skip_all, fields(pages = self.pages, json = self.json))]
    pub async fn handle(self, config: Config) -> Result<()> {
        let session = Session::open(config)?;
        let filter = self.filter_state();
        let view = self.load(&session, filter.clone()).await?;

        if self.json {
            let items = view.items.iter().map(Arc::as_ref).collect::<Vec<&ItemDetail>>();
            println!("{}", serde_json::to_string_pretty(&items)?);
        } else {
            print!("{}", render_table(&view.items));
        }
        print_summary(&view, &filter);
        Ok(())
    }

    /// Load the first `pages` pages of the list for `filter`
    async fn load(&self, session: &Session, filter: FilterState) -> Result<ListView> {
        debug!(filter = %filter.to_query_string(), "browsing");

        let cache = session.item_cache();
        let orchestrator = ListOrchestrator::new(
            Arc::clone(&cache),
            session.favorites(),
            Arc::clone(&session.requests),
            session.config.orchestrator_config(),
        );

        let load = async {
            orchestrator.set_filter_state(filter).await;
            for _ in 1..self.pages {
                if !orchestrator.load_more().await {
                    break;
                }
            }
        };
        tokio::select! {
            _ = load => {},
            _ = tokio::signal::ctrl_c() => {
                session.requests.shutdown();
                session.save_item_cache(&cache);
                bail!("interrupted");
            },
        }

        session.save_item_cache(&cache);

        let view = orchestrator.view();
        if let Some(error) = view.error {
            bail!("couldn't load the list ({error} error), try again later");
        }
        Ok(view)
    }
}

fn render_table(items: &[Arc<ItemDetail>]) -> String {
    let mut out = String::new();
    for item in items {
        let types = item.types.iter().map(|t| t.name.as_str()).join("/");
        out.push_str(&format!(
            "#{:<5} {:<16} {:<18} {:>5.1} m {:>6.1} kg\n",
            item.id.0,
            display_name(&item.name),
            types,
            f64::from(item.height) / 10.0,
            f64::from(item.weight) / 10.0,
        ));
    }
    out
}

fn print_summary(view: &ListView, filter: &FilterState) {
    if view.items.is_empty() && view.failed == 0 {
        message::plain("No entries match.");
        if filter.has_active_filters() || !filter.query.is_empty() {
            message::plain("Try a broader query or drop some filters.");
        }
        return;
    }

    message::plain(format!(
        "Showing {} of {} matching entries.",
        view.items.len(),
        view.total
    ));
    if view.failed > 0 {
        message::warning(format!("{} entries couldn't be loaded.", view.failed));
    }
    if view.has_more {
        message::plain("More entries are available, use '--pages <n>' to load them.");
    }
}
