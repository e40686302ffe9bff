use anyhow::{Context, Result};
use bpaf::Bpaf;
use dex_catalog::ClientTrait;
use tracing::instrument;

use super::Session;
use crate::config::Config;

// List the types entries can be filtered by
#[derive(Debug, Bpaf, Clone)]
pub struct Types {
    /// Display types as a JSON array
    #[bpaf(long)]
    pub json: bool,
}

impl Types {
    #[instrument(name = "types", skip_all, fields(json = self.json))]
    pub async fn handle(self, config: Config) -> Result<()> {
        let session = Session::open(config)?;
        let cancel = session.requests.issue("types");
        let categories = session
            .client
            .list_categories(&cancel)
            .await
            .context("couldn't list types")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&categories)?);
        } else {
            for category in &categories {
                println!("{}", category.name);
            }
        }
        Ok(())
    }
}
