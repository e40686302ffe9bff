use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use dex_catalog::{CatalogClient, Client, MockClient};
use tracing::debug;

use crate::config::Config;

/// Path to a JSON file of canned catalog data.
///
/// When set, no network requests are made.
pub const DEX_CATALOG_MOCK_VAR: &str = "DEX_CATALOG_MOCK";

/// Initialize the catalog client
///
/// - Initialize a mock client if `$DEX_CATALOG_MOCK` points to mock data
/// - Initialize an HTTP client otherwise
pub fn init_catalog_client(config: &Config) -> Result<Client> {
    let mock_data = std::env::var_os(DEX_CATALOG_MOCK_VAR).map(PathBuf::from);
    catalog_client(config, mock_data.as_deref())
}

fn catalog_client(config: &Config, mock_data: Option<&Path>) -> Result<Client> {
    if let Some(path) = mock_data {
        if !path.exists() {
            bail!("path to mock data file doesn't exist: {}", path.display());
        }

        debug!(mock_data_path = %path.display(), "using mock catalog client");
        let client = MockClient::from_file(path)
            .with_context(|| format!("couldn't load mock data from {}", path.display()))?;
        return Ok(client.into());
    }

    let client_config = config.catalog_client_config();
    debug!(catalog_url = client_config.catalog_url, "using catalog client");
    Ok(CatalogClient::new(client_config)
        .context("couldn't create catalog client")?
        .into())
}
