use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config as HierarchicalConfig, Environment};
use dex_catalog::{CatalogClientConfig, DEFAULT_CATALOG_URL, RetryPolicy};
use dex_core::{BatchConfig, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;
use xdg::BaseDirectories;

use crate::utils::init::DEX_CATALOG_MOCK_VAR;

/// Name of dex managed directories (config, data, cache)
const DEX_DIR_NAME: &str = "dex";
pub const DEX_CONFIG_FILE: &str = "dex.toml";
const DEX_ENV_PREFIX: &str = "DEX_";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub catalog_url: String,
    pub request_timeout_secs: u64,
    /// Items per catalog page
    pub page_size: u32,
    /// Maximum number of detail requests in flight
    pub batch_size: usize,
    /// Pause between detail batches
    pub batch_delay_ms: u64,
    pub cache_ttl_secs: u64,
    /// Retries of failed listings and page loads
    pub max_retries: u32,
    /// Where favorites and the theme are stored
    pub data_dir: PathBuf,
    /// Where the detail cache snapshot is stored
    pub cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            request_timeout_secs: 10,
            page_size: 40,
            batch_size: 20,
            batch_delay_ms: 100,
            cache_ttl_secs: 600,
            max_retries: 3,
            data_dir: PathBuf::from(".local/share/dex"),
            cache_dir: PathBuf::from(".cache/dex"),
        }
    }
}

impl Config {
    /// Creates a [Config] from compiled defaults, config files and the environment
    ///
    /// Later sources take precedence:
    /// 1. defaults
    /// 2. `dex.toml` in `$XDG_CONFIG_DIRS` and `$XDG_CONFIG_HOME`
    /// 3. `DEX_*` environment variables
    pub fn parse() -> Result<Config> {
        let dex_dirs = BaseDirectories::with_prefix(DEX_DIR_NAME);

        let cache_dir = dex_dirs
            .get_cache_home()
            .context("Could not determine cache directory")?;
        let data_dir = dex_dirs
            .get_data_home()
            .context("Could not determine data directory")?;

        // ordered from least to most significant
        let mut config_files: Vec<PathBuf> = dex_dirs.find_config_files(DEX_CONFIG_FILE).collect();
        config_files.reverse();

        let dex_envs = env::vars()
            .filter_map(|(k, v)| k.strip_prefix(DEX_ENV_PREFIX).map(|k| (k.to_owned(), v)))
            .collect();

        Self::from_sources(&cache_dir, &data_dir, &config_files, dex_envs)
    }

    fn from_sources(
        cache_dir: &Path,
        data_dir: &Path,
        config_files: &[PathBuf],
        mut dex_envs: HashMap<String, String>,
    ) -> Result<Config> {
        let defaults = Config {
            cache_dir: cache_dir.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            ..Config::default()
        };

        let mut builder = HierarchicalConfig::builder().add_source(
            HierarchicalConfig::try_from(&defaults).context("Could not serialize defaults")?,
        );

        for file in config_files {
            debug!(path = %file.display(), "reading config file");
            builder = builder.add_source(
                config::File::from(file.as_path())
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        // selects the client, not a setting
        if let Some(key) = DEX_CATALOG_MOCK_VAR.strip_prefix(DEX_ENV_PREFIX) {
            dex_envs.remove(key);
        }

        let final_config = builder
            .add_source(
                Environment::default()
                    .source(Some(dex_envs.into_iter().collect()))
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = final_config
            .try_deserialize()
            .context("Could not parse config")?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn catalog_client_config(&self) -> CatalogClientConfig {
        CatalogClientConfig {
            catalog_url: self.catalog_url.clone(),
            user_agent: Some(format!("dex/{}", env!("CARGO_PKG_VERSION"))),
            timeout: self.request_timeout(),
            connect_timeout: self.request_timeout(),
            ..CatalogClientConfig::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            page_size: self.page_size,
            batch: BatchConfig {
                concurrency: self.batch_size.max(1),
                delay: Duration::from_millis(self.batch_delay_ms),
            },
            retry: RetryPolicy::default().with_max_retries(self.max_retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    fn parse_with(files: &[PathBuf], envs: &[(&str, &str)]) -> Result<Config> {
        let envs = envs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(Path::new("/cache"), Path::new("/data"), files, envs)
    }

    #[test]
    fn defaults_without_sources() {
        let config = parse_with(&[], &[]).unwrap();
        assert_eq!(config, Config {
            cache_dir: "/cache".into(),
            data_dir: "/data".into(),
            ..Config::default()
        });
    }

    #[test]
    fn environment_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(DEX_CONFIG_FILE);
        std::fs::write(&file, indoc! {r#"
            catalog_url = "http://localhost:8080/api/v2"
            page_size = 20
            batch_size = 5
        "#})
        .unwrap();

        let config = parse_with(&[file], &[("PAGE_SIZE", "10"), ("CATALOG_MOCK", "/mock.json")])
            .unwrap();
        assert_eq!(config.catalog_url, "http://localhost:8080/api/v2");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn later_config_files_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.toml");
        let user = dir.path().join("user.toml");
        std::fs::write(&system, "cache_ttl_secs = 60\nmax_retries = 1\n").unwrap();
        std::fs::write(&user, "cache_ttl_secs = 120\n").unwrap();

        let config = parse_with(&[system, user], &[]).unwrap();
        assert_eq!(config.cache_ttl(), Duration::from_secs(120));
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = parse_with(&[], &[("PAGE_SIZE", "lots")]).unwrap_err();
        assert!(format!("{err:#}").contains("Could not parse config"));
    }

    #[test]
    fn orchestrator_config_from_settings() {
        let config = Config {
            page_size: 12,
            batch_size: 0,
            batch_delay_ms: 0,
            max_retries: 0,
            ..Config::default()
        };
        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.page_size, 12);
        assert_eq!(orchestrator.batch.concurrency, 1);
        assert_eq!(orchestrator.batch.delay, Duration::ZERO);
        assert_eq!(orchestrator.retry.max_retries, 0);
    }

    #[test]
    #[serial]
    fn parse_reads_xdg_locations_and_environment() {
        let home = tempfile::tempdir().unwrap();
        let config_home = home.path().join("config");
        std::fs::create_dir_all(config_home.join(DEX_DIR_NAME)).unwrap();
        std::fs::write(
            config_home.join(DEX_DIR_NAME).join(DEX_CONFIG_FILE),
            "cache_ttl_secs = 30\nbatch_delay_ms = 250\n",
        )
        .unwrap();

        let path = |name: &str| home.path().join(name).to_string_lossy().into_owned();
        temp_env::with_vars(
            [
                ("XDG_CONFIG_HOME", Some(path("config"))),
                ("XDG_CONFIG_DIRS", Some(path("etc"))),
                ("XDG_CACHE_HOME", Some(path("cache"))),
                ("XDG_DATA_HOME", Some(path("data"))),
                ("DEX_BATCH_DELAY_MS", Some("50".to_string())),
                ("DEX_CATALOG_MOCK", None),
            ],
            || {
                let config = Config::parse().unwrap();
                assert_eq!(config.cache_ttl(), Duration::from_secs(30));
                assert_eq!(config.batch_delay_ms, 50);
                assert_eq!(config.cache_dir, home.path().join("cache").join(DEX_DIR_NAME));
                assert_eq!(config.data_dir, home.path().join("data").join(DEX_DIR_NAME));
            },
        );
    }
}
