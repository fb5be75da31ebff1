use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::batch::{BatchOptions, DEFAULT_CONCURRENCY};
use crate::error::ProteomeError;
use crate::uniprot::{DEFAULT_BASE_URL, HttpOptions};

pub const CONFIG_FILE_NAME: &str = "proteome-dl.json";
pub const DEFAULT_TABLE_PATH: &str = "data/ref.tsv";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub reference_table: Option<Utf8PathBuf>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// `0` disables the overall request deadline.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub artifact_dir: Option<Utf8PathBuf>,
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub reference_table: Option<Utf8PathBuf>,
    pub base_url: Option<String>,
    pub concurrency: Option<usize>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub reference_table: Utf8PathBuf,
    pub base_url: String,
    pub concurrency: usize,
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub artifact_dir: Option<Utf8PathBuf>,
}

impl ResolvedConfig {
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            connect_timeout: Some(self.connect_timeout),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.concurrency,
            artifact_dir: self
                .artifact_dir
                .as_ref()
                .map(|dir| dir.as_std_path().to_path_buf()),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Without one, `./proteome-dl.json` and then
    /// the per-user config file are tried before falling back to defaults.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, ProteomeError> {
        let config = match path {
            Some(path) => Self::read(PathBuf::from(path))?,
            None => match Self::default_locations().into_iter().find(|p| p.is_file()) {
                Some(found) => Self::read(found)?,
                None => Config::default(),
            },
        };
        Ok(Self::resolve_config(config, overrides))
    }

    pub fn resolve_config(config: Config, overrides: ConfigOverrides) -> ResolvedConfig {
        let request_timeout_secs = overrides
            .request_timeout_secs
            .or(config.request_timeout_secs)
            .unwrap_or(600);
        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            reference_table: overrides
                .reference_table
                .or(config.reference_table)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_TABLE_PATH)),
            base_url: overrides
                .base_url
                .or(config.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            concurrency: overrides
                .concurrency
                .or(config.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            request_timeout: (request_timeout_secs > 0)
                .then(|| Duration::from_secs(request_timeout_secs)),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs.unwrap_or(30)),
            artifact_dir: config.artifact_dir,
        }
    }

    fn read(path: PathBuf) -> Result<Config, ProteomeError> {
        let content =
            fs::read_to_string(&path).map_err(|_| ProteomeError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| ProteomeError::ConfigParse(err.to_string()))
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = ProjectDirs::from("", "", "proteome-dl") {
            paths.push(dirs.config_dir().join("config.json"));
        }
        paths
    }
}
