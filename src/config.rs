use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::codec::Format;
use crate::store::{FileStore, LocalStorage, MemoryStore, SqliteStore, StorageError};

const APP_NAME: &str = "modeltree";
const CONFIG_FILE: &str = "config.json";

/// Default port of the reference service.
pub const DEFAULT_PORT: u16 = 17020;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
}

/// Where the remote storage service lives and how to authenticate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub base_path: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: Some(DEFAULT_PORT),
            base_path: "/api/v1".to_string(),
            token: None,
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    /// `<scheme>://<host>[:<port>]<base_path>`
    pub fn base_url(&self) -> String {
        let mut url = format!("{}://{}", self.scheme, self.host);
        if let Some(port) = self.port {
            url.push_str(&format!(":{}", port));
        }
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            url.push('/');
        }
        url.push_str(self.base_path.trim_end_matches('/'));
        url
    }

    /// Replace scheme, host, port and base path from a full URL.
    pub fn set_url(&mut self, url: &str) -> Result<()> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid remote URL: {}", url))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Remote URL has no host: {}", url))?;
        self.scheme = parsed.scheme().to_string();
        self.host = host.to_string();
        self.port = parsed.port();
        self.base_path = parsed.path().trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the file backend; platform data dir when unset.
    pub directory: Option<PathBuf>,
    /// Database file for the SQLite backend; platform data dir when unset.
    pub database: Option<PathBuf>,
    /// Format used when the caller doesn't name one.
    pub format: Format,
}

impl StorageConfig {
    pub fn open(&self) -> std::result::Result<Box<dyn LocalStorage>, StorageError> {
        Ok(match self.backend {
            StorageBackend::File => Box::new(match &self.directory {
                Some(dir) => FileStore::new(dir.clone()),
                None => FileStore::open_default()?,
            }),
            StorageBackend::Sqlite => {
                let store = match &self.database {
                    Some(path) => SqliteStore::open(path.clone())?,
                    None => SqliteStore::open_default()?,
                };
                store.migrate()?;
                Box::new(store)
            }
            StorageBackend::Memory => Box::new(MemoryStore::new()),
        })
    }
}

impl Config {
    /// Load configuration from the user's config directory, then apply
    /// environment overrides.
    /// Returns defaults if the file doesn't exist or fails to parse.
    pub fn load() -> Self {
        let mut config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        if let Err(e) = config.apply_overrides(|key| std::env::var(key).ok()) {
            tracing::warn!("Ignoring environment override: {:#}", e);
        }
        config
    }

    fn try_load() -> Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply `MODELTREE_*` overrides read through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("MODELTREE_URL") {
            self.remote.set_url(&url)?;
        }
        if let Some(token) = var("MODELTREE_TOKEN") {
            self.remote.token = Some(token);
        }
        if let Some(user) = var("MODELTREE_USER") {
            self.remote.username = Some(user);
        }
        if let Some(password) = var("MODELTREE_PASSWORD") {
            self.remote.password = Some(password);
        }
        if let Some(db) = var("MODELTREE_DB") {
            self.storage.backend = StorageBackend::Sqlite;
            self.storage.database = Some(PathBuf::from(db));
        }
        Ok(())
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_base_url() {
        assert_eq!(
            RemoteConfig::default().base_url(),
            "http://localhost:17020/api/v1"
        );
    }

    #[test]
    fn base_url_without_port_or_path() {
        let remote = RemoteConfig {
            scheme: "https".to_string(),
            host: "models.example.com".to_string(),
            port: None,
            base_path: String::new(),
            ..RemoteConfig::default()
        };
        assert_eq!(remote.base_url(), "https://models.example.com");
    }

    #[test]
    fn env_overrides_replace_fields() {
        let env: HashMap<&str, &str> = [
            ("MODELTREE_URL", "https://store.example.com:8443/v2/"),
            ("MODELTREE_TOKEN", "abc"),
            ("MODELTREE_DB", "/tmp/models.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.remote.base_url(), "https://store.example.com:8443/v2");
        assert_eq!(config.remote.token.as_deref(), Some("abc"));
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.remote.credentials().is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"remote": {"host": "10.0.0.2"}}"#).unwrap();
        assert_eq!(config.remote.host, "10.0.0.2");
        assert_eq!(config.remote.port, Some(DEFAULT_PORT));
        assert_eq!(config.storage.format, Format::Json);
    }
}
