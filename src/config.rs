//! Configuration for the remote endpoint, paging, deadlines, and snapshot paths.

use std::{
   path::{Path, PathBuf},
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const MAX_PAGE_SIZE: usize = 10_000;
const BASE_DIR_NAME: &str = ".kbsync";

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub remote_url:  Option<String>,
   pub service_key: Option<String>,
   pub table:       String,

   pub page_size:          usize,
   pub safety_margin_secs: u64,
   pub fetch_timeout_ms:   u64,
   pub request_timeout_ms: u64,
   pub embedding_dim:      Option<usize>,

   pub data_dir:          Option<PathBuf>,
   pub reader_attempts:   usize,
   pub reader_backoff_ms: u64,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         remote_url: None,
         service_key: None,
         table: "knowledge_base".to_string(),
         page_size: 1000,
         safety_margin_secs: 300,
         fetch_timeout_ms: 300_000,
         request_timeout_ms: 30_000,
         embedding_dim: None,
         data_dir: None,
         reader_attempts: 5,
         reader_backoff_ms: 50,
      }
   }
}

/// Validated connection settings for the remote store.
#[derive(Clone)]
pub struct RemoteSettings {
   pub url:             String,
   pub service_key:     String,
   pub table:           String,
   pub request_timeout: Duration,
}

impl std::fmt::Debug for RemoteSettings {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("RemoteSettings")
         .field("url", &self.url)
         .field("service_key", &"<redacted>")
         .field("table", &self.table)
         .field("request_timeout", &self.request_timeout)
         .finish()
   }
}

impl Config {
   /// Loads defaults, then `config.toml` (explicit path or `~/.kbsync/config.toml`),
   /// then `KBSYNC_*` environment variables.
   pub fn load(config_path: Option<&Path>) -> Result<Self> {
      let path = match config_path {
         Some(path) => path.to_path_buf(),
         None => config_file_path()?,
      };
      Self::figment(&path)
         .extract()
         .map_err(|e| ConfigError::Parse(Box::new(e)).into())
   }

   fn figment(path: &Path) -> Figment {
      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(path))
         .merge(Env::prefixed("KBSYNC_").lowercase(true))
   }

   /// Resolves the endpoint and credential; both are required.
   pub fn remote_settings(&self) -> Result<RemoteSettings> {
      let url = non_blank(self.remote_url.as_deref()).ok_or(ConfigError::MissingEndpoint)?;
      let service_key =
         non_blank(self.service_key.as_deref()).ok_or(ConfigError::MissingCredential)?;
      Ok(RemoteSettings {
         url: url.trim_end_matches('/').to_string(),
         service_key: service_key.to_string(),
         table: self.table.clone(),
         request_timeout: Duration::from_millis(self.request_timeout_ms),
      })
   }

   pub fn validate(&self) -> Result<()> {
      if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
         return Err(
            ConfigError::Invalid {
               field:  "page_size",
               reason: format!("{} is outside 1..={MAX_PAGE_SIZE}", self.page_size),
            }
            .into(),
         );
      }
      if self.table.trim().is_empty() {
         return Err(
            ConfigError::Invalid { field: "table", reason: "must not be empty".to_string() }
               .into(),
         );
      }
      if self.embedding_dim == Some(0) {
         return Err(
            ConfigError::Invalid {
               field:  "embedding_dim",
               reason: "must be positive when set".to_string(),
            }
            .into(),
         );
      }
      if self.reader_attempts == 0 {
         return Err(
            ConfigError::Invalid {
               field:  "reader_attempts",
               reason: "must be at least 1".to_string(),
            }
            .into(),
         );
      }
      Ok(())
   }

   pub const fn safety_margin(&self) -> Duration {
      Duration::from_secs(self.safety_margin_secs)
   }

   /// Deadline for a whole fetch; `None` when disabled.
   pub const fn fetch_deadline(&self) -> Option<Duration> {
      if self.fetch_timeout_ms == 0 {
         None
      } else {
         Some(Duration::from_millis(self.fetch_timeout_ms))
      }
   }

   pub const fn reader_backoff(&self) -> Duration {
      Duration::from_millis(self.reader_backoff_ms)
   }

   /// Snapshot directory, defaulting to `~/.kbsync/snapshot`.
   pub fn snapshot_dir(&self) -> Result<PathBuf> {
      match &self.data_dir {
         Some(dir) => Ok(dir.clone()),
         None => Ok(base_dir()?.join("snapshot")),
      }
   }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
   value.map(str::trim).filter(|v| !v.is_empty())
}

/// Returns the base directory for kbsync data and configuration
pub fn base_dir() -> Result<PathBuf> {
   BaseDirs::new()
      .map(|d| d.home_dir().join(BASE_DIR_NAME))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(BASE_DIR_NAME))
      })
      .ok_or_else(|| ConfigError::GetUserDirectories.into())
}

pub fn config_file_path() -> Result<PathBuf> {
   Ok(base_dir()?.join("config.toml"))
}
