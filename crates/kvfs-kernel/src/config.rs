//! Configuration loading.
//!
//! Config lives in `~/.config/kvfs/config.ron`; a missing file means
//! defaults. Example:
//!
//! ```ron
//! (
//!     backend: Etcd(endpoints: ["http://127.0.0.1:2379"], prefix: "kvfs/"),
//!     retry: (max_attempts: 32),
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::backend::{BackendError, KvBackend, MemoryKv, SqliteKv};
use crate::fs::KvFs;
use crate::txn::RetryPolicy;

/// Error type for config loading and backend setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid backend spec {0:?} (expected memory, sqlite:<path> or etcd:<endpoint>[,...])")]
    BadSpec(String),
    #[error("this build has no etcd support (enable the `etcd` feature)")]
    EtcdDisabled,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Which store holds the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendConfig {
    /// Process-local, gone on exit.
    Memory,
    /// SQLite database file.
    Sqlite { path: PathBuf },
    /// etcd v3 cluster.
    Etcd {
        endpoints: Vec<String>,
        #[serde(default)]
        prefix: String,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Sqlite {
            path: default_db_path(),
        }
    }
}

/// Endpoint used by a bare `etcd` backend spec.
pub const DEFAULT_ETCD_ENDPOINT: &str = "http://127.0.0.1:2379";

/// `~/.local/share/kvfs/kvfs.db`, or `./kvfs.db` without a data dir.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("kvfs").join("kvfs.db"))
        .unwrap_or_else(|| PathBuf::from("kvfs.db"))
}

impl FromStr for BackendConfig {
    type Err = ConfigError;

    /// Parse `memory`, `sqlite[:<path>]` or `etcd[:<endpoint>[,<endpoint>...]]`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::BadSpec(spec.to_string());
        let (scheme, rest) = match spec.split_once(':') {
            Some((scheme, rest)) => (scheme, Some(rest)),
            None => (spec, None),
        };

        match (scheme, rest) {
            ("memory", None) => Ok(BackendConfig::Memory),
            ("sqlite", None) => Ok(BackendConfig::default()),
            ("sqlite", Some(path)) if !path.is_empty() => Ok(BackendConfig::Sqlite {
                path: PathBuf::from(path),
            }),
            ("etcd", None) => Ok(BackendConfig::Etcd {
                endpoints: vec![DEFAULT_ETCD_ENDPOINT.to_string()],
                prefix: String::new(),
            }),
            ("etcd", Some(list)) => {
                let endpoints: Vec<String> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|ep| !ep.is_empty())
                    .map(String::from)
                    .collect();
                if endpoints.is_empty() {
                    return Err(bad());
                }
                Ok(BackendConfig::Etcd {
                    endpoints,
                    prefix: String::new(),
                })
            }
            _ => Err(bad()),
        }
    }
}

impl BackendConfig {
    /// Connect to (or create) the configured store.
    pub async fn open(&self) -> Result<Arc<dyn KvBackend>, ConfigError> {
        match self {
            BackendConfig::Memory => Ok(Arc::new(MemoryKv::new())),
            BackendConfig::Sqlite { path } => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                tracing::debug!(path = %path.display(), "kv.sqlite: opening");
                Ok(Arc::new(SqliteKv::open(path)?))
            }
            #[cfg(feature = "etcd")]
            BackendConfig::Etcd { endpoints, prefix } => Ok(Arc::new(
                crate::backend::EtcdKv::connect(endpoints.as_slice(), prefix.clone()).await?,
            )),
            #[cfg(not(feature = "etcd"))]
            BackendConfig::Etcd { .. } => Err(ConfigError::EtcdDisabled),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvfsConfig {
    pub backend: BackendConfig,
    pub retry: RetryPolicy,
}

impl KvfsConfig {
    /// `~/.config/kvfs/config.ron`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kvfs").join("config.ron"))
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_ron(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config: not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load from the default location.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Open the backend and wrap it in a filesystem.
    pub async fn open_filesystem(&self) -> Result<KvFs, ConfigError> {
        let backend = self.backend.open().await?;
        Ok(KvFs::with_policy(backend, self.retry))
    }
}
