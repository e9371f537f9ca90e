//! Configuration management for CloudControl nodes.
//!
//! A node directory holds everything a node needs at startup:
//!
//! ```text
//! <base>/config.json          peer list and webadmin credentials
//! <base>/authorized_keys/     one public key file per trusted peer
//! <base>/self_key/self.key    local private key
//! <base>/self_key/self.pub    local public key
//! ```
//!
//! `config.json` uses PascalCase keys so files written by older deployments
//! keep loading.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.json";
const AUTHORIZED_KEYS_DIR_NAME: &str = "authorized_keys";
const SELF_KEY_DIR_NAME: &str = "self_key";
const SELF_PRIVATE_KEY_NAME: &str = "self.key";
const SELF_PUBLIC_KEY_NAME: &str = "self.pub";

/// TCP port every node listens on and every peer is contacted on.
pub const DEFAULT_NODE_PORT: u16 = 2001;

/// Client-side timeout for a single peer request.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long in-flight requests may drain when the server stops.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Maximum clock difference accepted on an inbound envelope.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode config JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

impl ConfigError {
    /// True when the config file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Locations of the files that make up a node directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePaths {
    base: PathBuf,
}

impl NodePaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Node directory rooted at the process working directory.
    pub fn current_dir() -> Self {
        Self::new(".")
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join(CONFIG_FILE_NAME)
    }

    pub fn authorized_keys_dir(&self) -> PathBuf {
        self.base.join(AUTHORIZED_KEYS_DIR_NAME)
    }

    pub fn self_key_dir(&self) -> PathBuf {
        self.base.join(SELF_KEY_DIR_NAME)
    }

    pub fn self_private_key(&self) -> PathBuf {
        self.self_key_dir().join(SELF_PRIVATE_KEY_NAME)
    }

    pub fn self_public_key(&self) -> PathBuf {
        self.self_key_dir().join(SELF_PUBLIC_KEY_NAME)
    }
}

/// A peer this node can command, with the defaults used when powering it off.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PeerRecord {
    pub host: String,
    /// Ask the peer to acknowledge first and power off in the background.
    #[serde(rename = "Async", default)]
    pub async_poweroff: bool,
    #[serde(default)]
    pub poweroff_delay_msec: u64,
}

impl PeerRecord {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

/// Operator surface credentials and the peer list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct WebAdminConfig {
    #[serde(default)]
    pub uri_key: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub remotes: Vec<PeerRecord>,
}

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    #[serde(default)]
    pub web_admin: WebAdminConfig,
}

// Older tooling wrote `"Remotes": null` for an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Config {
    /// Load `config.json` from the node directory.
    pub fn load(paths: &NodePaths) -> Result<Self, ConfigError> {
        let path = paths.config_file();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Write `config.json` (owner-only) and make sure the key directories exist.
    pub fn write(&self, paths: &NodePaths) -> Result<(), ConfigError> {
        let path = paths.config_file();
        let mut content = serde_json::to_vec_pretty(self)?;
        content.push(b'\n');

        let mut file = open_private_truncate(&path).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        file.write_all(&content)
            .map_err(|source| ConfigError::Write { path, source })?;

        for dir in [paths.authorized_keys_dir(), paths.self_key_dir()] {
            create_private_dir(&dir).map_err(|source| ConfigError::Write { path: dir, source })?;
        }
        Ok(())
    }

    /// Append a peer to the config file on disk.
    pub fn add_remote(paths: &NodePaths, host: &str) -> Result<Self, ConfigError> {
        let mut config = Self::load(paths)?;
        config.web_admin.remotes.push(PeerRecord::new(host));
        config.write(paths)?;
        Ok(config)
    }

    /// Reject configurations the enabled surfaces cannot run with.
    pub fn validate(&self, webadmin_enabled: bool) -> Result<(), ConfigError> {
        if webadmin_enabled {
            if self.web_admin.uri_key.is_empty() {
                return Err(ConfigError::Validation(
                    "no webadmin UriKey set in config".to_string(),
                ));
            }
            if self.web_admin.password.is_empty() {
                return Err(ConfigError::Validation(
                    "no webadmin Password set in config".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn peers(&self) -> &[PeerRecord] {
        &self.web_admin.remotes
    }
}

fn open_private_truncate(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    match builder.create(path) {
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}

/// Protocol timings and the listen port.
///
/// Defaults are the protocol constants; tests shrink or move them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSettings {
    pub port: u16,
    pub client_timeout: Duration,
    pub shutdown_grace: Duration,
    pub freshness_window: Duration,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_NODE_PORT,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }
}
