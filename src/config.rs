//! TOML configuration, loaded from `~/.stashd/config.toml` by default.
//!
//! Every section and field carries a serde default, so a missing file or a
//! partial file both work: the server runs with loopback defaults out of
//! the box.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Binding to a non-loopback address is refused unless this is set.
    pub allow_public_bind: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            allow_public_bind: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether new user registration is allowed.
    pub allow_registration: bool,
    /// Maximum registered users (0 = unlimited).
    pub max_users: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_registration: true,
            max_users: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the SQLite databases. Defaults to `~/.stashd`.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load from `path` when given, otherwise from the default location.
    /// A missing file yields pure defaults; a malformed file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_dir()?.join("config.toml"),
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the data directory, creating it if needed.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let dir = match &self.storage.data_dir {
            Some(d) => d.clone(),
            None => default_dir()?,
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data dir {}", dir.display()))?;
        Ok(dir)
    }
}

fn default_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("could not determine home directory")?;
    Ok(home.join(".stashd"))
}
