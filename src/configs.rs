use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::generate_root_ca::SignatureAlgorithm;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub root_ca_defaults: RootCADefaults,
    #[serde(default)]
    pub leaf_defaults: LeafDefaults,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_directory")]
    pub directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_storage_directory(),
        }
    }
}

fn default_storage_directory() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            web_root: default_web_root(),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_web_root() -> PathBuf {
    PathBuf::from("public")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RootCADefaults {
    #[serde(default = "default_root_ca_cn")]
    pub common_name: String,
    #[serde(default = "default_root_ca_validity")]
    pub validity_days: u32,
    #[serde(default = "default_key_size")]
    pub key_size: u32,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

impl Default for RootCADefaults {
    fn default() -> Self {
        Self {
            common_name: default_root_ca_cn(),
            validity_days: default_root_ca_validity(),
            key_size: default_key_size(),
            algorithm: default_algorithm(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LeafDefaults {
    #[serde(default = "default_leaf_validity")]
    pub validity_days: u32,
    #[serde(default = "default_key_size")]
    pub key_size: u32,
}

impl Default for LeafDefaults {
    fn default() -> Self {
        Self {
            validity_days: default_leaf_validity(),
            key_size: default_key_size(),
        }
    }
}

fn default_root_ca_cn() -> String {
    "SimpleCA Root".to_string()
}

fn default_root_ca_validity() -> u32 {
    3650 // 10 years
}

fn default_leaf_validity() -> u32 {
    365
}

fn default_key_size() -> u32 {
    2048
}

fn default_algorithm() -> String {
    SignatureAlgorithm::default().to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load `config.toml` if it exists, defaults otherwise. The `PORT`
    /// environment variable overrides the configured port.
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .context(format!("Invalid PORT value: {}", port))?;
        }
        Ok(())
    }
}
