//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::crypto::entity::{DEFAULT_KEY_SIZE_BITS, MAX_KEY_SIZE_BITS};
use crate::domain::keys::KeyLifecycleManager;
use crate::domain::keys::repository::SecureStorage;
use crate::infrastructure::primitives::RustCryptoPrimitives;
use crate::infrastructure::storage::{InMemorySecureStorage, KeyringSecureStorage};
use crate::infrastructure::storage::keyring::DEFAULT_KEYRING_SERVICE;

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "UMBRA_CONFIG_DIR";

/// Umbra configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UmbraConfig {
    pub bridge: BridgeConfig,
    pub keys: KeysConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub request_timeout_ms: u64,
    pub helper_path: PathBuf,
    pub helper_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Keyring,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Keyring => write!(f, "keyring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub backend: StorageBackend,
    pub keyring_service: String,
    pub default_key_size_bits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            helper_path: PathBuf::from("umbra-helper"),
            helper_args: Vec::new(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            default_key_size_bits: DEFAULT_KEY_SIZE_BITS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "umbra=info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl KeysConfig {
    /// Build the configured storage delegate
    pub fn storage(&self) -> Arc<dyn SecureStorage> {
        match self.backend {
            StorageBackend::Memory => Arc::new(InMemorySecureStorage::new()),
            StorageBackend::Keyring => {
                Arc::new(KeyringSecureStorage::with_service(&self.keyring_service))
            }
        }
    }

    /// Build a key manager over the configured storage and default key size
    pub fn manager(&self) -> anyhow::Result<KeyLifecycleManager> {
        let primitives = Arc::new(RustCryptoPrimitives::new());
        let manager = KeyLifecycleManager::new(self.storage(), primitives)
            .with_default_key_size(self.default_key_size_bits)
            .context("Invalid keys.default_key_size_bits")?;
        Ok(manager)
    }
}

impl UmbraConfig {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("umbra")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or defaults if the file does not exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: UmbraConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bridge.request_timeout_ms == 0 {
            return Err(anyhow!("bridge.request_timeout_ms must be greater than zero"));
        }
        if self.bridge.helper_path.as_os_str().is_empty() {
            return Err(anyhow!("bridge.helper_path must not be empty"));
        }
        let bits = self.keys.default_key_size_bits;
        if bits == 0 || bits % 8 != 0 || bits > MAX_KEY_SIZE_BITS {
            return Err(anyhow!(
                "keys.default_key_size_bits must be a positive multiple of 8 up to {}",
                MAX_KEY_SIZE_BITS
            ));
        }
        if self.keys.keyring_service.trim().is_empty() {
            return Err(anyhow!("keys.keyring_service must not be empty"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "bridge.request_timeout_ms" => Ok(self.bridge.request_timeout_ms.to_string()),
            "bridge.helper_path" => Ok(self.bridge.helper_path.display().to_string()),
            "bridge.helper_args" => Ok(self.bridge.helper_args.join(" ")),
            "keys.backend" => Ok(self.keys.backend.to_string()),
            "keys.keyring_service" => Ok(self.keys.keyring_service.clone()),
            "keys.default_key_size_bits" => Ok(self.keys.default_key_size_bits.to_string()),
            "logging.filter" => Ok(self.logging.filter.clone()),
            _ => Err(anyhow!("Unknown configuration key: {}", key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "bridge.request_timeout_ms" => {
                let timeout: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid request_timeout_ms value: {}", value))?;
                if timeout == 0 {
                    return Err(anyhow!("Request timeout must be greater than zero"));
                }
                self.bridge.request_timeout_ms = timeout;
            }
            "bridge.helper_path" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("Helper path must not be empty"));
                }
                self.bridge.helper_path = PathBuf::from(value);
            }
            "bridge.helper_args" => {
                self.bridge.helper_args = value.split_whitespace().map(String::from).collect();
            }
            "keys.backend" => {
                self.keys.backend = match value {
                    "memory" => StorageBackend::Memory,
                    "keyring" => StorageBackend::Keyring,
                    _ => {
                        return Err(anyhow!(
                            "Invalid storage backend: {}. Valid options: memory, keyring",
                            value
                        ));
                    }
                };
            }
            "keys.keyring_service" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("Keyring service must not be empty"));
                }
                self.keys.keyring_service = value.to_string();
            }
            "keys.default_key_size_bits" => {
                let bits: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid default_key_size_bits value: {}", value))?;
                if bits == 0 || bits % 8 != 0 || bits > MAX_KEY_SIZE_BITS {
                    return Err(anyhow!(
                        "Key size must be a positive multiple of 8 up to {}",
                        MAX_KEY_SIZE_BITS
                    ));
                }
                self.keys.default_key_size_bits = bits;
            }
            "logging.filter" => {
                self.logging.filter = value.to_string();
            }
            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "bridge.request_timeout_ms",
            "bridge.helper_path",
            "bridge.helper_args",
            "keys.backend",
            "keys.keyring_service",
            "keys.default_key_size_bits",
            "logging.filter",
        ];

        keys.into_iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }
}
