use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use veto_core::VetoError;

use crate::schema::VetoConfig;

/// Loads and reloads the Veto configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<VetoConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > VETO_CONFIG env > ~/.veto/veto.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("VETO_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".veto")
            .join("veto.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> veto_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            VetoConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse a config from a TOML string, applying env overrides and validation.
    pub fn from_toml(raw: &str) -> veto_core::Result<VetoConfig> {
        let config = toml::from_str::<VetoConfig>(raw)
            .map_err(|e| VetoError::Config(format!("failed to parse config: {}", e)))?;
        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;
        Ok(config)
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> VetoConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<VetoConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Reload the config from disk. The current config is kept if the new
    /// file fails to parse or validate.
    pub fn reload(&self) -> veto_core::Result<()> {
        if !self.config_path.exists() {
            return Err(VetoError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read(&self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    fn read(path: &Path) -> veto_core::Result<VetoConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<VetoConfig>(&raw).map_err(|e| {
            VetoError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Log warnings, fail on errors.
    fn check(config: &VetoConfig) -> veto_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(VetoError::Config(e)),
        }
    }

    /// Apply env var overrides (VETO_DB_PATH, VETO_LOG_LEVEL, etc.)
    fn apply_env_overrides(mut config: VetoConfig) -> VetoConfig {
        if let Ok(v) = std::env::var("VETO_DB_PATH") {
            config.storage.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VETO_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("VETO_DAILY_LIMIT") {
            if let Ok(limit) = v.parse::<f64>() {
                config.policy.daily_limit = limit;
            }
        }
        if let Ok(v) = std::env::var("VETO_SINGLE_TRANSACTION_LIMIT") {
            if let Ok(limit) = v.parse::<f64>() {
                config.policy.single_transaction_limit = limit;
            }
        }
        config
    }
}
