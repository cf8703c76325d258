//! Configuration loading and merging logic
//!
//! Precedence order (highest to lowest):
//! 1. Command-line flags
//! 2. Environment variable overrides (`FLUXFLEET_*`, `KUBECONFIG`)
//! 3. Config file (`--config` or the root config path)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::schema::{Config, duration_format};
use super::{defaults, paths};

/// Runtime selection coming from command-line flags
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub namespace: Option<String>,
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Config> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => {
                let root = paths::root_config_path();
                if root.exists() {
                    Self::load_file(&root)?
                } else {
                    tracing::debug!("No config file at {}, using defaults", root.display());
                    defaults::default_config()
                }
            }
        };

        Self::apply_env_overrides(&mut config);
        Self::apply_overrides(&mut config, overrides);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate a config file without applying any overrides
    pub fn validate(path: &Path) -> Result<Config> {
        let config = Self::load_file(path)?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Apply environment variable overrides; malformed values are ignored
    pub fn apply_env_overrides(config: &mut Config) {
        if let Ok(namespace) = std::env::var("FLUXFLEET_NAMESPACE") {
            config.defaults.namespace = namespace;
        }

        if let Ok(raw) = std::env::var("FLUXFLEET_REFRESH_INTERVAL") {
            match duration_format::parse(&raw) {
                Ok(interval) => config.defaults.refresh_interval = interval,
                Err(e) => tracing::warn!("Ignoring FLUXFLEET_REFRESH_INTERVAL: {}", e),
            }
        }

        if let Ok(raw) = std::env::var("FLUXFLEET_MAX_CONCURRENT_CLUSTERS") {
            match raw.parse() {
                Ok(limit) => config.defaults.max_concurrent_clusters = limit,
                Err(e) => tracing::warn!("Ignoring FLUXFLEET_MAX_CONCURRENT_CLUSTERS: {}", e),
            }
        }

        if let Ok(raw) = std::env::var("FLUXFLEET_EVENTS_ENABLED") {
            match raw.parse() {
                Ok(enabled) => config.defaults.events_enabled = enabled,
                Err(e) => tracing::warn!("Ignoring FLUXFLEET_EVENTS_ENABLED: {}", e),
            }
        }

        // A KUBECONFIG list is left to kube's own loading rules
        if config.current_kubeconfig.is_none() {
            if let Some(raw) = std::env::var_os("KUBECONFIG") {
                let mut files = std::env::split_paths(&raw).filter(|p| !p.as_os_str().is_empty());
                if let (Some(file), None) = (files.next(), files.next()) {
                    config.current_kubeconfig = Some(file);
                }
            }
        }
    }

    /// Apply command-line selection on top of everything else
    pub fn apply_overrides(config: &mut Config, overrides: &Overrides) {
        if let Some(kubeconfig) = &overrides.kubeconfig {
            config.current_kubeconfig = Some(kubeconfig.clone());
        }
        if let Some(context) = &overrides.context {
            config.current_context = Some(context.clone());
        }
        if let Some(namespace) = &overrides.namespace {
            config.current_namespace = Some(namespace.clone());
        }
    }

    /// Save configuration to a file
    pub fn save(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Write the commented starter file; refuses to overwrite unless `force`
    pub fn init(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            anyhow::bail!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            );
        }
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, defaults::starter_yaml())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        ConfigLoader::apply_overrides(
            &mut config,
            &Overrides {
                kubeconfig: Some(PathBuf::from("/tmp/kubeconfig")),
                context: Some("prod".to_string()),
                namespace: None,
            },
        );
        assert_eq!(config.current_context.as_deref(), Some("prod"));
        assert_eq!(
            config.current_kubeconfig.as_deref(),
            Some(Path::new("/tmp/kubeconfig"))
        );
        assert_eq!(config.effective_namespace().as_deref(), Some("flux-system"));
    }

    #[test]
    fn test_env_overrides() {
        // SAFETY: set_var is unsafe in Rust 2024 due to potential data races.
        // No other test in this binary reads these variables.
        unsafe {
            std::env::set_var("FLUXFLEET_REFRESH_INTERVAL", "30s");
            std::env::set_var("FLUXFLEET_MAX_CONCURRENT_CLUSTERS", "not-a-number");
            std::env::set_var("FLUXFLEET_EVENTS_ENABLED", "false");
        }

        let mut config = Config::default();
        ConfigLoader::apply_env_overrides(&mut config);

        assert_eq!(config.defaults.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.defaults.max_concurrent_clusters, 10);
        assert!(!config.defaults.events_enabled);

        // SAFETY: see above
        unsafe {
            std::env::remove_var("FLUXFLEET_REFRESH_INTERVAL");
            std::env::remove_var("FLUXFLEET_MAX_CONCURRENT_CLUSTERS");
            std::env::remove_var("FLUXFLEET_EVENTS_ENABLED");
        }
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        ConfigLoader::init(&path, false).unwrap();
        assert!(ConfigLoader::init(&path, false).is_err());
        ConfigLoader::init(&path, true).unwrap();

        let config = ConfigLoader::validate(&path).unwrap();
        assert_eq!(config, Config::default());
    }
}
