//! Configuration system for fluxfleet
//!
//! A single YAML file describes the additional clusters and fleet-wide
//! defaults; environment variables and command-line flags layer on top.

pub mod defaults;
pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::{ConfigLoader, Overrides};
pub use schema::{ClusterConfig, Config, DefaultsConfig, LoggerConfig};

/// Get a configuration value by key (dot notation)
pub fn get_config_value(config: &Config, key: &str) -> anyhow::Result<String> {
    match key {
        "defaults.namespace" => Ok(config.defaults.namespace.clone()),
        "defaults.refreshInterval" => Ok(schema::duration_format::format(
            config.defaults.refresh_interval,
        )),
        "defaults.maxConcurrentClusters" => Ok(config.defaults.max_concurrent_clusters.to_string()),
        "defaults.eventsEnabled" => Ok(config.defaults.events_enabled.to_string()),
        "logger.level" => Ok(config.logger.level.clone()),
        "clusters" => Ok(config
            .clusters
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",")),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_config_value() {
        let config = Config::default();
        assert_eq!(
            get_config_value(&config, "defaults.refreshInterval").unwrap(),
            "5s"
        );
        assert_eq!(
            get_config_value(&config, "defaults.maxConcurrentClusters").unwrap(),
            "10"
        );
        assert!(get_config_value(&config, "ui.skin").is_err());
    }
}
