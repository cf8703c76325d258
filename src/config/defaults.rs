//! Default configuration values
//!
//! Provides default configuration instances and helper functions.

use std::time::Duration;

use super::schema::Config;

/// Namespace Flux installs itself into
pub const DEFAULT_NAMESPACE: &str = "flux-system";

/// Get the default configuration
pub fn default_config() -> Config {
    Config::default()
}

pub(crate) fn namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

pub(crate) fn refresh_interval() -> Duration {
    Duration::from_secs(5)
}

pub(crate) fn max_concurrent_clusters() -> usize {
    10
}

pub(crate) fn events_enabled() -> bool {
    true
}

pub fn log_level() -> String {
    "info".to_string()
}

/// Commented starter file written by `config init`
pub fn starter_yaml() -> String {
    format!(
        r#"# fluxfleet configuration
#
# Additional clusters, connected next to the current kubeconfig context:
# clusters:
#   - name: staging
#     context: staging-admin
#     kubeconfig: /path/to/kubeconfig
#     namespace: flux-system
#     description: Staging fleet
defaults:
  namespace: {namespace}
  refreshInterval: {interval}
  maxConcurrentClusters: {limit}
  eventsEnabled: {events}
logger:
  level: {level}
"#,
        namespace = namespace(),
        interval = super::schema::duration_format::format(refresh_interval()),
        limit = max_concurrent_clusters(),
        events = events_enabled(),
        level = log_level(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = default_config();
        assert_eq!(config.defaults.namespace, "flux-system");
    }

    #[test]
    fn test_starter_yaml_parses_to_defaults() {
        let config: Config = serde_yaml::from_str(&starter_yaml()).unwrap();
        assert_eq!(config, default_config());
    }
}
