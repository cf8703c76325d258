//! Kubernetes client module
//!
//! Builds kube-rs clients for fleet clusters and exposes them through the
//! [`ClusterClient`] seam in [`client`].
//!
//! Supports HTTP/HTTPS proxy configuration via standard environment variables:
//! - `HTTP_PROXY` / `http_proxy`: HTTP proxy URL
//! - `HTTPS_PROXY` / `https_proxy`: HTTPS proxy URL
//! - `NO_PROXY` / `no_proxy`: Comma-separated list of hosts to bypass proxy
//!
//! Internal API server hosts are added to NO_PROXY automatically.

pub mod client;

pub use client::{
    ClientError, ClusterClient, ClusterConnector, ClusterTarget, KubeClusterClient, KubeConnector,
};

use std::path::Path;
use std::sync::Mutex;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use url::Url;

/// Serialises NO_PROXY rewrites between concurrent connects
static NO_PROXY_LOCK: Mutex<()> = Mutex::new(());

/// Build a client for an explicit kubeconfig/context, or infer one
///
/// With neither set the default strategy applies: in-cluster config,
/// `KUBECONFIG`, then `~/.kube/config`.
pub async fn create_client(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
) -> Result<Client, ClientError> {
    let config = if kubeconfig.is_none() && context.is_none() {
        Config::infer()
            .await
            .map_err(|e| ClientError::Config(e.to_string()))?
    } else {
        let raw = match kubeconfig {
            Some(path) => Kubeconfig::read_from(path),
            None => Kubeconfig::read(),
        }
        .map_err(|e| ClientError::Config(e.to_string()))?;

        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };
        Config::from_custom_kubeconfig(raw, &options)
            .await
            .map_err(|e| ClientError::Config(e.to_string()))?
    };

    if let Ok(url) = Url::parse(&config.cluster_url.to_string()) {
        if let Some(host) = url.host_str() {
            ensure_no_proxy_bypass(host);
        }
    }

    Client::try_from(config).map_err(|e| ClientError::Config(e.to_string()))
}

/// `current-context` of a kubeconfig (explicit path or default loading rules)
pub fn current_context(kubeconfig: Option<&Path>) -> Option<String> {
    let raw = match kubeconfig {
        Some(path) => Kubeconfig::read_from(path),
        None => Kubeconfig::read(),
    };
    match raw {
        Ok(config) => config.current_context.filter(|c| !c.is_empty()),
        Err(e) => {
            tracing::debug!("Could not read kubeconfig: {}", e);
            None
        }
    }
}

/// Add an internal API host to NO_PROXY unless already covered
fn ensure_no_proxy_bypass(host: &str) {
    if !is_internal_host(host) {
        return;
    }

    let _guard = NO_PROXY_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    // NO_PROXY takes precedence over no_proxy
    let current = std::env::var("NO_PROXY")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var("no_proxy").ok())
        .unwrap_or_default();

    if no_proxy_contains(&current, host) {
        return;
    }

    let updated = if current.is_empty() {
        host.to_string()
    } else {
        format!("{},{}", current, host)
    };

    tracing::debug!("Adding {} to NO_PROXY", host);
    // SAFETY: writers are serialised by NO_PROXY_LOCK and the value is only
    // read while building clients.
    unsafe {
        std::env::set_var("NO_PROXY", &updated);
        std::env::set_var("no_proxy", &updated);
    }
}

/// Heuristic for private or corporate API server hosts
fn is_internal_host(host: &str) -> bool {
    if host.starts_with("10.")
        || host.starts_with("172.")
        || host.starts_with("192.168.")
        || matches!(host, "localhost" | "127.0.0.1" | "::1")
    {
        return true;
    }

    if [".local", ".internal"].iter().any(|tld| host.ends_with(tld)) {
        return true;
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() < 2 {
        return false;
    }

    // *.corp.x, *.internal.x, *.int.x
    if matches!(parts[parts.len() - 2], "corp" | "internal" | "int" | "local") {
        return true;
    }
    if parts.len() >= 3 && matches!(parts[parts.len() - 3], "dev" | "test" | "staging" | "qa" | "uat")
    {
        return true;
    }

    // devprod.example.com, testapi.example.com; never the TLD itself
    const PREFIXES: [&str; 6] = ["dev", "test", "staging", "qa", "uat", "internal"];
    parts[..parts.len() - 1]
        .iter()
        .any(|part| PREFIXES.iter().any(|p| part.starts_with(p)))
}

/// Whether a NO_PROXY list already covers `host`
///
/// Handles exact entries, leading-dot suffixes (`.example.com`) and bare
/// domains that cover their subdomains.
fn no_proxy_contains(no_proxy: &str, host: &str) -> bool {
    no_proxy
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .any(|pattern| {
            let domain = pattern.strip_prefix('.').unwrap_or(pattern);
            host == domain || host.ends_with(&format!(".{}", domain))
        })
}
