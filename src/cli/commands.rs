//! CLI command handlers

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::config::{Config, ConfigLoader, paths};
use crate::models::{FluxResourceKind, format_age};
use crate::services::{FleetManager, Update};
use crate::state::FleetState;

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Show configuration file path
    Path,
    /// Print the merged configuration, or one key (e.g. "defaults.refreshInterval")
    Show {
        key: Option<String>,
    },
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration
    Validate,
}

/// Mutations exposed on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Suspend,
    Resume,
    Reconcile,
}

/// Handle configuration subcommands
pub fn handle_config_command(
    cmd: ConfigSubcommand,
    config_path: Option<&Path>,
    config: Result<Config>,
) -> Result<()> {
    let file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(paths::root_config_path);

    match cmd {
        ConfigSubcommand::Path => {
            println!("{}", file.display());
        }
        ConfigSubcommand::Show { key } => {
            let config = config.context("Failed to load configuration")?;
            match key {
                Some(key) => println!("{}", crate::config::get_config_value(&config, &key)?),
                None => {
                    let yaml = serde_yaml::to_string(&config)
                        .context("Failed to serialize configuration")?;
                    print!("{}", yaml);
                }
            }
        }
        ConfigSubcommand::Init { force } => {
            ConfigLoader::init(&file, force)?;
            println!("Configuration written to {}", file.display());
        }
        ConfigSubcommand::Validate => {
            if !file.exists() {
                println!("No config file at {}; defaults apply", file.display());
                return Ok(());
            }
            let config = ConfigLoader::validate(&file)?;
            println!(
                "Configuration is valid ({} additional cluster(s))",
                config.clusters.len()
            );
        }
    }

    Ok(())
}

/// Stream fleet updates until Ctrl-C
pub async fn run_watch(config: Config) -> Result<()> {
    let manager = FleetManager::new(config);
    let mut updates = manager
        .subscribe()
        .context("Update channels already taken")?;
    manager
        .start()
        .await
        .context("Failed to connect to the default cluster")?;

    println!(
        "Watching {} cluster(s): {}",
        manager.clusters().len(),
        manager.clusters().into_iter().collect::<Vec<_>>().join(", ")
    );

    let state = FleetState::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            update = updates.recv() => match update {
                Some(update) => {
                    println!("{}", describe_update(&update));
                    state.apply(update);
                }
                None => break,
            },
        }
    }

    manager.stop().await;
    while let Some(update) = updates.recv().await {
        state.apply(update);
    }

    for ((cluster, kind), counts) in state.counts() {
        println!(
            "{:<20} {:<16} total={} ready={} suspended={}",
            cluster, kind, counts.total, counts.ready, counts.suspended
        );
    }
    Ok(())
}

/// Connect every configured cluster and print the reachable ones
pub async fn run_clusters(config: Config) -> Result<()> {
    let manager = FleetManager::new(config);
    let mut updates = manager
        .subscribe()
        .context("Update channels already taken")?;
    manager
        .start()
        .await
        .context("Failed to connect to the default cluster")?;
    manager.stop().await;

    let current = manager.current_cluster();
    for name in manager.clusters() {
        let marker = if current.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    while let Some(update) = updates.recv().await {
        if let Update::Error(error) = update {
            eprintln!("! {}: {}", error.cluster, error.error);
        }
    }
    Ok(())
}

/// List one kind in the selected cluster and namespace
pub async fn run_list(config: Config, kind: &str, cluster: Option<&str>) -> Result<()> {
    let kind = FluxResourceKind::from_str_case_insensitive(kind)
        .ok_or_else(|| anyhow::anyhow!("Unsupported resource kind: {}", kind))?;

    let manager = connect_for(config, cluster).await?;
    let listed = manager.list_resources(kind).await;
    manager.stop().await;

    let resources = listed?;
    println!(
        "{:<20} {:<32} {:<6} {:<9} {:<8} MESSAGE",
        "NAMESPACE", "NAME", "READY", "SUSPENDED", "AGE"
    );
    for r in resources {
        println!(
            "{:<20} {:<32} {:<6} {:<9} {:<8} {}",
            r.namespace,
            r.name,
            r.ready,
            r.suspended,
            format_age(r.age),
            r.message
        );
    }
    Ok(())
}

/// Suspend, resume or reconcile one object
pub async fn run_mutation(
    config: Config,
    mutation: Mutation,
    kind: &str,
    name: &str,
    cluster: Option<&str>,
) -> Result<()> {
    let manager = connect_for(config, cluster).await?;
    let result = match mutation {
        Mutation::Suspend => manager.suspend_resource(kind, name).await,
        Mutation::Resume => manager.resume_resource(kind, name).await,
        Mutation::Reconcile => manager.reconcile_resource(kind, name).await,
    };
    manager.stop().await;

    result?;
    let verb = match mutation {
        Mutation::Suspend => "suspended",
        Mutation::Resume => "resumed",
        Mutation::Reconcile => "reconciliation requested",
    };
    println!("► {} {}: {}", kind, name, verb);
    Ok(())
}

async fn connect_for(config: Config, cluster: Option<&str>) -> Result<FleetManager> {
    let manager = FleetManager::new(config);
    manager
        .start()
        .await
        .context("Failed to connect to the default cluster")?;
    if let Some(cluster) = cluster {
        manager.set_current_cluster(cluster)?;
    }
    Ok(manager)
}

/// One-line rendering of a bus message
pub fn describe_update(update: &Update) -> String {
    match update {
        Update::Resources(u) => {
            let ready = u.resources.iter().filter(|r| r.ready).count();
            let suspended = u.resources.iter().filter(|r| r.suspended).count();
            format!(
                "[{}] {}: {} total, {} ready, {} suspended",
                u.cluster,
                u.kind,
                u.resources.len(),
                ready,
                suspended
            )
        }
        Update::Events(u) => {
            let warnings = u.events.iter().filter(|e| e.is_warning()).count();
            match u.events.iter().max_by_key(|e| e.last_seen) {
                Some(latest) => format!(
                    "[{}] {} event(s), {} warning(s); latest {} {} {}: {}",
                    u.cluster,
                    u.events.len(),
                    warnings,
                    latest.type_,
                    latest.reason,
                    latest.object_ref(),
                    latest.message
                ),
                None => format!("[{}] no events", u.cluster),
            }
        }
        Update::Error(u) => format!("[{}] error: {}", u.cluster, u.error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManagerError;
    use crate::models::Resource;
    use crate::services::{ErrorUpdate, ResourceUpdate};
    use chrono::Utc;

    #[test]
    fn test_describe_resource_update() {
        let mut ready = Resource::empty(FluxResourceKind::HelmRelease, Utc::now());
        ready.ready = true;
        let mut suspended = Resource::empty(FluxResourceKind::HelmRelease, Utc::now());
        suspended.suspended = true;

        let update = Update::Resources(ResourceUpdate {
            cluster: "prod".to_string(),
            kind: FluxResourceKind::HelmRelease,
            resources: vec![ready, suspended],
        });
        insta::assert_snapshot!(describe_update(&update), @"[prod] HelmRelease: 2 total, 1 ready, 1 suspended");
    }

    #[test]
    fn test_describe_error_update() {
        let update = Update::Error(ErrorUpdate {
            cluster: "edge".to_string(),
            error: ManagerError::ClusterNotConnected("edge".to_string()),
        });
        insta::assert_snapshot!(describe_update(&update), @"[edge] error: cluster edge is not connected");
    }
}
