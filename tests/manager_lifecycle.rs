//! FleetManager start/stop behaviour over fake clusters

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeCluster, FakeConnector};
use fluxfleet::services::FleetManager;
use fluxfleet::services::connection_registry::CONNECT_TIMEOUT;
use tokio::time::Instant;
use fluxfleet::{FluxResourceKind, ManagerError, Update};

#[tokio::test]
async fn test_unreachable_cluster_is_reported_once() {
    let alpha = FakeCluster::new();
    alpha.insert(
        FluxResourceKind::Kustomization,
        common::kustomization("flux-system", "apps", "True"),
    );
    let connector = FakeConnector::new();
    connector.add("alpha", alpha);

    let mut config = common::fleet_config("alpha", &["beta"]);
    config.defaults.refresh_interval = Duration::from_millis(20);
    let manager = FleetManager::with_connector(config, connector);
    let mut updates = manager.subscribe().unwrap();

    manager.start().await.unwrap();
    assert_eq!(
        manager.clusters().into_iter().collect::<Vec<_>>(),
        vec!["alpha".to_string()]
    );
    assert_eq!(manager.current_cluster().as_deref(), Some("alpha"));

    let mut beta_errors = 0;
    let mut alpha_kinds = std::collections::BTreeSet::new();
    let collect = async {
        while alpha_kinds.len() < FluxResourceKind::all().len() {
            match updates.recv().await {
                Some(Update::Error(e)) if e.cluster == "beta" => {
                    assert!(matches!(e.error, ManagerError::Connection { .. }));
                    beta_errors += 1;
                }
                Some(Update::Resources(u)) => {
                    assert_eq!(u.cluster, "alpha");
                    alpha_kinds.insert(u.kind);
                }
                Some(_) => {}
                None => break,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("no resource updates from alpha");

    manager.stop().await;
    while let Some(update) = updates.recv().await {
        if let Update::Error(e) = update {
            if e.cluster == "beta" {
                beta_errors += 1;
            }
        }
    }
    assert_eq!(beta_errors, 1);
    assert!(updates.is_terminated());
}

#[tokio::test]
async fn test_default_cluster_failure_is_fatal() {
    let connector = FakeConnector::new();
    let manager = FleetManager::with_connector(common::fleet_config("missing", &[]), connector);

    let err = manager.start().await.unwrap_err();
    assert!(matches!(err, ManagerError::Connection { ref cluster, .. } if cluster == "missing"));
    assert!(manager.clusters().is_empty());
}

#[tokio::test]
async fn test_stop_closes_channels() {
    let connector = FakeConnector::new();
    connector.add("alpha", FakeCluster::new());
    let manager = FleetManager::with_connector(common::fleet_config("alpha", &[]), connector);
    let mut updates = manager.subscribe().unwrap();
    assert!(manager.subscribe().is_none());

    manager.start().await.unwrap();
    manager.stop().await;
    assert!(manager.is_stopped());

    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while updates.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "channels stayed open after stop");

    // Stopping twice is harmless and start refuses to run again
    manager.stop().await;
    assert!(matches!(manager.start().await, Err(ManagerError::Cancelled)));
}

#[tokio::test]
async fn test_second_start_retries_missing_clusters() {
    let connector = FakeConnector::new();
    connector.add("alpha", FakeCluster::new());
    let config = common::fleet_config("alpha", &["beta"]);
    let manager = FleetManager::with_connector(config, connector.clone());
    let _updates = manager.subscribe().unwrap();

    manager.start().await.unwrap();
    assert!(!manager.clusters().contains("beta"));

    connector.add("beta", FakeCluster::new());
    manager.start().await.unwrap();
    assert!(manager.clusters().contains("beta"));
    // alpha was not reconnected
    assert_eq!(connector.connects(), 3);
    // Selection is kept
    assert_eq!(manager.current_cluster().as_deref(), Some("alpha"));

    manager.stop().await;
}

#[tokio::test]
async fn test_selection_and_listing() {
    let alpha = FakeCluster::new();
    alpha.insert(
        FluxResourceKind::Kustomization,
        common::kustomization("flux-system", "infra", "True"),
    );
    alpha.insert(
        FluxResourceKind::Kustomization,
        common::kustomization("apps", "podinfo", "False"),
    );
    let connector = FakeConnector::new();
    connector.add("alpha", alpha);
    let manager = FleetManager::with_connector(common::fleet_config("alpha", &[]), connector);
    manager.start().await.unwrap();

    assert_eq!(manager.current_namespace().as_deref(), Some("flux-system"));
    let listed = manager
        .list_resources(FluxResourceKind::Kustomization)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "infra");

    manager.set_current_namespace(None);
    let listed = manager
        .list_resources(FluxResourceKind::Kustomization)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    assert!(matches!(
        manager.set_current_cluster("nope"),
        Err(ManagerError::ClusterNotFound(_))
    ));
    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_hanging_connect() {
    let connector = FakeConnector::new();
    connector.add("alpha", FakeCluster::new());
    connector.hang("beta");
    connector.hang("gamma");
    let config = common::fleet_config("alpha", &["beta", "gamma"]);
    let manager = Arc::new(FleetManager::with_connector(config, connector.clone()));
    let mut updates = manager.subscribe().unwrap();

    let starting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connector.connects(), 2);

    let began = Instant::now();
    manager.stop().await;
    assert!(began.elapsed() < CONNECT_TIMEOUT, "stop took {:?}", began.elapsed());

    let started = starting.await.unwrap();
    assert!(matches!(started, Err(ManagerError::Cancelled)));
    // gamma was never attempted and no engine was left running
    assert_eq!(connector.connects(), 2);
    assert_eq!(
        manager.clusters().into_iter().collect::<Vec<_>>(),
        vec!["alpha".to_string()]
    );
    while let Some(update) = updates.recv().await {
        assert!(!matches!(update, Update::Resources(_)), "engine ran after stop");
        assert!(!matches!(update, Update::Error(_)), "cancelled connect was reported");
    }
}

#[tokio::test(start_paused = true)]
async fn test_hanging_cluster_times_out() {
    let connector = FakeConnector::new();
    connector.add("alpha", FakeCluster::new());
    connector.hang("beta");
    let manager = FleetManager::with_connector(common::fleet_config("alpha", &["beta"]), connector);
    let mut updates = manager.subscribe().unwrap();

    let began = Instant::now();
    manager.start().await.unwrap();
    assert!(began.elapsed() >= CONNECT_TIMEOUT);
    assert!(!manager.clusters().contains("beta"));

    let error = updates.errors.try_recv().unwrap();
    assert_eq!(error.cluster, "beta");
    assert!(error.error.is_timeout(), "{}", error.error);
    insta::assert_snapshot!(
        error.error.to_string(),
        @"failed to connect to cluster beta: timed out after 5s"
    );

    manager.stop().await;
}
