//! End-to-end placement scenarios against an in-memory store.

use std::collections::{BTreeMap, BTreeSet};

use zoneplace_placement::CompileError;
use zoneplace_scheduler::{Scheduler, SchedulerError};
use zoneplace_state::{NodeId, ReplicaState, ReplicaStatus, StateStore};

fn scheduler() -> Scheduler {
    Scheduler::new(StateStore::open_in_memory().unwrap())
}

async fn add_az_nodes(s: &Scheduler, nodes: &[(NodeId, &str)]) {
    for (id, az) in nodes {
        let locality = format!("az={az}");
        s.add_node(*id, &[locality.as_str()], &[], &[]).await.unwrap();
    }
}

/// Nodes 1–3 east, 4–6 west, all with ssd.
async fn east_west_fleet(s: &Scheduler) {
    for id in 1..=6 {
        let (region, az) = if id <= 3 {
            ("region=east", "az=us-east-1")
        } else {
            ("region=west", "az=us-west-1")
        };
        s.add_node(id, &[region, az], &["ram:64GB"], &["ssd"]).await.unwrap();
    }
}

fn nodes_of(replicas: &[ReplicaState]) -> Vec<NodeId> {
    replicas.iter().filter_map(|r| r.current_node).collect()
}

fn node_set(s: &Scheduler, db: &str) -> BTreeSet<NodeId> {
    nodes_of(&s.replicas_for_database(db).unwrap()).into_iter().collect()
}

fn replicas_per_range(s: &Scheduler, db: &str) -> BTreeMap<u64, usize> {
    let mut counts = BTreeMap::new();
    for r in s.replicas_for_database(db).unwrap() {
        *counts.entry(r.range_id).or_default() += 1;
    }
    counts
}

#[tokio::test]
async fn uniform_scope_avoids_prohibited_region() {
    let s = scheduler();
    east_west_fleet(&s).await;
    s.add_database("db1", Some(3), Some(r#"["+ssd", "-region=east"]"#))
        .await
        .unwrap();
    s.place_replicas().await.unwrap();

    assert_eq!(node_set(&s, "db1"), BTreeSet::from([4, 5, 6]));
}

#[tokio::test]
async fn per_group_scope_fills_each_group() {
    let s = scheduler();
    east_west_fleet(&s).await;
    s.add_database("db1", Some(3), Some(r#"["+ssd", "-region=east"]"#))
        .await
        .unwrap();
    s.add_database(
        "db2",
        Some(3),
        Some(r#"{"[\"+ssd\",\"+region=west\"]": 2, "[\"+region=east\"]": 1}"#),
    )
    .await
    .unwrap();
    s.place_replicas().await.unwrap();

    let db2 = nodes_of(&s.replicas_for_database("db2").unwrap());
    assert_eq!(db2.len(), 3);
    assert!([4, 5, 6].contains(&db2[0]));
    assert!([4, 5, 6].contains(&db2[1]));
    assert!([1, 2, 3].contains(&db2[2]));
}

#[tokio::test]
async fn even_replication_across_azs() {
    let s = scheduler();
    add_az_nodes(
        &s,
        &[(1, "us-1"), (2, "us-1"), (3, "us-2"), (4, "us-2"), (5, "us-3"), (6, "us-3")],
    )
    .await;
    s.add_database("db1", None, None).await.unwrap();
    s.add_database("db2", None, None).await.unwrap();
    s.place_replicas().await.unwrap();

    let db1 = node_set(&s, "db1");
    let db2 = node_set(&s, "db2");
    let all: BTreeSet<_> = db1.union(&db2).copied().collect();
    assert_eq!(all, (1..=6).collect::<BTreeSet<_>>());

    for nodes in [&db1, &db2] {
        assert_eq!(nodes.len(), 3);
        let azs: BTreeSet<_> = nodes.iter().map(|n| (n + 1) / 2).collect();
        assert_eq!(azs.len(), 3, "replicas share an AZ: {nodes:?}");
    }
}

#[tokio::test]
async fn per_replica_constraints_to_specific_zones() {
    let s = scheduler();
    for (id, region, az) in [
        (1, "us-west1", "us-west1-a"),
        (2, "us-west1", "us-west1-b"),
        (3, "us-central1", "us-central1-a"),
        (5, "us-east1", "us-east1-a"),
        (6, "us-east1", "us-east1-b"),
    ] {
        let region = format!("region={region}");
        let az = format!("az={az}");
        s.add_node(id, &[region.as_str(), az.as_str()], &[], &[]).await.unwrap();
    }
    s.add_database("db1", None, None).await.unwrap();
    s.add_database(
        "west_app_db",
        Some(3),
        Some(r#"{"[\"+region=us-west1\"]": 2, "[\"+region=us-central1\"]": 1}"#),
    )
    .await
    .unwrap();
    s.bootstrap().await.unwrap();
    // Nothing left to place.
    assert!(s.place_replicas().await.unwrap().is_empty());

    let db1 = node_set(&s, "db1");
    assert!(db1.contains(&1) || db1.contains(&2));
    assert!(db1.contains(&3));
    assert!(db1.contains(&5) || db1.contains(&6));

    let west = nodes_of(&s.replicas_for_database("west_app_db").unwrap());
    assert!([1, 2].contains(&west[0]));
    assert!([1, 2].contains(&west[1]));
    assert_eq!(west[2], 3);
}

#[tokio::test]
async fn multiple_applications_writing_to_different_databases() {
    let s = scheduler();
    add_az_nodes(
        &s,
        &[(1, "us-1"), (2, "us-1"), (3, "us-1"), (4, "us-2"), (5, "us-2"), (6, "us-2")],
    )
    .await;
    s.bootstrap().await.unwrap();
    s.add_database("app1_db", Some(5), Some("")).await.unwrap();
    s.add_database("app2_db", Some(3), Some(r#"["+az=us-2"]"#))
        .await
        .unwrap();
    s.place_replicas().await.unwrap();

    let app1 = node_set(&s, "app1_db");
    assert!(app1.intersection(&BTreeSet::from([1, 2, 3])).count() > 1);
    assert!(app1.intersection(&BTreeSet::from([4, 5, 6])).count() > 1);
    assert_eq!(node_set(&s, "app2_db"), BTreeSet::from([4, 5, 6]));
}

#[tokio::test]
async fn stricter_replication_on_ssd_nodes() {
    let s = scheduler();
    for id in 1..=7 {
        let store = if id <= 5 { "ssd" } else { "hdd" };
        s.add_node(id, &[], &[], &[store]).await.unwrap();
    }
    s.bootstrap().await.unwrap();
    s.add_database("db", Some(5), Some(r#"["+ssd"]"#)).await.unwrap();
    s.place_replicas().await.unwrap();

    assert_eq!(node_set(&s, "db"), (1..=5).collect::<BTreeSet<_>>());
}

#[tokio::test]
async fn raising_system_range_replication() {
    let s = scheduler();
    for id in 1..=7 {
        let az = format!("us-{id}");
        add_az_nodes(&s, &[(id, az.as_str())]).await;
    }
    s.bootstrap().await.unwrap();
    s.edit_database("meta", 7, "").await.unwrap();
    let placed = s.place_replicas().await.unwrap();

    assert_eq!(placed.len(), 2);
    assert_eq!(node_set(&s, "meta").len(), 7);
    assert_eq!(replicas_per_range(&s, "meta").values().copied().collect::<Vec<_>>(), vec![7]);
}

#[tokio::test]
async fn incremental_rounds_do_not_move_running_replicas() {
    let s = scheduler();
    for id in 1..=7 {
        let az = format!("us-{id}");
        add_az_nodes(&s, &[(id, az.as_str())]).await;
    }
    s.bootstrap().await.unwrap();
    s.add_database("db1", Some(5), None).await.unwrap();
    s.place_replicas().await.unwrap();
    let before = s.replica_state().unwrap();

    s.add_database("db2", Some(5), None).await.unwrap();
    let placed = s.place_replicas().await.unwrap();
    let after = s.replica_state().unwrap();

    assert_eq!(placed.len(), 5);
    assert_eq!(&after[..before.len()], before.as_slice());
    assert!(after.iter().all(ReplicaState::is_running));
}

#[tokio::test]
async fn replicas_of_a_range_use_distinct_nodes() {
    let s = scheduler();
    add_az_nodes(&s, &[(1, "a"), (2, "a"), (3, "b"), (4, "b")]).await;
    s.add_database("db", Some(4), None).await.unwrap();
    s.add_range("db").await.unwrap();
    s.place_replicas().await.unwrap();

    let mut per_range: BTreeMap<u64, BTreeSet<NodeId>> = BTreeMap::new();
    for r in s.replicas_for_database("db").unwrap() {
        let fresh = per_range
            .entry(r.range_id)
            .or_default()
            .insert(r.current_node.unwrap());
        assert!(fresh, "range {} reuses a node", r.range_id);
    }
    assert_eq!(per_range.len(), 2);
}

#[tokio::test]
async fn unmatched_requirement_is_infeasible_and_writes_nothing() {
    let s = scheduler();
    east_west_fleet(&s).await;
    s.add_database("db1", Some(3), None).await.unwrap();
    s.place_replicas().await.unwrap();
    let before = s.replica_state().unwrap();

    s.add_database("gpu_db", Some(1), Some(r#"["+gpu"]"#)).await.unwrap();
    let err = s.place_replicas().await.unwrap_err();
    assert!(matches!(err, SchedulerError::InfeasiblePlacement(_)));

    let after = s.replica_state().unwrap();
    assert_eq!(&after[..before.len()], before.as_slice());
    assert!(after[before.len()..].iter().all(|r| r.status == ReplicaStatus::Pending));
}

#[tokio::test]
async fn malformed_selector_is_rejected_before_any_write() {
    let s = scheduler();
    east_west_fleet(&s).await;
    let err = s
        .add_database("db1", Some(3), Some(r#"["+region=east=west"]"#))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::InvalidConstraintSpec(CompileError::MalformedSelector(_))
    ));
    assert!(s.state().list_databases().unwrap().is_empty());
    assert!(s.replica_state().unwrap().is_empty());
}

#[tokio::test]
async fn oversubscribed_scope_is_rejected() {
    let s = scheduler();
    let err = s
        .add_database("db1", Some(2), Some(r#"{"[\"+ssd\"]": 2, "[\"-ssd\"]": 1}"#))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::InvalidConstraintSpec(CompileError::OverSubscribed { .. })
    ));
}

#[tokio::test]
async fn edits_keep_replica_counts_in_step() {
    let s = scheduler();
    s.add_database("db", Some(3), None).await.unwrap();
    s.add_range("db").await.unwrap();
    assert_eq!(replicas_per_range(&s, "db").values().copied().collect::<Vec<_>>(), vec![3, 3]);

    s.edit_database("db", 5, r#"["+ssd"]"#).await.unwrap();
    assert_eq!(replicas_per_range(&s, "db").values().copied().collect::<Vec<_>>(), vec![5, 5]);

    let topology = s.state().snapshot().unwrap();
    for r in s.replicas_for_database("db").unwrap() {
        let rules: Vec<_> = topology
            .constraints_for(r.id)
            .iter()
            .map(|c| c.rule.to_string())
            .collect();
        assert_eq!(rules, vec!["+ssd"]);
    }
}

#[tokio::test]
async fn decreasing_replication_is_rejected() {
    let s = scheduler();
    s.add_database("db", Some(5), None).await.unwrap();
    let err = s.edit_database("db", 3, "").await.unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::ReplicationFactorDecrease {
            current: 5,
            requested: 3,
            ..
        }
    ));
    assert_eq!(s.replicas_for_database("db").unwrap().len(), 5);
}

#[tokio::test]
async fn edit_conflicting_with_running_replica_is_infeasible() {
    let s = scheduler();
    east_west_fleet(&s).await;
    s.add_database("db", Some(3), Some(r#"["+region=east"]"#))
        .await
        .unwrap();
    s.place_replicas().await.unwrap();
    let before = s.replica_state().unwrap();

    s.edit_database("db", 3, r#"["+region=west"]"#).await.unwrap();
    let err = s.place_replicas().await.unwrap_err();

    assert!(matches!(err, SchedulerError::InfeasiblePlacement(_)));
    assert_eq!(s.replica_state().unwrap(), before);
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    let s = scheduler();
    add_az_nodes(&s, &[(1, "a"), (2, "a"), (3, "b"), (4, "b"), (5, "c")]).await;
    let first = s.bootstrap().await.unwrap();
    assert_eq!(first.len(), 16);

    let second = s.bootstrap().await.unwrap();
    assert!(second.is_empty());
    let names: Vec<_> = s
        .state()
        .list_databases()
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["meta", "liveness", "system", "timeseries"]);
}

#[tokio::test]
async fn concurrent_rounds_place_each_replica_once() {
    let s = scheduler();
    add_az_nodes(&s, &[(1, "a"), (2, "b"), (3, "c")]).await;
    s.add_database("db", None, None).await.unwrap();

    let (a, b) = tokio::join!(s.place_replicas(), s.place_replicas());
    assert_eq!(a.unwrap().len() + b.unwrap().len(), 3);
    assert!(s.replica_state().unwrap().iter().all(ReplicaState::is_running));
}

#[tokio::test]
async fn placements_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zoneplace.redb");

    let placed = {
        let s = Scheduler::new(StateStore::open(&path).unwrap());
        add_az_nodes(&s, &[(1, "a"), (2, "b"), (3, "c")]).await;
        s.add_database("db", Some(2), Some(r#"["-az=c"]"#)).await.unwrap();
        s.place_replicas().await.unwrap()
    };

    let s = Scheduler::new(StateStore::open(&path).unwrap());
    let replicas = s.replicas_for_database("db").unwrap();
    let reopened: BTreeMap<_, _> = replicas
        .iter()
        .map(|r| (r.id, r.current_node.unwrap()))
        .collect();
    assert_eq!(reopened, placed);
    assert_eq!(node_set(&s, "db"), BTreeSet::from([1, 2]));
}
