use std::path::Path;

use tracing::{debug, info};
use zoneplace_core::FleetConfig;
use zoneplace_scheduler::Scheduler;

pub async fn run(config_path: &Path, data_dir: Option<&Path>, format: &str) -> anyhow::Result<()> {
    let config = FleetConfig::from_file(config_path)?;
    let state = super::open_store(data_dir)?;
    let scheduler = Scheduler::from_config(state, &config.solver, &config.placement)?;

    apply_fleet(&scheduler, &config).await?;
    let assignment = if config.bootstrap {
        scheduler.bootstrap().await?
    } else {
        scheduler.place_replicas().await?
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&assignment)?);
        }
        _ => {
            for (replica, node) in &assignment {
                println!("replica {replica:>4} -> node {node}");
            }
            println!("✓ placed {} replicas", assignment.len());
        }
    }
    Ok(())
}

/// Register the fleet file's nodes and databases, skipping ones already stored.
pub async fn apply_fleet(scheduler: &Scheduler, config: &FleetConfig) -> anyhow::Result<()> {
    for node in &config.nodes {
        if scheduler.state().get_node(node.id)?.is_some() {
            debug!(node = node.id, "node already registered, skipping");
            continue;
        }
        let locality: Vec<&str> = node.locality.iter().map(String::as_str).collect();
        let capabilities: Vec<&str> = node.capabilities.iter().map(String::as_str).collect();
        let stores: Vec<&str> = node.stores.iter().map(String::as_str).collect();
        scheduler
            .add_node(node.id, &locality, &capabilities, &stores)
            .await?;
    }

    for db in &config.databases {
        if scheduler.state().get_database(&db.name)?.is_some() {
            debug!(database = %db.name, "database already exists, skipping");
            continue;
        }
        scheduler
            .add_database(&db.name, db.num_replicas, db.constraints.as_deref())
            .await?;
    }

    info!(
        nodes = config.nodes.len(),
        databases = config.databases.len(),
        "fleet file applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zoneplace_state::StateStore;

    const FLEET: &str = r#"
[[nodes]]
id = 1
locality = ["az=a"]
stores = ["ssd"]

[[nodes]]
id = 2
locality = ["az=b"]
stores = ["ssd"]

[[nodes]]
id = 3
locality = ["az=c"]

[[databases]]
name = "db1"
num_replicas = 2
constraints = '["+ssd"]'
"#;

    #[tokio::test]
    async fn applying_twice_skips_existing_records() {
        let config = FleetConfig::parse(FLEET).unwrap();
        let scheduler = Scheduler::new(StateStore::open_in_memory().unwrap());

        apply_fleet(&scheduler, &config).await.unwrap();
        apply_fleet(&scheduler, &config).await.unwrap();

        assert_eq!(scheduler.state().list_nodes().unwrap().len(), 3);
        assert_eq!(scheduler.replica_state().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn applied_fleet_places_on_matching_nodes() {
        let config = FleetConfig::parse(FLEET).unwrap();
        let scheduler = Scheduler::new(StateStore::open_in_memory().unwrap());
        apply_fleet(&scheduler, &config).await.unwrap();

        let assignment = scheduler.place_replicas().await.unwrap();
        let mut nodes: Vec<_> = assignment.values().copied().collect();
        nodes.sort_unstable();
        assert_eq!(nodes, vec![1, 2]);
    }

    #[tokio::test]
    async fn run_persists_into_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("fleet.toml");
        std::fs::write(&config_path, FLEET).unwrap();
        let data_dir = dir.path().join("data");

        run(&config_path, Some(&data_dir), "json").await.unwrap();

        let state = StateStore::open(&data_dir.join(super::super::STORE_FILE)).unwrap();
        assert!(state.list_replicas().unwrap().iter().all(|r| r.is_running()));
    }
}
