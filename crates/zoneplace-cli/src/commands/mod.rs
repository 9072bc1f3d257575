pub mod place;
pub mod state;

use std::path::Path;

use tracing::info;
use zoneplace_state::StateStore;

/// File name of the store inside `--data-dir`.
pub const STORE_FILE: &str = "zoneplace.redb";

/// Open the on-disk store under `data_dir`, or an in-memory one.
pub fn open_store(data_dir: Option<&Path>) -> anyhow::Result<StateStore> {
    match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(STORE_FILE);
            let state = StateStore::open(&path)?;
            info!(path = ?path, "state store opened");
            Ok(state)
        }
        None => {
            info!("using in-memory state store");
            Ok(StateStore::open_in_memory()?)
        }
    }
}
