use std::path::Path;

use zoneplace_scheduler::Scheduler;

pub fn run(data_dir: &Path) -> anyhow::Result<()> {
    let state = super::open_store(Some(data_dir))?;
    let scheduler = Scheduler::new(state);
    print!("{}", scheduler.render_state()?);
    Ok(())
}
