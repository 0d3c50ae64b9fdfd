use std::path::Path;

use pawsome_core::PawsomeConfig;

use crate::commands::common::open_coordinator;
use crate::error::CliError;

pub async fn run_sync(config: &PawsomeConfig, db_path: &Path) -> Result<(), CliError> {
    let coordinator = open_coordinator(config, db_path)?;
    let snapshot = coordinator.fetch_all().await?;
    let report = snapshot.report;

    if snapshot.stale {
        println!(
            "Remote store unreachable; {} post(s) still pending",
            report.still_pending
        );
        return Ok(());
    }

    println!(
        "Sync completed: {} submitted, {} failed, {} pending, {} cached",
        report.synced,
        report.failed,
        report.still_pending,
        snapshot.len()
    );
    Ok(())
}
