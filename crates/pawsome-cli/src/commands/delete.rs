use std::path::Path;

use pawsome_core::PawsomeConfig;

use crate::commands::common::{normalize_post_id, open_coordinator};
use crate::error::CliError;

pub async fn run_delete(id: &str, config: &PawsomeConfig, db_path: &Path) -> Result<(), CliError> {
    let post_id = normalize_post_id(id)?;
    let coordinator = open_coordinator(config, db_path)?;
    coordinator.delete_post(&post_id).await?;
    println!("{post_id}");
    Ok(())
}
