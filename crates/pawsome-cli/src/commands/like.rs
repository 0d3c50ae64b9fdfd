use std::path::Path;

use pawsome_core::PawsomeConfig;

use crate::commands::common::{normalize_post_id, open_coordinator};
use crate::error::CliError;

pub async fn run_like(id: &str, config: &PawsomeConfig, db_path: &Path) -> Result<(), CliError> {
    let post_id = normalize_post_id(id)?;
    let coordinator = open_coordinator(config, db_path)?;
    let likes = coordinator.increment_likes(&post_id).await?;
    println!("{likes}");
    Ok(())
}
