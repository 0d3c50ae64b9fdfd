use std::path::Path;

use pawsome_core::PawsomeConfig;

use crate::commands::common::{
    format_post_lines, open_coordinator, post_to_list_item, PostListItem,
};
use crate::error::CliError;

pub async fn run_feed(
    limit: usize,
    as_json: bool,
    config: &PawsomeConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let coordinator = open_coordinator(config, db_path)?;
    let snapshot = coordinator.fetch_all().await?;
    let posts = snapshot.posts.iter().take(limit).cloned().collect::<Vec<_>>();

    if snapshot.stale {
        eprintln!("Remote store unreachable; showing cached posts.");
    }

    if as_json {
        let json_items = posts
            .iter()
            .map(post_to_list_item)
            .collect::<Vec<PostListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if posts.is_empty() {
        println!("No posts yet.");
    } else {
        for line in format_post_lines(&posts) {
            println!("{line}");
        }
    }

    Ok(())
}
