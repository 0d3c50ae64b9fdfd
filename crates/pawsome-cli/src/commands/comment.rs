use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use pawsome_core::PawsomeConfig;

use crate::commands::common::{
    comment_to_list_item, format_comment_line, normalize_post_id, open_coordinator,
    CommentListItem,
};
use crate::error::CliError;

pub async fn run_comment(
    id: &str,
    text: &str,
    config: &PawsomeConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let post_id = normalize_post_id(id)?;
    let author = config.require_author()?;
    let coordinator = open_coordinator(config, db_path)?;
    let comment = coordinator.add_comment(&post_id, &author, text).await?;
    println!("{}", comment.id);
    Ok(())
}

pub async fn run_comments(
    id: &str,
    as_json: bool,
    follow: bool,
    config: &PawsomeConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let post_id = normalize_post_id(id)?;
    let coordinator = open_coordinator(config, db_path)?;
    // Subscribe before reading so nothing posted in between is missed
    let mut subscription = follow.then(|| coordinator.subscribe_comments(&post_id));

    let post = coordinator
        .get_post(&post_id)
        .await?
        .ok_or_else(|| CliError::PostNotFound(post_id.to_string()))?;

    if as_json {
        let json_items = post
            .comments
            .iter()
            .map(comment_to_list_item)
            .collect::<Vec<CommentListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        let now_ms = Utc::now().timestamp_millis();
        for comment in &post.comments {
            println!("{}", format_comment_line(comment, now_ms));
        }
    }

    let Some(subscription) = subscription.as_mut() else {
        return Ok(());
    };
    let mut seen = post
        .comments
        .iter()
        .map(|comment| comment.id.clone())
        .collect::<HashSet<_>>();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = subscription.next() => {
                let Some(comment) = next else { break };
                if !seen.insert(comment.id.clone()) {
                    continue;
                }
                if as_json {
                    println!("{}", serde_json::to_string(&comment_to_list_item(&comment))?);
                } else {
                    println!("{}", format_comment_line(&comment, Utc::now().timestamp_millis()));
                }
            }
        }
    }
    Ok(())
}
