//! Pawsome CLI - share and browse cat posts from the terminal
//!
//! A thin shell over `pawsome-core`: every command builds a sync
//! coordinator from the environment and prints what it returns.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::comment::{run_comment, run_comments};
use crate::commands::common::{load_config, resolve_db_path};
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::feed::run_feed;
use crate::commands::like::run_like;
use crate::commands::post::{run_post, PostArgs};
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "pawsome=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config()?;
    let db_path = resolve_db_path(cli.db_path, &config)?;

    match cli.command {
        Commands::Post {
            cat_name,
            breed,
            age,
            location,
            description,
            image,
        } => {
            let args = PostArgs {
                cat_name,
                breed,
                age,
                location,
                description,
                image,
            };
            run_post(&args, &config, &db_path).await?;
        }
        Commands::Feed { limit, json } => run_feed(limit, json, &config, &db_path).await?,
        Commands::Like { id } => run_like(&id, &config, &db_path).await?,
        Commands::Comment { id, text } => run_comment(&id, &text, &config, &db_path).await?,
        Commands::Comments { id, json, follow } => {
            run_comments(&id, json, follow, &config, &db_path).await?;
        }
        Commands::Edit {
            id,
            cat_name,
            breed,
            age,
            location,
            description,
            likes,
            clear,
        } => {
            let args = EditArgs {
                cat_name,
                breed,
                age,
                location,
                description,
                likes,
                clear,
            };
            run_edit(&id, &args, &config, &db_path).await?;
        }
        Commands::Delete { id } => run_delete(&id, &config, &db_path).await?,
        Commands::Sync => run_sync(&config, &db_path).await?,
    }

    Ok(())
}
