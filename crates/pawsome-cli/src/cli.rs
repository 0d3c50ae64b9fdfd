use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "pawsome")]
#[command(about = "Share and browse cat posts from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local cache database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new post
    #[command(alias = "new")]
    Post {
        /// Name of the cat
        #[arg(long)]
        cat_name: String,
        #[arg(long)]
        breed: Option<String>,
        /// Age in years
        #[arg(long)]
        age: Option<i64>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Photo to upload with the post
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
    },
    /// Show the feed, newest first
    #[command(alias = "list")]
    Feed {
        /// Number of posts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Like a post
    Like {
        /// Post ID
        id: String,
    },
    /// Comment on a post
    Comment {
        /// Post ID
        id: String,
        /// Comment text
        text: String,
    },
    /// List the comments on a post
    Comments {
        /// Post ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Keep printing new comments until interrupted
        #[arg(short, long)]
        follow: bool,
    },
    /// Moderate a post's descriptive fields
    Edit {
        /// Post ID
        id: String,
        #[arg(long)]
        cat_name: Option<String>,
        #[arg(long)]
        breed: Option<String>,
        #[arg(long)]
        age: Option<i64>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Override the like counter
        #[arg(long)]
        likes: Option<u64>,
        /// Clear an optional field (repeatable)
        #[arg(long, value_enum, value_name = "FIELD")]
        clear: Vec<ClearableField>,
    },
    /// Delete a post and its comments
    Delete {
        /// Post ID
        id: String,
    },
    /// Submit queued posts and refresh the local cache
    Sync,
}

/// Optional post fields a moderator can blank out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClearableField {
    Breed,
    Age,
    Location,
    Description,
}
