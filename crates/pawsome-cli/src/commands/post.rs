use std::path::{Path, PathBuf};

use pawsome_core::{Error, ImageAttachment, PawsomeConfig, PostDraft};

use crate::commands::common::open_coordinator;
use crate::error::CliError;

#[derive(Debug, Default)]
pub struct PostArgs {
    pub cat_name: String,
    pub breed: Option<String>,
    pub age: Option<i64>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub image: Option<PathBuf>,
}

pub fn build_draft(args: &PostArgs) -> PostDraft {
    let mut draft = PostDraft::new(args.cat_name.as_str());
    draft.cat_breed.clone_from(&args.breed);
    draft.cat_age = args.age;
    draft.location.clone_from(&args.location);
    draft.post_description.clone_from(&args.description);
    draft
}

pub fn read_image(path: &Path) -> Result<ImageAttachment, CliError> {
    let bytes = std::fs::read(path)?;
    let suggested_name = path
        .file_name()
        .map_or_else(|| "image".to_string(), |name| name.to_string_lossy().into_owned());
    Ok(ImageAttachment::new(bytes, suggested_name))
}

pub async fn run_post(
    args: &PostArgs,
    config: &PawsomeConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let author = config.require_author()?;
    let draft = build_draft(args);
    let image = args.image.as_deref().map(read_image).transpose()?;

    let coordinator = open_coordinator(config, db_path)?;
    let outcome = coordinator
        .create_post(&draft, &author, image.as_ref())
        .await;

    if let Some(queued_id) = &outcome.queued_id {
        eprintln!("Offline; post queued locally. Run `pawsome sync` to submit it.");
        println!("{queued_id}");
        return Ok(());
    }

    let record = outcome.into_result()?;
    let id = record
        .id
        .ok_or_else(|| Error::RemoteRejected("committed post has no id".to_string()))?;
    println!("{id}");
    Ok(())
}
