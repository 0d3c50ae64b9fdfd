use std::path::Path;

use pawsome_core::{PawsomeConfig, PostEdit};

use crate::cli::ClearableField;
use crate::commands::common::{describe_cat, normalize_post_id, open_coordinator};
use crate::error::CliError;

#[derive(Debug, Default)]
pub struct EditArgs {
    pub cat_name: Option<String>,
    pub breed: Option<String>,
    pub age: Option<i64>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub likes: Option<u64>,
    pub clear: Vec<ClearableField>,
}

/// Merge `--field value` and `--clear field` flags into one edit.
pub fn build_edit(args: &EditArgs) -> Result<PostEdit, CliError> {
    let clears = |field| args.clear.contains(&field);

    let edit = PostEdit {
        cat_name: args.cat_name.clone(),
        cat_breed: merge_field("breed", args.breed.clone(), clears(ClearableField::Breed))?,
        cat_age: merge_field("age", args.age, clears(ClearableField::Age))?,
        location: merge_field(
            "location",
            args.location.clone(),
            clears(ClearableField::Location),
        )?,
        post_description: merge_field(
            "description",
            args.description.clone(),
            clears(ClearableField::Description),
        )?,
        likes: args.likes,
    };

    if edit.is_empty() {
        return Err(CliError::EmptyEdit);
    }
    Ok(edit)
}

fn merge_field<T>(
    name: &'static str,
    value: Option<T>,
    clear: bool,
) -> Result<Option<Option<T>>, CliError> {
    match (value, clear) {
        (Some(_), true) => Err(CliError::ConflictingEdit(name)),
        (Some(value), false) => Ok(Some(Some(value))),
        (None, true) => Ok(Some(None)),
        (None, false) => Ok(None),
    }
}

pub async fn run_edit(
    id: &str,
    args: &EditArgs,
    config: &PawsomeConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let post_id = normalize_post_id(id)?;
    let edit = build_edit(args)?;
    let coordinator = open_coordinator(config, db_path)?;
    let post = coordinator.edit_post(&post_id, &edit).await?;
    println!("{post_id}  {}  {} likes", describe_cat(&post), post.likes);
    Ok(())
}
