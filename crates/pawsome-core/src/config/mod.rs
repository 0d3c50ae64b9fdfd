//! Environment-driven runtime configuration.
//!
//! Every client shell resolves the same variables: identity handed over by
//! the sign-in flow, the Firestore project, R2 media storage, and the local
//! cache location. Parsing goes through a lookup closure so tests never touch
//! the process environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{Author, MediaRef};
use crate::remote::{FirestoreConfig, DEFAULT_REMOTE_TIMEOUT};
use crate::storage::R2Config;
use crate::sync::SyncOptions;
use crate::util::{is_http_url, normalize_text_option, parse_flag};

pub const ENV_DB_PATH: &str = "PAWSOME_DB_PATH";
pub const ENV_USERNAME: &str = "PAWSOME_USERNAME";
pub const ENV_PROFILE_IMAGE_URL: &str = "PAWSOME_PROFILE_IMAGE_URL";
pub const ENV_FIRESTORE_PROJECT_ID: &str = "FIRESTORE_PROJECT_ID";
pub const ENV_FIRESTORE_ID_TOKEN: &str = "FIRESTORE_ID_TOKEN";
pub const ENV_FIRESTORE_BASE_URL: &str = "FIRESTORE_BASE_URL";
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "PAWSOME_REMOTE_TIMEOUT_SECS";
pub const ENV_QUEUE_OFFLINE: &str = "PAWSOME_QUEUE_OFFLINE";

/// Resolved configuration for one client process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PawsomeConfig {
    /// Local cache override; shells pick a platform default when unset
    pub db_path: Option<PathBuf>,
    /// Signed-in identity, if any
    pub author: Option<Author>,
    pub firestore: Option<FirestoreConfig>,
    pub r2: Option<R2Config>,
    pub queue_offline: bool,
}

impl PawsomeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| normalize_text_option(lookup(key));

        let author = match read(ENV_USERNAME) {
            Some(username) => {
                let author = Author::new(username);
                match read(ENV_PROFILE_IMAGE_URL) {
                    Some(url) if is_http_url(&url) => {
                        Some(author.with_profile_image(MediaRef::new(url)))
                    }
                    Some(_) => {
                        return Err(Error::InvalidConfig(format!(
                            "{ENV_PROFILE_IMAGE_URL} must start with http:// or https://"
                        )))
                    }
                    None => Some(author),
                }
            }
            None => None,
        };

        let timeout = match read(ENV_REMOTE_TIMEOUT_SECS) {
            Some(raw) => parse_timeout(&raw)?,
            None => DEFAULT_REMOTE_TIMEOUT,
        };

        let firestore = match read(ENV_FIRESTORE_PROJECT_ID) {
            Some(project_id) => {
                let mut config = FirestoreConfig::new(project_id)
                    .with_id_token(read(ENV_FIRESTORE_ID_TOKEN))
                    .with_timeout(timeout);
                if let Some(base_url) = read(ENV_FIRESTORE_BASE_URL) {
                    if !is_http_url(&base_url) {
                        return Err(Error::InvalidConfig(format!(
                            "{ENV_FIRESTORE_BASE_URL} must start with http:// or https://"
                        )));
                    }
                    config = config.with_base_url(base_url.trim_end_matches('/'));
                }
                Some(config)
            }
            None => None,
        };

        Ok(Self {
            db_path: read(ENV_DB_PATH).map(PathBuf::from),
            author,
            firestore,
            r2: crate::storage::parse_r2_config(&lookup)?,
            queue_offline: read(ENV_QUEUE_OFFLINE).is_some_and(|value| parse_flag(&value)),
        })
    }

    /// Identity for authoring operations.
    pub fn require_author(&self) -> Result<Author> {
        self.author.clone().ok_or_else(|| {
            Error::InvalidConfig(format!("{ENV_USERNAME} is required to post or comment"))
        })
    }

    #[must_use]
    pub const fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            queue_offline: self.queue_offline,
        }
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::InvalidConfig(format!(
            "{ENV_REMOTE_TIMEOUT_SECS} must be a positive number of seconds, got '{raw}'"
        ))),
    }
}
