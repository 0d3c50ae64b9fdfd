//! Cloudflare R2 media uploader.

use std::env;
use std::fmt;

use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use super::{content_type_for, ensure_payload, MediaUploader};
use crate::error::{Error, Result};
use crate::models::MediaRef;
use crate::util::is_http_url;

pub(crate) const ENV_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
pub(crate) const ENV_BUCKET: &str = "R2_BUCKET";
pub(crate) const ENV_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
pub(crate) const ENV_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";
pub(crate) const ENV_PUBLIC_BASE_URL: &str = "R2_PUBLIC_BASE_URL";

/// Cloudflare R2 configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct R2Config {
    /// Cloudflare account identifier.
    pub account_id: String,
    /// R2 bucket name.
    pub bucket: String,
    /// Access key id for S3-compatible auth.
    pub access_key_id: String,
    /// Secret access key for S3-compatible auth.
    pub secret_access_key: String,
    /// Public URL base that uploaded objects are served from.
    pub public_base_url: String,
}

impl R2Config {
    /// Load R2 configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no R2 variables are set and an error when
    /// only some of them are.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// Cloudflare R2 S3-compatible endpoint URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

impl fmt::Debug for R2Config {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("R2Config")
            .field("account_id", &self.account_id)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

/// [`MediaUploader`] writing to an R2 bucket.
#[derive(Clone, Debug)]
pub struct R2MediaUploader {
    config: R2Config,
    client: Client,
}

impl R2MediaUploader {
    #[must_use]
    pub fn new(config: R2Config) -> Self {
        let client = build_s3_client(&config);
        Self { config, client }
    }

    #[must_use]
    pub const fn config(&self) -> &R2Config {
        &self.config
    }

    /// Check that the configured bucket is reachable with current credentials.
    pub async fn bucket_is_reachable(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|error| storage_error("head_bucket", &self.config.bucket, None, error))?;
        Ok(())
    }

    /// Public URL for an object key.
    #[must_use]
    pub fn public_object_url(&self, object_key: &str) -> String {
        format!(
            "{}/{}",
            self.config.public_base_url,
            object_key.trim_matches('/')
        )
    }

    /// Object key behind a reference this uploader produced.
    fn object_key_for(&self, media: &MediaRef) -> Option<String> {
        let key = media
            .as_str()
            .strip_prefix(&self.config.public_base_url)?
            .trim_matches('/');
        (!key.is_empty()).then(|| key.to_string())
    }
}

impl MediaUploader for R2MediaUploader {
    async fn upload(
        &self,
        object_key: &str,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<MediaRef> {
        ensure_payload(bytes)?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(object_key)
            .body(ByteStream::from(bytes.to_vec()));
        if let Some(content_type) = content_type_for(suggested_name) {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|error| {
            storage_error("put_object", &self.config.bucket, Some(object_key), error)
        })?;

        tracing::debug!("Uploaded {} bytes to {}", bytes.len(), object_key);
        Ok(self.media_ref(object_key))
    }

    fn media_ref(&self, object_key: &str) -> MediaRef {
        MediaRef::new(self.public_object_url(object_key))
    }

    async fn delete(&self, media: &MediaRef) {
        let Some(object_key) = self.object_key_for(media) else {
            tracing::warn!("Not deleting {}: not served from this bucket", media);
            return;
        };

        if let Err(error) = self
            .client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .send()
            .await
        {
            tracing::warn!(
                "{}",
                storage_error(
                    "delete_object",
                    &self.config.bucket,
                    Some(&object_key),
                    error
                )
            );
        }
    }
}

pub(crate) fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<R2Config>> {
    let read = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let fields = [
        ENV_ACCOUNT_ID,
        ENV_BUCKET,
        ENV_ACCESS_KEY_ID,
        ENV_SECRET_ACCESS_KEY,
        ENV_PUBLIC_BASE_URL,
    ]
    .map(|key| (key, read(key)));

    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(key, _)| *key)
        .collect();
    if missing.len() == fields.len() {
        return Ok(None);
    }
    if !missing.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "R2 configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let [account_id, bucket, access_key_id, secret_access_key, public_base_url] =
        fields.map(|(_, value)| value.unwrap_or_default());

    if !is_http_url(&public_base_url) {
        return Err(Error::InvalidConfig(format!(
            "{ENV_PUBLIC_BASE_URL} must start with http:// or https://"
        )));
    }

    Ok(Some(R2Config {
        account_id,
        bucket,
        access_key_id,
        secret_access_key,
        public_base_url: public_base_url.trim_end_matches('/').to_string(),
    }))
}

fn build_s3_client(config: &R2Config) -> Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        "pawsome-core-r2-media",
    );

    let sdk_config = aws_sdk_s3::config::Builder::new()
        .region(Region::new("auto"))
        .credentials_provider(credentials)
        .endpoint_url(config.endpoint_url())
        .force_path_style(true)
        .build();

    Client::from_conf(sdk_config)
}

fn storage_error(
    operation: &str,
    bucket: &str,
    object_key: Option<&str>,
    error: impl fmt::Display,
) -> Error {
    let target = object_key.map_or_else(|| bucket.to_string(), |key| format!("{bucket}/{key}"));
    Error::Upload(format!("R2 {operation} failed for {target}: {error}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::DraftId;
    use crate::storage::build_media_key;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<Option<R2Config>> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    fn full_map() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (ENV_ACCOUNT_ID, "account-1"),
            (ENV_BUCKET, "bucket-a"),
            (ENV_ACCESS_KEY_ID, "AKID123"),
            (ENV_SECRET_ACCESS_KEY, "SECRET123"),
            (ENV_PUBLIC_BASE_URL, "https://cdn.example.com/media/"),
        ])
    }

    #[test]
    fn parse_config_none_returns_none() {
        assert!(parse_from_map(&HashMap::new()).unwrap().is_none());
    }

    #[test]
    fn parse_config_lists_missing_values() {
        let map = HashMap::from([(ENV_ACCOUNT_ID, "account"), (ENV_BUCKET, "bucket")]);

        match parse_from_map(&map).unwrap_err() {
            Error::InvalidConfig(message) => {
                assert!(message.contains(ENV_ACCESS_KEY_ID));
                assert!(message.contains(ENV_SECRET_ACCESS_KEY));
                assert!(message.contains(ENV_PUBLIC_BASE_URL));
                assert!(!message.contains(ENV_BUCKET));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_config_normalizes_public_url() {
        let config = parse_from_map(&full_map()).unwrap().unwrap();
        assert_eq!(config.public_base_url, "https://cdn.example.com/media");
        assert_eq!(
            config.endpoint_url(),
            "https://account-1.r2.cloudflarestorage.com"
        );
    }

    #[test]
    fn parse_config_rejects_invalid_public_base_url() {
        let mut map = full_map();
        map.insert(ENV_PUBLIC_BASE_URL, "cdn.example.com/media");

        match parse_from_map(&map).unwrap_err() {
            Error::InvalidConfig(message) => assert!(message.contains(ENV_PUBLIC_BASE_URL)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn debug_redacts_secret() {
        let config = parse_from_map(&full_map()).unwrap().unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("SECRET123"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn object_key_round_trips_through_public_url() {
        let uploader = R2MediaUploader::new(parse_from_map(&full_map()).unwrap().unwrap());
        let url = uploader.public_object_url("/posts/d/file.png");
        assert_eq!(url, "https://cdn.example.com/media/posts/d/file.png");
        assert_eq!(
            uploader.object_key_for(&MediaRef::new(url)).as_deref(),
            Some("posts/d/file.png")
        );
        assert_eq!(
            uploader.object_key_for(&MediaRef::new("https://elsewhere.example/x.png")),
            None
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_rejects_empty_bytes() {
        let uploader = R2MediaUploader::new(parse_from_map(&full_map()).unwrap().unwrap());
        let error = uploader
            .upload(&build_media_key(&DraftId::new(), "cat.png"), &[], "cat.png")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "Requires local R2 env vars plus network access"]
    async fn r2_upload_and_delete_roundtrip() {
        let _ = dotenvy::dotenv();

        let config = R2Config::from_env()
            .expect("R2 env parsing should not error")
            .expect("R2 config should be present");
        let uploader = R2MediaUploader::new(config.clone());

        uploader.bucket_is_reachable().await.unwrap_or_else(|error| {
            panic!(
                "R2 bucket health check failed for bucket '{}': {error}",
                config.bucket
            )
        });

        let media = uploader
            .upload(
                &build_media_key(&DraftId::new(), "roundtrip.png"),
                b"pawsome-r2-roundtrip",
                "roundtrip.png",
            )
            .await
            .unwrap_or_else(|error| panic!("R2 upload failed: {error}"));
        assert!(media.as_str().starts_with(&config.public_base_url));

        uploader.delete(&media).await;
    }
}
