//! In-memory uploader for tests and offline demos.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{ensure_payload, MediaUploader};
use crate::error::{Error, Result};
use crate::models::MediaRef;

const MEMORY_SCHEME: &str = "memory://";

#[derive(Default)]
struct State {
    blobs: HashMap<MediaRef, Vec<u8>>,
    fail_uploads: bool,
    delay: Duration,
    ack_delay: Duration,
    upload_calls: usize,
}

/// Keeps uploaded blobs in a shared map. Clones share the same blobs.
#[derive(Clone, Default)]
pub struct InMemoryMediaUploader {
    state: Arc<Mutex<State>>,
}

impl InMemoryMediaUploader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Upload("in-memory uploader lock poisoned".to_string()))
    }

    /// Make every upload fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_uploads = failing;
        }
    }

    /// Delay each upload, to widen cancellation and concurrency windows.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut state) = self.lock() {
            state.delay = delay;
        }
    }

    /// Delay each acknowledgement after the blob is already stored, like a
    /// PUT that landed but whose response has not arrived yet.
    pub fn set_ack_delay(&self, delay: Duration) {
        if let Ok(mut state) = self.lock() {
            state.ack_delay = delay;
        }
    }

    #[must_use]
    pub fn contains(&self, media: &MediaRef) -> bool {
        self.lock()
            .is_ok_and(|state| state.blobs.contains_key(media))
    }

    #[must_use]
    pub fn bytes(&self, media: &MediaRef) -> Option<Vec<u8>> {
        self.lock().ok()?.blobs.get(media).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |state| state.blobs.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upload attempts, failed ones included.
    #[must_use]
    pub fn upload_calls(&self) -> usize {
        self.lock().map_or(0, |state| state.upload_calls)
    }
}

impl MediaUploader for InMemoryMediaUploader {
    async fn upload(
        &self,
        object_key: &str,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<MediaRef> {
        ensure_payload(bytes)?;
        let delay = {
            let mut state = self.lock()?;
            state.upload_calls += 1;
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let media = self.media_ref(object_key);
        let ack_delay = {
            let mut state = self.lock()?;
            if state.fail_uploads {
                return Err(Error::Upload(format!(
                    "simulated transport failure for {suggested_name}"
                )));
            }
            state.blobs.insert(media.clone(), bytes.to_vec());
            state.ack_delay
        };
        if !ack_delay.is_zero() {
            tokio::time::sleep(ack_delay).await;
        }
        Ok(media)
    }

    fn media_ref(&self, object_key: &str) -> MediaRef {
        MediaRef::new(format!("{MEMORY_SCHEME}{object_key}"))
    }

    async fn delete(&self, media: &MediaRef) {
        match self.lock() {
            Ok(mut state) => {
                state.blobs.remove(media);
            }
            Err(error) => tracing::warn!("Failed to delete {}: {}", media, error),
        }
    }
}
