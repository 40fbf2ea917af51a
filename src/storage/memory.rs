//! In-memory storage backend.
//!
//! Objects are held in a `tokio::sync::RwLock<BTreeMap<...>>` keyed by
//! object key.  Nothing is persisted; the backend exists for demos and
//! tests.  Reads are served in fixed-size chunks so the relay path behaves
//! the same way it does against a real store.

use bytes::Bytes;
use std::collections::BTreeMap;

use super::backend::{
    content_type_for_key, ByteStream, ListedObject, Listing, ObjectMetadata, StorageBackend,
    StoreError, StoreFuture,
};
use crate::range::ByteRange;

/// Size of each chunk yielded by [`MemoryBackend::get`].
const CHUNK_SIZE: usize = 64 * 1024;

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryBackend {
    /// key -> (data, content type).
    objects: tokio::sync::RwLock<BTreeMap<String, (Bytes, String)>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `key`.  The content type is guessed from the key
    /// when not given.
    pub async fn insert(&self, key: &str, data: impl Into<Bytes>, content_type: Option<&str>) {
        let content_type = content_type
            .unwrap_or_else(|| content_type_for_key(key))
            .to_string();
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data.into(), content_type));
    }
}

/// Split `data` into a stream of chunks.
fn chunked(data: Bytes) -> ByteStream {
    let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
        .step_by(CHUNK_SIZE)
        .map(|offset| Ok(data.slice(offset..(offset + CHUNK_SIZE).min(data.len()))))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// Group `(key, size)` pairs into the immediate children of `prefix`.
pub(crate) fn listing_from_keys<'a>(
    prefix: &str,
    entries: impl Iterator<Item = (&'a str, u64)>,
) -> Listing {
    let mut listing = Listing::default();
    for (key, size) in entries {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        match rest.find('/') {
            Some(idx) => {
                let folder = format!("{prefix}{}", &rest[..=idx]);
                if !listing.folders.contains(&folder) {
                    listing.folders.push(folder);
                }
            }
            None => listing.files.push(ListedObject {
                key: key.to_string(),
                size,
            }),
        }
    }
    listing
}

impl StorageBackend for MemoryBackend {
    fn head(&self, key: &str) -> StoreFuture<'_, ObjectMetadata> {
        let key = key.to_string();
        Box::pin(async move {
            let objects = self.objects.read().await;
            let (data, content_type) = objects
                .get(&key)
                .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
            Ok(ObjectMetadata {
                total_length: data.len() as u64,
                content_type: content_type.clone(),
            })
        })
    }

    fn get(&self, key: &str, range: Option<ByteRange>) -> StoreFuture<'_, ByteStream> {
        let key = key.to_string();
        Box::pin(async move {
            let data = {
                let objects = self.objects.read().await;
                let (data, _) = objects
                    .get(&key)
                    .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
                data.clone()
            };
            let data = match range {
                Some(range) => {
                    let start = range.start() as usize;
                    let end = range.end() as usize;
                    if end >= data.len() {
                        return Err(StoreError::Unavailable(anyhow::anyhow!(
                            "range {range} past end of {key} ({} bytes)",
                            data.len()
                        )));
                    }
                    data.slice(start..=end)
                }
                None => data,
            };
            Ok(chunked(data))
        })
    }

    fn list(&self, prefix: &str) -> StoreFuture<'_, Listing> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let objects = self.objects.read().await;
            let entries = objects
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, (data, _))| (k.as_str(), data.len() as u64));
            Ok(listing_from_keys(&prefix, entries))
        })
    }
}
