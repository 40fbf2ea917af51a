//! Local filesystem storage backend.
//!
//! Objects are stored as plain files under a configurable root directory.
//! The object key is used directly as a relative path (e.g.
//! "movies/clip.mp4").  Ranged reads seek to the first byte and cap the
//! reader at the span length, so only the requested bytes leave the disk.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::backend::{
    content_type_for_key, ByteStream, ListedObject, Listing, ObjectMetadata, StorageBackend,
    StoreError, StoreFuture,
};
use crate::range::ByteRange;

/// Serves objects from the local filesystem.
pub struct LocalBackend {
    /// Root directory for all stored objects.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve a key to a path under the root.
    ///
    /// Keys containing `..`, absolute components or drive prefixes are
    /// refused so a request can never escape the root directory.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        for component in Path::new(key).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(StoreError::Unavailable(anyhow::anyhow!(
                        "Path traversal detected in key: {key}"
                    )))
                }
            }
        }
        Ok(self.root.join(key))
    }
}

/// Map an I/O error for `key` into a store error.
fn map_io_error(key: &str, err: std::io::Error) -> StoreError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound {
            key: key.to_string(),
        }
    } else {
        StoreError::Unavailable(anyhow::anyhow!("local read {key}: {err}"))
    }
}

impl StorageBackend for LocalBackend {
    fn head(&self, key: &str) -> StoreFuture<'_, ObjectMetadata> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|e| map_io_error(&key, e))?;
            if !meta.is_file() {
                return Err(StoreError::NotFound { key });
            }
            Ok(ObjectMetadata {
                total_length: meta.len(),
                content_type: content_type_for_key(&key).to_string(),
            })
        })
    }

    fn get(&self, key: &str, range: Option<ByteRange>) -> StoreFuture<'_, ByteStream> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            let mut file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| map_io_error(&key, e))?;

            let stream: ByteStream = match range {
                Some(range) => {
                    file.seek(SeekFrom::Start(range.start()))
                        .await
                        .map_err(|e| map_io_error(&key, e))?;
                    Box::pin(ReaderStream::new(file.take(range.len())))
                }
                None => Box::pin(ReaderStream::new(file)),
            };
            Ok(stream)
        })
    }

    fn list(&self, prefix: &str) -> StoreFuture<'_, Listing> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            // "movies/ex" lists directory "movies/" filtered by names starting with "ex".
            let (dir, filter) = match prefix.rfind('/') {
                Some(idx) => prefix.split_at(idx + 1),
                None => ("", prefix.as_str()),
            };
            let path = self.resolve(dir)?;

            let mut listing = Listing::default();
            let mut entries = match tokio::fs::read_dir(&path).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
                Err(e) => return Err(map_io_error(&prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| map_io_error(&prefix, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') || !name.starts_with(filter) {
                    continue;
                }
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| map_io_error(&prefix, e))?;
                if file_type.is_dir() {
                    listing.folders.push(format!("{dir}{name}/"));
                } else if file_type.is_file() {
                    let size = entry
                        .metadata()
                        .await
                        .map_err(|e| map_io_error(&prefix, e))?
                        .len();
                    listing.files.push(ListedObject {
                        key: format!("{dir}{name}"),
                        size,
                    });
                }
            }

            listing.folders.sort();
            listing.files.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(listing)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::TryStreamExt;

    fn backend_with_files(files: &[(&str, &[u8])]) -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        for (key, data) in files {
            let path = dir.path().join(key);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, data).unwrap();
        }
        let backend = LocalBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_head_file() {
        let (_dir, backend) = backend_with_files(&[("movies/a.webm", &[7u8; 1000][..])]);
        let meta = backend.head("movies/a.webm").await.unwrap();
        assert_eq!(meta.total_length, 1000);
        assert_eq!(meta.content_type, "video/webm");
    }

    #[tokio::test]
    async fn test_head_missing_and_directory() {
        let (_dir, backend) = backend_with_files(&[("movies/a.webm", b"x".as_slice())]);
        assert!(matches!(
            backend.head("movies/b.webm").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            backend.head("movies").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_traversal_is_refused() {
        let (_dir, backend) = backend_with_files(&[("a.txt", b"x".as_slice())]);
        assert!(matches!(
            backend.head("../etc/passwd").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            backend.get("/etc/passwd", None).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_get_full_and_ranged() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        let (_dir, backend) = backend_with_files(&[("clip.bin", &data[..])]);

        let full = collect(backend.get("clip.bin", None).await.unwrap()).await;
        assert_eq!(full, data);

        let range = crate::range::parse_range("bytes=4000-4099", 5000).unwrap();
        let part = collect(backend.get("clip.bin", Some(range)).await.unwrap()).await;
        assert_eq!(part, &data[4000..4100]);

        let tail = crate::range::parse_range("bytes=4990-", 5000).unwrap();
        let part = collect(backend.get("clip.bin", Some(tail)).await.unwrap()).await;
        assert_eq!(part, &data[4990..]);
    }

    #[tokio::test]
    async fn test_list_directory() {
        let (_dir, backend) = backend_with_files(&[
            ("movies/a.mp4", b"aa".as_slice()),
            ("movies/extras/b.mp4", b"b".as_slice()),
            ("music/c.mp3", b"c".as_slice()),
            ("readme.txt", b"hello".as_slice()),
        ]);

        let root = backend.list("").await.unwrap();
        assert_eq!(root.folders, vec!["movies/", "music/"]);
        assert_eq!(
            root.files,
            vec![ListedObject {
                key: "readme.txt".to_string(),
                size: 5
            }]
        );

        let movies = backend.list("movies/").await.unwrap();
        assert_eq!(movies.folders, vec!["movies/extras/"]);
        assert_eq!(movies.files.len(), 1);
        assert_eq!(movies.files[0].key, "movies/a.mp4");

        let partial = backend.list("mo").await.unwrap();
        assert_eq!(partial.folders, vec!["movies/"]);
        assert!(partial.files.is_empty());

        let missing = backend.list("nothing/here/").await.unwrap();
        assert_eq!(missing, Listing::default());
    }
}
