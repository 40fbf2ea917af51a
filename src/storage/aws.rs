//! AWS S3 storage backend.
//!
//! Reads objects from a single S3 bucket (or any S3-compatible endpoint
//! such as MinIO), optionally scoped under a key prefix.
//!
//! Key mapping:
//!   Objects:  `{prefix}{key}`
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit keys
//! are configured.

use aws_sdk_s3::Client;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::backend::{
    ByteStream, ListedObject, Listing, ObjectMetadata, StorageBackend, StoreError, StoreFuture,
    DEFAULT_CONTENT_TYPE,
};
use crate::config::AwsStorageConfig;
use crate::range::ByteRange;

/// Backend that reads objects from AWS S3.
pub struct AwsBackend {
    /// AWS S3 SDK client.
    client: Client,
    /// The S3 bucket name.
    bucket: String,
    /// Key prefix for all objects in the bucket.
    prefix: String,
}

impl AwsBackend {
    /// Create a new AWS backend from its config section.
    ///
    /// Loads AWS credentials from the default credential chain unless
    /// `access_key_id` and `secret_access_key` are both set.
    pub async fn new(config: &AwsStorageConfig) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&config.endpoint_url);
        }

        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "blobgate-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "AWS backend initialized: bucket={} prefix='{}'",
            config.bucket, config.prefix
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        })
    }

    /// Map an object key to an upstream S3 key.
    fn s3_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Map an upstream S3 key back to an object key.
    fn object_key<'a>(&self, s3_key: &'a str) -> &'a str {
        s3_key.strip_prefix(self.prefix.as_str()).unwrap_or(s3_key)
    }

    /// Map an AWS SDK error to a store error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> StoreError {
        StoreError::Unavailable(anyhow::anyhow!("AWS S3 {context}: {err}"))
    }
}

impl StorageBackend for AwsBackend {
    fn head(&self, key: &str) -> StoreFuture<'_, ObjectMetadata> {
        let key = key.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&key);

            debug!("AWS head_object: bucket={} key={}", self.bucket, s3_key);

            let resp = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_not_found() {
                        StoreError::NotFound { key: key.clone() }
                    } else {
                        Self::map_sdk_error("head_object", service_err)
                    }
                })?;

            let total_length = resp
                .content_length()
                .and_then(|len| u64::try_from(len).ok())
                .ok_or_else(|| Self::map_sdk_error("head_object", "missing Content-Length"))?;

            Ok(ObjectMetadata {
                total_length,
                content_type: resp
                    .content_type()
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string(),
            })
        })
    }

    fn get(&self, key: &str, range: Option<ByteRange>) -> StoreFuture<'_, ByteStream> {
        let key = key.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&key);

            debug!(
                "AWS get_object: bucket={} key={} range={:?}",
                self.bucket,
                s3_key,
                range.map(|r| r.to_string())
            );

            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .set_range(range.map(|r| r.to_string()))
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_no_such_key() {
                        StoreError::NotFound { key: key.clone() }
                    } else {
                        Self::map_sdk_error("get_object", service_err)
                    }
                })?;

            Ok(Box::pin(ReaderStream::new(resp.body.into_async_read())) as ByteStream)
        })
    }

    fn list(&self, prefix: &str) -> StoreFuture<'_, Listing> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let s3_prefix = self.s3_key(&prefix);
            let mut listing = Listing::default();
            let mut continuation_token: Option<String> = None;

            loop {
                debug!(
                    "AWS list_objects_v2: bucket={} prefix={}",
                    self.bucket, s3_prefix
                );

                let resp = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&s3_prefix)
                    .delimiter("/")
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await
                    .map_err(|e| Self::map_sdk_error("list_objects_v2", e))?;

                for common in resp.common_prefixes() {
                    if let Some(p) = common.prefix() {
                        listing.folders.push(self.object_key(p).to_string());
                    }
                }
                for obj in resp.contents() {
                    if let Some(k) = obj.key() {
                        listing.files.push(ListedObject {
                            key: self.object_key(k).to_string(),
                            size: obj.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                        });
                    }
                }

                if resp.is_truncated() == Some(true) {
                    continuation_token = resp.next_continuation_token().map(|t| t.to_string());
                    if continuation_token.is_none() {
                        break;
                    }
                } else {
                    break;
                }
            }

            Ok(listing)
        })
    }
}
