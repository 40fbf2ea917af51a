//! Directory listing handler.
//!
//! Returns the immediate children of a key prefix as JSON.  Rendering the
//! listing (breadcrumbs, icons) is left to the client.

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::errors::GatewayError;
use crate::storage::backend::Listing;
use crate::stream::{record_store_failure, with_timeout};
use crate::AppState;

/// JSON body of `GET /api/list`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListingResponse {
    /// The prefix that was listed.
    pub prefix: String,
    /// Sub-prefixes, each ending in `/`.
    pub folders: Vec<String>,
    /// Objects directly under the prefix.
    pub files: Vec<FileEntry>,
}

/// One object in a listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileEntry {
    /// Full object key, usable with `/stream/{key}` and `/download/{key}`.
    pub key: String,
    /// Last path segment of the key.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

impl ListingResponse {
    fn new(prefix: String, listing: Listing) -> Self {
        let files = listing
            .files
            .into_iter()
            .map(|f| FileEntry {
                name: f.key.rsplit('/').next().unwrap_or_default().to_string(),
                key: f.key,
                size: f.size,
            })
            .collect();
        Self {
            prefix,
            folders: listing.folders,
            files,
        }
    }
}

/// Normalize a requested prefix: no leading slash, and a trailing slash
/// unless empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// `GET /api/list?prefix=...` -- List a "directory" of the store.
#[utoipa::path(
    get,
    path = "/api/list",
    tag = "Listing",
    operation_id = "ListPrefix",
    params(
        ("prefix" = Option<String>, Query, description = "Folder to list; empty for the root"),
    ),
    responses(
        (status = 200, description = "Folders and files under the prefix", body = ListingResponse),
        (status = 401, description = "No valid session"),
        (status = 404, description = "Store unavailable")
    )
)]
pub async fn list_prefix(state: Arc<AppState>, prefix: &str) -> Result<Response, GatewayError> {
    let prefix = normalize_prefix(prefix);
    debug!("List prefix '{}'", prefix);

    let listing = with_timeout("list", state.store_timeout(), state.storage.list(&prefix))
        .await
        .map_err(|err| {
            record_store_failure("list", &prefix, &err);
            GatewayError::NotFound {
                key: prefix.clone(),
            }
        })?;

    Ok(Json(ListingResponse::new(prefix, listing)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::ListedObject;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("movies"), "movies/");
        assert_eq!(normalize_prefix("/movies/2024"), "movies/2024/");
        assert_eq!(normalize_prefix("movies/"), "movies/");
    }

    #[test]
    fn test_listing_response_names() {
        let listing = Listing {
            folders: vec!["movies/extras/".to_string()],
            files: vec![ListedObject {
                key: "movies/a.mp4".to_string(),
                size: 42,
            }],
        };
        let body = ListingResponse::new("movies/".to_string(), listing);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "prefix": "movies/",
                "folders": ["movies/extras/"],
                "files": [{ "key": "movies/a.mp4", "name": "a.mp4", "size": 42 }]
            })
        );
    }
}
