//! Object storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where bytes
//! physically live.  Implementations include local disk, an in-memory
//! map, and AWS S3 (or any S3-compatible endpoint).

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;
