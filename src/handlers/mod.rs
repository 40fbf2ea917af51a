//! HTTP handlers, one module per resource.

pub mod listing;
pub mod object;
