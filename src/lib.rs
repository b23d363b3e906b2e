//! Local pre-fetch cache for the distribution archives a cluster provisioning
//! run needs.
//!
//! [`artifacts::plan`] turns versioned [`artifacts::ArtifactSpec`]s into
//! deterministic (URL, path) pairs; [`artifacts::FetchEngine`] makes sure each
//! path holds a complete download, skipping anything already cached.

pub mod artifacts;
pub mod config;
