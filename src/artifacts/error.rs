use std::{io, path::PathBuf};

use thiserror::Error;

use super::plan::PlanError;

/// Errors that abort the whole pre-fetch step.
///
/// Per-artifact transfer failures never show up here; they are reported on
/// the console and recorded in the [`FetchReport`](super::FetchReport).
#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("cannot create cache directory {}", path.display())]
    CacheDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("cannot set up the http client")]
    Client(#[source] anyhow::Error),
}
