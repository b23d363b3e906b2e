mod download;
mod error;
mod manager;
mod metadata;
mod plan;
mod progress;
mod service;

pub use download::{
    ArtifactOutcome, ArtifactState, FetchEngine, FetchReport, HttpOptions, HttpTransport,
    Transfer, Transport, CHUNK_SIZE,
};
pub use error::PrefetchError;
pub use manager::{
    hadoop, spark, ArtifactSpec, HADOOP_MIRROR, HADOOP_TEMPLATE, SPARK_MIRROR, SPARK_TEMPLATE,
};
pub use metadata::{compute_sha256, probe_cached, CacheProbe};
pub use plan::{plan, plan_for, render_file_name, FetchPlan, PlanEntry, PlanError};
pub use progress::{DownloadProgress, RENDER_INTERVAL};
pub use service::{ensure_pre_downloads, prefetch_with, PrefetchConfig};
