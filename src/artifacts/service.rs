use std::{io::Write, path::PathBuf};

use super::{
    download::{ensure_cache_dir, FetchEngine, FetchReport, HttpOptions, Transport},
    error::PrefetchError,
    manager::ArtifactSpec,
    plan::{plan, FetchPlan},
};

/// Everything the pre-fetch step needs, resolved up front by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchConfig {
    pub downloads_dir: PathBuf,
    pub artifacts: Vec<ArtifactSpec>,
    pub http: HttpOptions,
}

impl PrefetchConfig {
    pub fn plan(&self) -> Result<FetchPlan, PrefetchError> {
        Ok(plan(&self.artifacts, &self.downloads_dir)?)
    }
}

/// Download every configured artifact that is not already cached, printing
/// progress to stdout.
pub fn ensure_pre_downloads(config: &PrefetchConfig) -> Result<FetchReport, PrefetchError> {
    let mut engine = FetchEngine::http(&config.http)?;
    prefetch_with(config, &mut engine)
}

pub fn prefetch_with<T, W>(
    config: &PrefetchConfig,
    engine: &mut FetchEngine<T, W>,
) -> Result<FetchReport, PrefetchError>
where
    T: Transport,
    W: Write,
{
    ensure_cache_dir(&config.downloads_dir)?;
    let plan = config.plan()?;
    tracing::debug!(
        cache_dir = %plan.cache_dir().display(),
        entries = plan.len(),
        "fetch plan ready"
    );

    let report = engine.ensure_available(&plan)?;
    for failure in report.failures() {
        tracing::debug!(artifact = %failure.name, "artifact unavailable after pre-fetch");
    }
    Ok(report)
}
