use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::artifacts::{hadoop, spark, ArtifactSpec, HttpOptions, PrefetchConfig};

pub const CONFIG_FILE: &str = "prefetch.json";
pub const DEFAULT_DOWNLOADS_DIR: &str = "/tmp/dataproc-prefetch-cache";

/// On-disk settings, keyed like the provisioning vars they come from.
///
/// Missing keys fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PrefetchSettings {
    pub downloads_dir: String,
    pub hadoop_version: Option<String>,
    pub spark_version: Option<String>,
    pub hadoop_mirror: Option<String>,
    pub spark_mirror: Option<String>,
    pub hadoop_sha256: Option<String>,
    pub spark_sha256: Option<String>,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Extra artifact families fetched after Hadoop and Spark.
    pub artifacts: Vec<ArtifactSpec>,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        let http = HttpOptions::default();
        Self {
            downloads_dir: DEFAULT_DOWNLOADS_DIR.into(),
            hadoop_version: None,
            spark_version: None,
            hadoop_mirror: None,
            spark_mirror: None,
            hadoop_sha256: None,
            spark_sha256: None,
            connect_timeout_secs: http.connect_timeout.as_secs(),
            idle_timeout_secs: http.idle_timeout.as_secs(),
            artifacts: vec![],
        }
    }
}

impl PrefetchSettings {
    pub fn downloads_dir(&self) -> PathBuf {
        expand_home(&self.downloads_dir)
    }

    /// Zero timeouts are raised to one second.
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs.max(1)),
        }
    }

    pub fn artifact_specs(&self) -> Vec<ArtifactSpec> {
        let mut specs = vec![
            hadoop(self.hadoop_version.clone(), self.hadoop_mirror.clone())
                .with_sha256(self.hadoop_sha256.clone()),
            spark(self.spark_version.clone(), self.spark_mirror.clone())
                .with_sha256(self.spark_sha256.clone()),
        ];
        specs.extend(self.artifacts.iter().cloned());
        specs
    }

    pub fn into_config(self) -> PrefetchConfig {
        PrefetchConfig {
            downloads_dir: self.downloads_dir(),
            artifacts: self.artifact_specs(),
            http: self.http_options(),
        }
    }
}

pub fn resolve_config_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("org", "Dataproc", "dataproc-prefetch")
        .context("missing project directories")?;
    Ok(project_dirs.config_dir().join(CONFIG_FILE))
}

pub fn load_settings(path: &Path) -> Result<PrefetchSettings> {
    if !path.exists() {
        tracing::debug!("no settings at {}, using defaults", path.display());
        return Ok(PrefetchSettings::default());
    }
    let bytes = fs::read(path).with_context(|| format!("failed reading {path:?}"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("{path:?} could not be parsed"))
}

/// Settings from the per-user config file. A platform without a config
/// directory gets the defaults, the same as a missing file.
pub fn load_user_settings() -> Result<PrefetchSettings> {
    load_resolved(resolve_config_path())
}

fn load_resolved(path: Result<PathBuf>) -> Result<PrefetchSettings> {
    match path {
        Ok(path) => load_settings(&path),
        Err(err) => {
            tracing::warn!("{err:#}; using default settings");
            Ok(PrefetchSettings::default())
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    let home = || BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    if raw == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
