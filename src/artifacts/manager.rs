use serde::{Deserialize, Deserializer, Serialize};

pub const HADOOP_MIRROR: &str = "https://mirrors.sonic.net/mirrors/apache/hadoop/common";
pub const SPARK_MIRROR: &str = "https://mirrors.sonic.net/mirrors/apache/spark";
pub const HADOOP_TEMPLATE: &str = "hadoop-{v}.tar.gz";
pub const SPARK_TEMPLATE: &str = "spark-{v}-bin-without-hadoop.tgz";

/// One downloadable artifact family, e.g. a distribution tarball.
///
/// A spec without a `version` is not required by the current invocation and
/// is skipped by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub mirror_base: String,
    pub filename_template: String,
    /// Lowercase hex; normalised on load.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_digest"
    )]
    pub sha256: Option<String>,
}

impl ArtifactSpec {
    pub fn new(
        name: impl Into<String>,
        version: Option<String>,
        mirror_base: impl Into<String>,
        filename_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            mirror_base: mirror_base.into(),
            filename_template: filename_template.into(),
            sha256: None,
        }
    }

    #[must_use]
    pub fn with_sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256.as_deref().map(normalize_digest);
        self
    }
}

fn normalize_digest(digest: &str) -> String {
    digest.trim().to_ascii_lowercase()
}

fn deserialize_digest<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let digest = Option::<String>::deserialize(deserializer)?;
    Ok(digest.as_deref().map(normalize_digest))
}

pub fn hadoop(version: Option<String>, mirror: Option<String>) -> ArtifactSpec {
    ArtifactSpec::new(
        "hadoop",
        version,
        mirror.unwrap_or_else(|| HADOOP_MIRROR.into()),
        HADOOP_TEMPLATE,
    )
}

pub fn spark(version: Option<String>, mirror: Option<String>) -> ArtifactSpec {
    ArtifactSpec::new(
        "spark",
        version,
        mirror.unwrap_or_else(|| SPARK_MIRROR.into()),
        SPARK_TEMPLATE,
    )
}
