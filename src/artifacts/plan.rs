use std::path::{Path, PathBuf};

use reqwest::Url;
use thiserror::Error;

use super::manager::ArtifactSpec;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("artifact {name}: filename template is empty")]
    EmptyTemplate { name: String },
    #[error("artifact {name}: unbalanced braces in template {template:?}")]
    UnbalancedBraces { name: String, template: String },
    #[error("artifact {name}: unknown placeholder {{{placeholder}}} in template {template:?}")]
    UnknownPlaceholder {
        name: String,
        template: String,
        placeholder: String,
    },
    #[error("artifact {name}: template {template:?} never references the version")]
    MissingVersion { name: String, template: String },
    #[error("artifact {name}: {file_name:?} is not a single file name")]
    InvalidFileName { name: String, file_name: String },
    #[error("artifact {name}: invalid mirror base {mirror:?}: {reason}")]
    InvalidMirror {
        name: String,
        mirror: String,
        reason: String,
    },
}

/// A resolved (source URL, destination path) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: String,
    pub source_url: Url,
    pub dest_path: PathBuf,
    pub sha256: Option<String>,
}

impl PlanEntry {
    /// Bytes land here first and are renamed onto `dest_path` only after a
    /// complete transfer.
    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        let mut staging = self.dest_path.clone().into_os_string();
        staging.push(".part");
        PathBuf::from(staging)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    cache_dir: PathBuf,
    entries: Vec<PlanEntry>,
}

impl FetchPlan {
    pub fn cache_dir(&self) -> &Path {
        self.cache_dir.as_path()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<'a> IntoIterator for &'a FetchPlan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Resolve every versioned spec into a plan entry, preserving input order.
///
/// Pure: neither the network nor the filesystem is touched, and `cache_dir`
/// does not have to exist yet.
pub fn plan(specs: &[ArtifactSpec], cache_dir: &Path) -> Result<FetchPlan, PlanError> {
    let mut entries = Vec::with_capacity(specs.len());
    for spec in specs {
        if let Some(entry) = plan_for(spec, cache_dir)? {
            entries.push(entry);
        }
    }
    Ok(FetchPlan {
        cache_dir: cache_dir.to_path_buf(),
        entries,
    })
}

/// `Ok(None)` when the spec carries no (or a blank) version.
pub fn plan_for(spec: &ArtifactSpec, cache_dir: &Path) -> Result<Option<PlanEntry>, PlanError> {
    let Some(version) = spec.version.as_deref().map(str::trim) else {
        return Ok(None);
    };
    if version.is_empty() {
        return Ok(None);
    }

    let file_name = render_file_name(spec, version)?;
    let release_dir = format!("{}-{}", spec.name, version);
    check_path_component(spec, &release_dir)?;
    let mirror = mirror_base(spec)?;
    let source = format!(
        "{}/{}/{}",
        mirror.as_str().trim_end_matches('/'),
        release_dir,
        file_name
    );
    let source_url = Url::parse(&source).map_err(|err| PlanError::InvalidMirror {
        name: spec.name.clone(),
        mirror: spec.mirror_base.clone(),
        reason: err.to_string(),
    })?;

    Ok(Some(PlanEntry {
        name: spec.name.clone(),
        source_url,
        dest_path: cache_dir.join(&file_name),
        sha256: spec.sha256.clone(),
    }))
}

/// Substitute `{v}`, `{version}` and `{name}` in the spec's filename template.
pub fn render_file_name(spec: &ArtifactSpec, version: &str) -> Result<String, PlanError> {
    let template = spec.filename_template.as_str();
    if template.trim().is_empty() {
        return Err(PlanError::EmptyTemplate {
            name: spec.name.clone(),
        });
    }

    let unbalanced = || PlanError::UnbalancedBraces {
        name: spec.name.clone(),
        template: template.to_string(),
    };

    let mut rendered = String::with_capacity(template.len() + version.len());
    let mut references_version = false;
    let mut rest = template;
    while let Some(open) = rest.find(['{', '}']) {
        if rest[open..].starts_with('}') {
            return Err(unbalanced());
        }
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(unbalanced)?;
        let placeholder = &after[..close];
        if placeholder.contains('{') {
            return Err(unbalanced());
        }
        match placeholder {
            "v" | "version" => {
                references_version = true;
                rendered.push_str(version);
            }
            "name" => rendered.push_str(&spec.name),
            other => {
                return Err(PlanError::UnknownPlaceholder {
                    name: spec.name.clone(),
                    template: template.to_string(),
                    placeholder: other.to_string(),
                })
            }
        }
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);

    if !references_version {
        return Err(PlanError::MissingVersion {
            name: spec.name.clone(),
            template: template.to_string(),
        });
    }
    check_path_component(spec, &rendered)?;
    Ok(rendered)
}

/// `component` must be usable verbatim as one URL path segment and one file
/// name inside the cache directory.
fn check_path_component(spec: &ArtifactSpec, component: &str) -> Result<(), PlanError> {
    let reserved = |c: char| {
        matches!(c, '/' | '\\' | '#' | '?' | '%') || c.is_whitespace() || c.is_control()
    };
    if matches!(component, "" | "." | "..") || component.contains(reserved) {
        return Err(PlanError::InvalidFileName {
            name: spec.name.clone(),
            file_name: component.to_string(),
        });
    }
    Ok(())
}

fn mirror_base(spec: &ArtifactSpec) -> Result<Url, PlanError> {
    let invalid = |reason: String| PlanError::InvalidMirror {
        name: spec.name.clone(),
        mirror: spec.mirror_base.clone(),
        reason,
    };
    let url = Url::parse(spec.mirror_base.trim()).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query strings and fragments are not allowed".into()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::manager::{hadoop, spark};

    const M1: &str = "https://mirror.example.org/apache/hadoop/common";

    fn hadoop_321() -> ArtifactSpec {
        ArtifactSpec::new("hadoop", Some("3.2.1".into()), M1, "hadoop-{v}.tar.gz")
    }

    #[test]
    fn plans_hadoop_and_skips_unversioned_spark() {
        let specs = vec![hadoop_321(), spark(None, None)];
        let plan = plan(&specs, Path::new("/tmp/c")).unwrap();

        assert_eq!(plan.len(), 1);
        let entry = &plan.entries()[0];
        assert_eq!(entry.dest_path, PathBuf::from("/tmp/c/hadoop-3.2.1.tar.gz"));
        assert_eq!(
            entry.source_url.as_str(),
            format!("{M1}/hadoop-3.2.1/hadoop-3.2.1.tar.gz")
        );
        assert_eq!(plan.cache_dir(), Path::new("/tmp/c"));
    }

    #[test]
    fn planning_is_deterministic_and_ordered() {
        let specs = vec![
            spark(Some("3.1.2".into()), None),
            hadoop(Some("3.2.1".into()), None),
        ];
        let first = plan(&specs, Path::new("/var/cache/prefetch")).unwrap();
        let second = plan(&specs, Path::new("/var/cache/prefetch")).unwrap();

        assert_eq!(first, second);
        let names: Vec<_> = first.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["spark", "hadoop"]);
        assert_eq!(
            first.entries()[0].source_url.as_str(),
            "https://mirrors.sonic.net/mirrors/apache/spark/spark-3.1.2/spark-3.1.2-bin-without-hadoop.tgz"
        );
    }

    #[test]
    fn blank_version_is_skipped() {
        let spec = ArtifactSpec::new("hadoop", Some("  ".into()), M1, "hadoop-{v}.tar.gz");
        assert_eq!(plan_for(&spec, Path::new("/tmp/c")).unwrap(), None);
    }

    #[test]
    fn trailing_slash_on_mirror_is_tolerated() {
        let spec = ArtifactSpec::new(
            "hadoop",
            Some("3.2.1".into()),
            format!("{M1}/"),
            "hadoop-{v}.tar.gz",
        );
        let entry = plan_for(&spec, Path::new("/tmp/c")).unwrap().unwrap();
        assert_eq!(
            entry.source_url.as_str(),
            format!("{M1}/hadoop-3.2.1/hadoop-3.2.1.tar.gz")
        );
    }

    #[test]
    fn name_and_long_version_placeholders_render() {
        let spec = ArtifactSpec::new("spark", Some("3.0.0".into()), M1, "{name}-{version}.tgz");
        assert_eq!(render_file_name(&spec, "3.0.0").unwrap(), "spark-3.0.0.tgz");
    }

    #[test]
    fn staging_path_sits_next_to_destination() {
        let entry = plan_for(&hadoop_321(), Path::new("/tmp/c")).unwrap().unwrap();
        assert_eq!(
            entry.staging_path(),
            PathBuf::from("/tmp/c/hadoop-3.2.1.tar.gz.part")
        );
    }

    #[test]
    fn malformed_templates_are_rejected() {
        let with_template = |template: &str| {
            ArtifactSpec::new("hadoop", Some("3.2.1".into()), M1, template)
        };

        assert!(matches!(
            plan_for(&with_template(""), Path::new("/tmp/c")),
            Err(PlanError::EmptyTemplate { .. })
        ));
        assert!(matches!(
            plan_for(&with_template("hadoop-{v.tar.gz"), Path::new("/tmp/c")),
            Err(PlanError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            plan_for(&with_template("hadoop-v}.tar.gz"), Path::new("/tmp/c")),
            Err(PlanError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            plan_for(&with_template("hadoop-{ver}.tar.gz"), Path::new("/tmp/c")),
            Err(PlanError::UnknownPlaceholder { placeholder, .. }) if placeholder == "ver"
        ));
        assert!(matches!(
            plan_for(&with_template("hadoop.tar.gz"), Path::new("/tmp/c")),
            Err(PlanError::MissingVersion { .. })
        ));
        assert!(matches!(
            plan_for(&with_template("dist/hadoop-{v}.tar.gz"), Path::new("/tmp/c")),
            Err(PlanError::InvalidFileName { .. })
        ));
        assert!(matches!(
            plan_for(&with_template("hadoop-{v}#mirror.tar.gz"), Path::new("/tmp/c")),
            Err(PlanError::InvalidFileName { .. })
        ));
    }

    #[test]
    fn version_cannot_escape_the_cache_directory() {
        let spec = ArtifactSpec::new("hadoop", Some("../../etc".into()), M1, "{v}");
        assert!(matches!(
            plan_for(&spec, Path::new("/tmp/c")),
            Err(PlanError::InvalidFileName { .. })
        ));
    }

    #[test]
    fn url_special_characters_are_rejected() {
        for version in ["3.2.1#rc1", "3.2.1?dl=1", "3.2%2F1", "3.2 1", "3.2.1\u{7}"] {
            let spec = ArtifactSpec::new("hadoop", Some(version.into()), M1, "hadoop-{v}.tar.gz");
            assert!(
                matches!(
                    plan(&[spec], Path::new("/tmp/c")),
                    Err(PlanError::InvalidFileName { .. })
                ),
                "{version:?}"
            );
        }

        let spaced_name =
            ArtifactSpec::new("apache hive", Some("4.0.0".into()), M1, "hive-{v}.tgz");
        assert!(matches!(
            plan_for(&spaced_name, Path::new("/tmp/c")),
            Err(PlanError::InvalidFileName { file_name, .. }) if file_name == "apache hive-4.0.0"
        ));
    }

    #[test]
    fn mirror_must_be_http() {
        let with_mirror = |mirror: &str| {
            ArtifactSpec::new("hadoop", Some("3.2.1".into()), mirror, "hadoop-{v}.tar.gz")
        };

        for spec in [with_mirror("mirrors/hadoop"), with_mirror("ftp://mirror.example.org")] {
            let err = plan_for(&spec, Path::new("/tmp/c")).unwrap_err();
            assert!(matches!(err, PlanError::InvalidMirror { .. }), "{err}");
        }
    }

    #[test]
    fn planning_does_not_create_the_cache_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let cache_dir = scratch.path().join("not-yet");
        plan(&[hadoop_321()], &cache_dir).unwrap();
        assert!(!cache_dir.exists());
    }
}
