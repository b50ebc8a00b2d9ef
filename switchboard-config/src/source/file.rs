//! Local JSON file source, mostly for development and tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{outcome_since, ConfigSource, FetchOutcome};
use crate::document::decode_snapshot;
use switchboard_core::{ConfigError, SnapshotVersion, SwitchboardResult};

const SOURCE_NAME: &str = "file";

#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Build from a `file://` URL.
    pub fn from_url(url: &str) -> Option<Self> {
        url.strip_prefix("file://")
            .filter(|p| !p.is_empty())
            .map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, since: Option<SnapshotVersion>) -> SwitchboardResult<FetchOutcome> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ConfigError::FetchFailed {
                source_name: SOURCE_NAME.to_string(),
                reason: format!("cannot read {}: {}", self.path.display(), e),
            })?;
        let snapshot = decode_snapshot(&bytes)?;
        Ok(outcome_since(snapshot, since))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_url() {
        let source = FileConfigSource::from_url("file:///etc/switchboard.json").unwrap();
        assert_eq!(source.path(), Path::new("/etc/switchboard.json"));
        assert!(FileConfigSource::from_url("https://x").is_none());
        assert!(FileConfigSource::from_url("file://").is_none());
    }

    #[tokio::test]
    async fn test_reads_and_compares_versions() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"version": 4, "settings": {{"k": "v"}}}}"#).unwrap();
        let source = FileConfigSource::new(file.path());

        match source.fetch(None).await.unwrap() {
            FetchOutcome::Updated(snapshot) => assert_eq!(snapshot.setting("k"), Some("v")),
            FetchOutcome::Unchanged => panic!("expected a snapshot"),
        }
        assert_eq!(source.fetch(Some(4)).await.unwrap(), FetchOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_failure() {
        let source = FileConfigSource::new("/definitely/not/here.json");
        assert!(source.fetch(None).await.is_err());
    }
}
