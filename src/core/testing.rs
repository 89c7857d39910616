//! In-memory VCS collaborator for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::core::git::{DiffSource, DiffSummary, FileSummary, VcsBackend, VcsError};

#[derive(Default)]
pub struct FakeVcs {
    pub root: PathBuf,
    pub summaries: HashMap<DiffSource, Vec<FileSummary>>,
    pub diffs: HashMap<String, String>,
    pub fail_with: Option<String>,
    pub pathspecs: Mutex<Vec<Vec<String>>>,
    pub diff_requests: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_file(
        mut self,
        source: DiffSource,
        file: &str,
        insertions: usize,
        deletions: usize,
    ) -> Self {
        self.summaries.entry(source).or_default().push(FileSummary {
            file: file.to_string(),
            insertions,
            deletions,
            binary: false,
        });
        self
    }

    pub fn with_binary(mut self, source: DiffSource, file: &str) -> Self {
        self.summaries.entry(source).or_default().push(FileSummary {
            file: file.to_string(),
            insertions: 0,
            deletions: 0,
            binary: true,
        });
        self
    }

    pub fn with_diff(mut self, file: &str, diff: &str) -> Self {
        self.diffs.insert(file.to_string(), diff.to_string());
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    fn check(&self) -> Result<(), VcsError> {
        match &self.fail_with {
            Some(message) => Err(VcsError::CommandFailed {
                command: "git diff".to_string(),
                stderr: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VcsBackend for FakeVcs {
    fn id(&self) -> &str {
        "fake"
    }

    async fn repo_root(&self) -> Result<PathBuf, VcsError> {
        Ok(self.root.clone())
    }

    async fn diff_summary(
        &self,
        source: &DiffSource,
        paths: &[String],
    ) -> Result<DiffSummary, VcsError> {
        self.check()?;
        if let Ok(mut pathspecs) = self.pathspecs.lock() {
            pathspecs.push(paths.to_vec());
        }
        let files = self.summaries.get(source).cloned().unwrap_or_default();
        Ok(DiffSummary::from_files(files))
    }

    async fn unified_diff(&self, _base_ref: &str, path: &str) -> Result<String, VcsError> {
        self.check()?;
        if let Ok(mut requests) = self.diff_requests.lock() {
            requests.push(path.to_string());
        }
        Ok(self.diffs.get(path).cloned().unwrap_or_default())
    }
}
