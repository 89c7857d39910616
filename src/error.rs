use std::path::PathBuf;
use thiserror::Error;

use crate::core::git::VcsError;
use crate::core::hunk::ParseError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// A filter or config value that cannot be interpreted unambiguously.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(
        "no categories for change {index} ({}): {computed} sets for {expected} changes",
        file.display()
    )]
    InternalConsistency {
        index: usize,
        file: PathBuf,
        computed: usize,
        expected: usize,
    },

    /// Source text for a change could not be read. Recovered by the classifier.
    #[error("cannot read {} for classification: {source}", path.display())]
    MissingSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A language classifier could not process a file. Recovered by the classifier step.
    #[error("language classifier failed: {0:#}")]
    Classifier(anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
