use async_trait::async_trait;
use git2::{Diff, DiffFindOptions, DiffFormat, DiffOptions, Patch, Repository};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("unexpected git output: {0}")]
    InvalidOutput(String),

    #[error("repository at {} has no working directory", .0.display())]
    BareRepository(PathBuf),

    #[error("{} is outside of repository {}", path.display(), root.display())]
    PathOutsideRepository { path: PathBuf, root: PathBuf },
}

/// Which pair of trees a summary compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiffSource {
    /// Base reference tree against the `HEAD` tree.
    SinceBase(String),
    /// `HEAD` tree against the index.
    Staged,
    /// Index against the working tree.
    Unstaged,
}

/// Per-file entry of a diff summary. `file` is repository-relative and may
/// still carry rename syntax (`dir/{old => new}/file`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub file: String,
    pub insertions: usize,
    pub deletions: usize,
    pub binary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub insertions: usize,
    pub deletions: usize,
    pub changed: usize,
    pub files: Vec<FileSummary>,
}

impl DiffSummary {
    pub fn from_files(files: Vec<FileSummary>) -> Self {
        Self {
            insertions: files.iter().map(|f| f.insertions).sum(),
            deletions: files.iter().map(|f| f.deletions).sum(),
            changed: files.len(),
            files,
        }
    }
}

/// Read-only access to a repository's diffs. All paths are repository-relative.
#[async_trait]
pub trait VcsBackend: Send + Sync {
    fn id(&self) -> &str;

    /// Absolute path of the repository's working directory.
    async fn repo_root(&self) -> Result<PathBuf, VcsError>;

    async fn diff_summary(
        &self,
        source: &DiffSource,
        paths: &[String],
    ) -> Result<DiffSummary, VcsError>;

    /// Zero-context unified diff of one file between `base_ref` and the working tree.
    async fn unified_diff(&self, base_ref: &str, path: &str) -> Result<String, VcsError>;
}

/// libgit2 backed collaborator. The repository is reopened inside each
/// blocking task since `Repository` cannot be shared across threads.
pub struct Git2Backend {
    cwd: PathBuf,
}

impl Git2Backend {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
        }
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<T, VcsError>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T, VcsError> + Send + 'static,
    {
        let cwd = self.cwd.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::discover(&cwd)?;
            f(&repo)
        })
        .await?
    }
}

#[async_trait]
impl VcsBackend for Git2Backend {
    fn id(&self) -> &str {
        "git2"
    }

    async fn repo_root(&self) -> Result<PathBuf, VcsError> {
        self.with_repo(|repo| {
            repo.workdir()
                .map(Path::to_path_buf)
                .ok_or_else(|| VcsError::BareRepository(repo.path().to_path_buf()))
        })
        .await
    }

    async fn diff_summary(
        &self,
        source: &DiffSource,
        paths: &[String],
    ) -> Result<DiffSummary, VcsError> {
        let source = source.clone();
        let paths = paths.to_vec();
        self.with_repo(move |repo| {
            let mut diff_options = pathspec_options(&paths);
            let mut diff = match &source {
                DiffSource::SinceBase(base_ref) => {
                    let base = repo.revparse_single(base_ref)?.peel_to_tree()?;
                    let head = repo.head()?.peel_to_tree()?;
                    repo.diff_tree_to_tree(Some(&base), Some(&head), Some(&mut diff_options))?
                }
                DiffSource::Staged => {
                    let head = repo.head()?.peel_to_tree()?;
                    repo.diff_tree_to_index(Some(&head), None, Some(&mut diff_options))?
                }
                DiffSource::Unstaged => repo.diff_index_to_workdir(None, Some(&mut diff_options))?,
            };
            // Pair deletes with adds so a rename yields a single delta.
            diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;
            let summary = summarize(&diff)?;
            debug!(source = ?source, files = summary.changed, "git2 diff summary");
            Ok(summary)
        })
        .await
    }

    async fn unified_diff(&self, base_ref: &str, path: &str) -> Result<String, VcsError> {
        let base_ref = base_ref.to_string();
        let path = path.to_string();
        self.with_repo(move |repo| {
            let mut diff_options = pathspec_options(std::slice::from_ref(&path));
            diff_options.context_lines(0);

            let base = repo.revparse_single(&base_ref)?.peel_to_tree()?;
            let diff = repo.diff_tree_to_workdir_with_index(Some(&base), Some(&mut diff_options))?;

            let mut diff_text = Vec::new();
            diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
                if matches!(line.origin(), '+' | '-' | ' ') {
                    diff_text.push(line.origin() as u8);
                }
                diff_text.extend_from_slice(line.content());
                true
            })?;

            Ok(String::from_utf8_lossy(&diff_text).to_string())
        })
        .await
    }
}

fn pathspec_options(paths: &[String]) -> DiffOptions {
    let mut diff_options = DiffOptions::new();
    for path in paths {
        diff_options.pathspec(path);
    }
    diff_options
}

fn summarize(diff: &Diff<'_>) -> Result<DiffSummary, VcsError> {
    let mut files = Vec::new();

    for idx in 0..diff.deltas().len() {
        // Loading the patch populates the delta's binary flag.
        let patch = Patch::from_diff(diff, idx)?;
        let delta = diff
            .get_delta(idx)
            .ok_or_else(|| VcsError::InvalidOutput(format!("missing diff delta {}", idx)))?;
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .ok_or_else(|| VcsError::InvalidOutput(format!("diff delta {} has no path", idx)))?
            .to_string_lossy()
            .replace('\\', "/");

        if delta.flags().is_binary() {
            files.push(FileSummary {
                file: path,
                insertions: 0,
                deletions: 0,
                binary: true,
            });
            continue;
        }

        // A pure rename has no patch lines to count.
        let (insertions, deletions) = match patch {
            Some(patch) => {
                let (_context, insertions, deletions) = patch.line_stats()?;
                (insertions, deletions)
            }
            None => (0, 0),
        };
        files.push(FileSummary {
            file: path,
            insertions,
            deletions,
            binary: false,
        });
    }

    Ok(DiffSummary::from_files(files))
}
