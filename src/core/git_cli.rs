use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::core::git::{DiffSource, DiffSummary, FileSummary, VcsBackend, VcsError};

/// Flags every `git diff` call carries so user config (`color.diff`,
/// `diff.external`, `diff.renames`) cannot change the output format.
const DIFF_FLAGS: &[&str] = &["--no-color", "--no-ext-diff", "-M"];

/// Collaborator that shells out to the `git` executable.
///
/// Summaries use `--numstat -z`, which reports a rename as separate old and
/// new paths; only the new path is kept.
pub struct GitCliBackend {
    cwd: PathBuf,
    root: OnceCell<PathBuf>,
}

impl GitCliBackend {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            root: OnceCell::new(),
        }
    }

    fn diff_args(extra: &[&str]) -> Vec<String> {
        std::iter::once("diff")
            .chain(DIFF_FLAGS.iter().copied())
            .chain(extra.iter().copied())
            .map(String::from)
            .collect()
    }

    async fn resolve_root(&self) -> Result<PathBuf, VcsError> {
        let args = vec!["rev-parse".to_string(), "--show-toplevel".to_string()];
        let stdout = self.run_git(&self.cwd, &args).await?;
        let root = stdout.trim();
        if root.is_empty() {
            return Err(VcsError::InvalidOutput(
                "git rev-parse --show-toplevel printed nothing".to_string(),
            ));
        }
        Ok(PathBuf::from(root))
    }

    async fn run_git(&self, dir: &Path, args: &[String]) -> Result<String, VcsError> {
        let output = Command::new("git")
            .arg("-c")
            .arg("core.quotepath=off")
            .args(args)
            .current_dir(dir)
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(VcsError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl VcsBackend for GitCliBackend {
    fn id(&self) -> &str {
        "cli"
    }

    /// Resolved once per backend; later calls reuse the cached root.
    async fn repo_root(&self) -> Result<PathBuf, VcsError> {
        self.root
            .get_or_try_init(|| self.resolve_root())
            .await
            .cloned()
    }

    async fn diff_summary(
        &self,
        source: &DiffSource,
        paths: &[String],
    ) -> Result<DiffSummary, VcsError> {
        let root = self.repo_root().await?;

        let mut args = Self::diff_args(&["--numstat", "-z"]);
        match source {
            DiffSource::SinceBase(base_ref) => {
                args.push(base_ref.clone());
                args.push("HEAD".to_string());
            }
            DiffSource::Staged => args.push("--cached".to_string()),
            DiffSource::Unstaged => {}
        }
        args.push("--".to_string());
        args.extend(paths.iter().cloned());

        let stdout = self.run_git(&root, &args).await?;
        let summary = DiffSummary::from_files(parse_numstat(&stdout)?);
        debug!(source = ?source, files = summary.changed, "git numstat summary");
        Ok(summary)
    }

    async fn unified_diff(&self, base_ref: &str, path: &str) -> Result<String, VcsError> {
        let root = self.repo_root().await?;
        let args = Self::diff_args(&["-U0", base_ref, "--", path]);
        self.run_git(&root, &args).await
    }
}

/// Parses `git diff --numstat -z` output.
///
/// Records are NUL-terminated. A rename leaves the path field empty and is
/// followed by the old and new paths as two more fields. Binary files report
/// `-` for both counts.
pub fn parse_numstat(output: &str) -> Result<Vec<FileSummary>, VcsError> {
    let mut files = Vec::new();
    let mut fields = output.split('\0').filter(|field| !field.is_empty());

    while let Some(record) = fields.next() {
        let invalid = || VcsError::InvalidOutput(format!("numstat record '{}'", record));
        let mut parts = record.splitn(3, '\t');
        let (Some(insertions), Some(deletions), Some(path)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let file = if path.is_empty() {
            let (Some(_old), Some(new)) = (fields.next(), fields.next()) else {
                return Err(invalid());
            };
            new.to_string()
        } else {
            path.to_string()
        };

        let summary = if insertions == "-" && deletions == "-" {
            FileSummary {
                file,
                insertions: 0,
                deletions: 0,
                binary: true,
            }
        } else {
            let parse = |value: &str| value.parse::<usize>().map_err(|_| invalid());
            FileSummary {
                file,
                insertions: parse(insertions)?,
                deletions: parse(deletions)?,
                binary: false,
            }
        };
        files.push(summary);
    }

    Ok(files)
}
