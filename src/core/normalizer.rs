use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::core::change::{ChangedLineSet, GitChange, TextChange};
use crate::core::fanout::map_bounded;
use crate::core::git::{DiffSource, DiffSummary, FileSummary, VcsBackend, VcsError};
use crate::core::hunk::changed_lines_in_diff;
use crate::error::Result;

static BRACE_RENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]*) => ([^{}]*)\}").unwrap());

/// How file paths are written into change records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PathStyle {
    #[default]
    Absolute,
    /// Relative to the query's working directory.
    Relative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeQuery {
    pub base_ref: String,
    pub cwd: PathBuf,
    pub specific_files: Vec<PathBuf>,
}

/// Turns the VCS collaborator's summaries and raw diffs into one
/// [`GitChange`] per changed file.
pub struct ChangeNormalizer {
    vcs: Arc<dyn VcsBackend>,
    path_style: PathStyle,
    max_concurrency: usize,
}

impl ChangeNormalizer {
    pub fn new(vcs: Arc<dyn VcsBackend>, path_style: PathStyle, max_concurrency: usize) -> Self {
        Self {
            vcs,
            path_style,
            max_concurrency,
        }
    }

    #[instrument(skip_all, fields(backend = self.vcs.id(), base_ref = %query.base_ref))]
    pub async fn git_changes(&self, query: &ChangeQuery) -> Result<Vec<GitChange>> {
        let root = canonical(&self.vcs.repo_root().await?);
        let cwd = canonical(&query.cwd);
        let pathspecs = scope_pathspecs(&root, &cwd, &query.specific_files)?;

        let since_base = DiffSource::SinceBase(query.base_ref.clone());
        let (since_base, staged, unstaged) = tokio::try_join!(
            self.vcs.diff_summary(&since_base, &pathspecs),
            self.vcs.diff_summary(&DiffSource::Staged, &pathspecs),
            self.vcs.diff_summary(&DiffSource::Unstaged, &pathspecs),
        )?;
        debug!(
            since_base = since_base.changed,
            staged = staged.changed,
            unstaged = unstaged.changed,
            "collected diff summaries"
        );

        let files = merge_summaries([since_base, staged, unstaged]);

        let vcs = self.vcs.clone();
        let base_ref = query.base_ref.clone();
        let path_style = self.path_style;
        let records = map_bounded(files, self.max_concurrency, move |file| {
            let vcs = vcs.clone();
            let base_ref = base_ref.clone();
            let file_path = display_path(&root, &cwd, &file.file, path_style);
            async move { normalize_file(vcs, &base_ref, file, file_path).await }
        })
        .await?;

        let mut changes = Vec::with_capacity(records.len());
        for record in records {
            if let Some(change) = record? {
                changes.push(change);
            }
        }
        Ok(changes)
    }
}

async fn normalize_file(
    vcs: Arc<dyn VcsBackend>,
    base_ref: &str,
    file: FileSummary,
    file_path: PathBuf,
) -> Result<Option<GitChange>> {
    if file.binary {
        return Ok(Some(GitChange::Binary { file_path }));
    }

    let diff = vcs.unified_diff(base_ref, &file.file).await?;
    let changed_line_numbers: ChangedLineSet = changed_lines_in_diff(&diff)?.into_iter().collect();

    if file.insertions == 0 && file.deletions == 0 && changed_line_numbers.is_empty() {
        debug!(file = %file.file, "skipping file without diff content");
        return Ok(None);
    }

    Ok(Some(GitChange::Text(TextChange {
        file_path,
        additions: file.insertions,
        deletions: file.deletions,
        changed_line_numbers,
    })))
}

/// Resolves VCS rename shorthand to the new path.
///
/// `src/{old => new}/a.ts` becomes `src/new/a.ts`, `{ => lib}/a.ts` becomes
/// `lib/a.ts` and a brace-free `old.ts => new.ts` becomes `new.ts`.
pub fn normalize_rename_path(path: &str) -> String {
    if BRACE_RENAME.is_match(path) {
        let replaced = BRACE_RENAME.replace_all(path, "$2");
        let collapsed: Vec<&str> = replaced.split('/').filter(|part| !part.is_empty()).collect();
        let joined = collapsed.join("/");
        return if path.starts_with('/') {
            format!("/{}", joined)
        } else {
            joined
        };
    }

    match path.split_once(" => ") {
        Some((_, new_path)) => new_path.to_string(),
        None => path.to_string(),
    }
}

/// Merges per-source summaries by rename-normalized path, keeping first-seen
/// order and summing counts. A binary/text disagreement keeps the text entry.
pub fn merge_summaries(summaries: impl IntoIterator<Item = DiffSummary>) -> Vec<FileSummary> {
    let mut merged: Vec<FileSummary> = Vec::new();
    let mut index_by_path: HashMap<String, usize> = HashMap::new();

    for file in summaries.into_iter().flat_map(|summary| summary.files) {
        let file = FileSummary {
            file: normalize_rename_path(&file.file),
            ..file
        };

        let Some(&idx) = index_by_path.get(&file.file) else {
            index_by_path.insert(file.file.clone(), merged.len());
            merged.push(file);
            continue;
        };

        let current = &mut merged[idx];
        match (current.binary, file.binary) {
            (true, true) => {}
            (false, false) => {
                current.insertions += file.insertions;
                current.deletions += file.deletions;
            }
            (false, true) => {
                error!(file = %file.file, "type mismatch between diffs, keeping text diff");
            }
            (true, false) => {
                error!(file = %file.file, "type mismatch between diffs, keeping text diff");
                *current = file;
            }
        }
    }

    merged
}

fn canonical(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    std::fs::canonicalize(&absolute).unwrap_or(absolute)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Repository-relative pathspecs for a query. Without specific files the
/// query is scoped to `cwd` when it sits below the repository root.
fn scope_pathspecs(
    root: &Path,
    cwd: &Path,
    specific_files: &[PathBuf],
) -> std::result::Result<Vec<String>, VcsError> {
    if specific_files.is_empty() {
        return Ok(match cwd.strip_prefix(root) {
            Ok(relative) if !relative.as_os_str().is_empty() => vec![to_slash(relative)],
            _ => Vec::new(),
        });
    }

    let mut pathspecs = Vec::with_capacity(specific_files.len());
    for file in specific_files {
        let absolute = canonical(&cwd.join(file));
        let relative = absolute
            .strip_prefix(root)
            .map_err(|_| VcsError::PathOutsideRepository {
                path: absolute.clone(),
                root: root.to_path_buf(),
            })?;
        if !relative.as_os_str().is_empty() {
            pathspecs.push(to_slash(relative));
        }
    }
    Ok(pathspecs)
}

fn display_path(root: &Path, cwd: &Path, repo_relative: &str, style: PathStyle) -> PathBuf {
    let absolute = root.join(repo_relative);
    match style {
        PathStyle::Absolute => absolute,
        PathStyle::Relative => pathdiff::diff_paths(&absolute, cwd).unwrap_or(absolute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::FakeVcs;
    use crate::error::Error;

    fn query(specific_files: &[&str]) -> ChangeQuery {
        ChangeQuery {
            base_ref: "HEAD".to_string(),
            cwd: PathBuf::from("/repo"),
            specific_files: specific_files.iter().map(PathBuf::from).collect(),
        }
    }

    fn text(path: &str, additions: usize, deletions: usize, lines: &[usize]) -> GitChange {
        GitChange::Text(TextChange {
            file_path: PathBuf::from(path),
            additions,
            deletions,
            changed_line_numbers: lines.iter().copied().collect(),
        })
    }

    #[test]
    fn resolves_rename_shorthand() {
        assert_eq!(normalize_rename_path("src/{old => new}/a.ts"), "src/new/a.ts");
        assert_eq!(normalize_rename_path("{ => lib}/a.ts"), "lib/a.ts");
        assert_eq!(normalize_rename_path("src/{legacy => }/a.ts"), "src/a.ts");
        assert_eq!(normalize_rename_path("src/{a.ts => b.ts}"), "src/b.ts");
        assert_eq!(normalize_rename_path("old.ts => new.ts"), "new.ts");
        assert_eq!(normalize_rename_path("src/plain.ts"), "src/plain.ts");
    }

    #[test]
    fn merges_counts_across_sources() {
        let merged = merge_summaries([
            DiffSummary::from_files(vec![FileSummary {
                file: "a.ts".to_string(),
                insertions: 2,
                deletions: 1,
                binary: false,
            }]),
            DiffSummary::from_files(vec![
                FileSummary {
                    file: "b.png".to_string(),
                    insertions: 0,
                    deletions: 0,
                    binary: true,
                },
                FileSummary {
                    file: "a.ts".to_string(),
                    insertions: 3,
                    deletions: 0,
                    binary: false,
                },
            ]),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].file, "a.ts");
        assert_eq!((merged[0].insertions, merged[0].deletions), (5, 1));
        assert!(merged[1].binary);
    }

    #[test]
    fn binary_text_mismatch_keeps_text() {
        let binary = FileSummary {
            file: "data.bin".to_string(),
            insertions: 0,
            deletions: 0,
            binary: true,
        };
        let text = FileSummary {
            file: "data.bin".to_string(),
            insertions: 4,
            deletions: 0,
            binary: false,
        };

        let merged = merge_summaries([
            DiffSummary::from_files(vec![binary.clone()]),
            DiffSummary::from_files(vec![text.clone()]),
        ]);
        assert_eq!(merged, vec![text.clone()]);

        let merged = merge_summaries([
            DiffSummary::from_files(vec![text.clone()]),
            DiffSummary::from_files(vec![binary]),
        ]);
        assert_eq!(merged, vec![text]);
    }

    #[test]
    fn renamed_entries_merge_with_their_new_path() {
        let merged = merge_summaries([
            DiffSummary::from_files(vec![FileSummary {
                file: "src/{old => new}/a.ts".to_string(),
                insertions: 1,
                deletions: 0,
                binary: false,
            }]),
            DiffSummary::from_files(vec![FileSummary {
                file: "src/new/a.ts".to_string(),
                insertions: 1,
                deletions: 1,
                binary: false,
            }]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].file, "src/new/a.ts");
        assert_eq!((merged[0].insertions, merged[0].deletions), (2, 1));
    }

    #[tokio::test]
    async fn builds_text_and_binary_records() {
        let vcs = FakeVcs::new("/repo")
            .with_file(DiffSource::Unstaged, "src/index.ts", 3, 1)
            .with_binary(DiffSource::Staged, "logo.png")
            .with_diff(
                "src/index.ts",
                "@@ -1 +1 @@\n-a\n+b\n@@ -9,0 +10,2 @@\n+c\n+d\n@@ -20,3 +22,0 @@\n",
            );
        let vcs = Arc::new(vcs);
        let normalizer = ChangeNormalizer::new(vcs.clone(), PathStyle::Absolute, 4);

        let changes = normalizer.git_changes(&query(&[])).await.unwrap();

        assert_eq!(
            changes,
            vec![
                GitChange::Binary {
                    file_path: PathBuf::from("/repo/logo.png"),
                },
                text("/repo/src/index.ts", 3, 1, &[1, 10, 11]),
            ]
        );
        assert_eq!(*vcs.diff_requests.lock().unwrap(), vec!["src/index.ts".to_string()]);
    }

    #[tokio::test]
    async fn relative_paths_are_relative_to_cwd() {
        let vcs = FakeVcs::new("/repo")
            .with_file(DiffSource::Unstaged, "src/index.ts", 1, 0)
            .with_diff("src/index.ts", "@@ -0,0 +1 @@\n+x\n");
        let normalizer = ChangeNormalizer::new(Arc::new(vcs), PathStyle::Relative, 1);

        let mut request = query(&[]);
        request.cwd = PathBuf::from("/repo/src");
        let changes = normalizer.git_changes(&request).await.unwrap();

        assert_eq!(changes, vec![text("index.ts", 1, 0, &[1])]);
    }

    #[tokio::test]
    async fn overlapping_hunks_are_collapsed() {
        let vcs = FakeVcs::new("/repo")
            .with_file(DiffSource::SinceBase("HEAD".to_string()), "a.ts", 2, 0)
            .with_file(DiffSource::Unstaged, "a.ts", 1, 0)
            .with_diff("a.ts", "@@ -1,0 +2,2 @@\n+x\n+y\n@@ -1,0 +3 @@\n+y\n");
        let normalizer = ChangeNormalizer::new(Arc::new(vcs), PathStyle::Absolute, 2);

        let changes = normalizer.git_changes(&query(&[])).await.unwrap();
        assert_eq!(changes, vec![text("/repo/a.ts", 3, 0, &[2, 3])]);
    }

    #[tokio::test]
    async fn files_without_diff_content_are_dropped() {
        let vcs = FakeVcs::new("/repo").with_file(DiffSource::Unstaged, "mode-only.sh", 0, 0);
        let normalizer = ChangeNormalizer::new(Arc::new(vcs), PathStyle::Absolute, 2);

        assert!(normalizer.git_changes(&query(&[])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn specific_files_become_repo_relative_pathspecs() {
        let vcs = Arc::new(FakeVcs::new("/repo"));
        let normalizer = ChangeNormalizer::new(vcs.clone(), PathStyle::Absolute, 2);

        normalizer
            .git_changes(&query(&["src/a.ts", "/repo/b.ts"]))
            .await
            .unwrap();

        let pathspecs = vcs.pathspecs.lock().unwrap();
        assert_eq!(pathspecs.len(), 3);
        for spec in pathspecs.iter() {
            assert_eq!(spec, &vec!["src/a.ts".to_string(), "b.ts".to_string()]);
        }
    }

    #[tokio::test]
    async fn subdirectory_cwd_scopes_the_query() {
        let vcs = Arc::new(FakeVcs::new("/repo"));
        let normalizer = ChangeNormalizer::new(vcs.clone(), PathStyle::Absolute, 2);

        let mut request = query(&[]);
        request.cwd = PathBuf::from("/repo/packages/app");
        normalizer.git_changes(&request).await.unwrap();

        assert!(vcs
            .pathspecs
            .lock()
            .unwrap()
            .iter()
            .all(|spec| spec == &vec!["packages/app".to_string()]));
    }

    #[tokio::test]
    async fn file_outside_repository_is_a_vcs_error() {
        let normalizer =
            ChangeNormalizer::new(Arc::new(FakeVcs::new("/repo")), PathStyle::Absolute, 2);

        let err = normalizer
            .git_changes(&query(&["/elsewhere/a.ts"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Vcs(VcsError::PathOutsideRepository { .. })
        ));
    }

    #[tokio::test]
    async fn vcs_failures_propagate() {
        let vcs = FakeVcs::new("/repo").failing("fatal: bad revision 'nope'");
        let normalizer = ChangeNormalizer::new(Arc::new(vcs), PathStyle::Absolute, 2);

        let err = normalizer.git_changes(&query(&[])).await.unwrap_err();
        match err {
            Error::Vcs(VcsError::CommandFailed { stderr, .. }) => {
                assert_eq!(stderr, "fatal: bad revision 'nope'")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_hunk_header_is_a_parse_error() {
        let vcs = FakeVcs::new("/repo")
            .with_file(DiffSource::Unstaged, "a.ts", 1, 0)
            .with_diff("a.ts", "@@ broken @@\n");
        let normalizer = ChangeNormalizer::new(Arc::new(vcs), PathStyle::Absolute, 2);

        let err = normalizer.git_changes(&query(&[])).await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
