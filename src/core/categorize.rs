use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::change::{CategorySet, ChangedLineSet, DiffCategory, GitChange, TextChange};
use crate::core::fanout::map_bounded;
use crate::error::{Error, Result};
use crate::plugins::{ClassifierRegistry, LanguageClassifier};

/// Computes category sets for changes, one file per task.
pub struct Categorizer {
    registry: Arc<ClassifierRegistry>,
    /// Directory relative change paths are resolved against.
    source_root: PathBuf,
    max_concurrency: usize,
}

impl Categorizer {
    pub fn new(
        registry: Arc<ClassifierRegistry>,
        source_root: impl Into<PathBuf>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            source_root: source_root.into(),
            max_concurrency,
        }
    }

    /// Returns one category set per change, in input order.
    #[instrument(skip_all, fields(changes = changes.len()))]
    pub async fn categorize_changes(&self, changes: &[GitChange]) -> Result<Vec<CategorySet>> {
        let registry = self.registry.clone();
        let source_root = self.source_root.clone();

        let categories = map_bounded(changes.to_vec(), self.max_concurrency, move |change| {
            let classifier = registry.for_path(change.file_path());
            let source_path = source_root.join(change.file_path());
            async move { categorize_change(&change, classifier, &source_path).await }
        })
        .await?;

        Ok(categories)
    }
}

/// Categories of a single change.
///
/// Structural categories come from the counts; the rest from the registered
/// language classifier, or the body-addition default when there is none.
pub async fn categorize_change(
    change: &GitChange,
    classifier: Option<Arc<dyn LanguageClassifier>>,
    source_path: &Path,
) -> CategorySet {
    let text = match change {
        GitChange::Binary { .. } => return [DiffCategory::Binary].into_iter().collect(),
        GitChange::Text(text) => text,
    };

    let mut categories = structural_categories(text);

    match classifier {
        Some(classifier) => {
            match language_categories(text, classifier.clone(), source_path).await {
                Ok(found) => categories.extend(found),
                Err(err @ Error::MissingSource { .. }) => warn!("{}", err),
                Err(err) => warn!(
                    classifier = classifier.id(),
                    file = %text.file_path.display(),
                    "{}",
                    err
                ),
            }
        }
        None => {
            if categories.contains(&DiffCategory::Additions) {
                categories.insert(DiffCategory::BodyAdditions);
            }
        }
    }

    debug!(file = %text.file_path.display(), ?categories, "categorized change");
    categories
}

fn structural_categories(text: &TextChange) -> CategorySet {
    let mut categories = CategorySet::new();
    if text.deletions > 0 {
        categories.insert(DiffCategory::Deletions);
    }
    if text.additions > 0 {
        categories.insert(DiffCategory::Additions);
    }
    categories
}

async fn language_categories(
    text: &TextChange,
    classifier: Arc<dyn LanguageClassifier>,
    source_path: &Path,
) -> Result<CategorySet> {
    let source = tokio::fs::read_to_string(source_path)
        .await
        .map_err(|source| Error::MissingSource {
            path: source_path.to_path_buf(),
            source,
        })?;

    let lines = non_blank_lines(&source, &text.changed_line_numbers);
    if lines.is_empty() {
        return Ok(CategorySet::new());
    }

    tokio::task::spawn_blocking(move || classifier.classify(&source, &lines))
        .await?
        .map_err(Error::Classifier)
}

/// Changed lines that exist in `source` and hold something besides whitespace.
pub fn non_blank_lines(source: &str, changed: &ChangedLineSet) -> Vec<usize> {
    let file_lines: Vec<&str> = source.split('\n').collect();
    changed
        .iter()
        .filter(|line| {
            file_lines
                .get(line - 1)
                .is_some_and(|content| !content.trim().is_empty())
        })
        .collect()
}
