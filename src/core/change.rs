use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Semantic label attached to a classified file diff.
///
/// Variant order follows the serialized names alphabetically, so a
/// [`CategorySet`] always iterates in the same order it prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffCategory {
    /// Added lines.
    Additions,
    /// Binary file. Never combined with another category.
    Binary,
    /// Additions to the body of a file, as opposed to its imports.
    BodyAdditions,
    /// Deleted lines.
    Deletions,
    /// Changes to a file's import declarations.
    ImportChanges,
}

impl DiffCategory {
    pub const ALL: [DiffCategory; 5] = [
        DiffCategory::Additions,
        DiffCategory::Binary,
        DiffCategory::BodyAdditions,
        DiffCategory::Deletions,
        DiffCategory::ImportChanges,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiffCategory::Additions => "additions",
            DiffCategory::Binary => "binary",
            DiffCategory::BodyAdditions => "body-additions",
            DiffCategory::Deletions => "deletions",
            DiffCategory::ImportChanges => "import-changes",
        }
    }
}

impl fmt::Display for DiffCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiffCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        DiffCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = DiffCategory::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown diff category '{}' (expected one of {})", s, known.join(", "))
            })
    }
}

/// Sorted, duplicate-free set of categories. Comparisons are order-insensitive.
pub type CategorySet = BTreeSet<DiffCategory>;

/// Strictly increasing, 1-based line numbers on the current side of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangedLineSet(Vec<usize>);

impl ChangedLineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, line: usize) -> bool {
        self.0.binary_search(&line).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<usize> for ChangedLineSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let lines: BTreeSet<usize> = iter.into_iter().filter(|line| *line > 0).collect();
        Self(lines.into_iter().collect())
    }
}

/// Change record for a text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub file_path: PathBuf,
    pub additions: usize,
    pub deletions: usize,
    pub changed_line_numbers: ChangedLineSet,
}

/// One file's change between the base reference and the working state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitChange {
    Binary { file_path: PathBuf },
    Text(TextChange),
}

impl GitChange {
    pub fn file_path(&self) -> &Path {
        match self {
            GitChange::Binary { file_path } => file_path,
            GitChange::Text(text) => &text.file_path,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, GitChange::Binary { .. })
    }
}

impl Serialize for GitChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            GitChange::Binary { file_path } => {
                let mut state = serializer.serialize_struct("GitChange", 2)?;
                state.serialize_field("file_path", file_path)?;
                state.serialize_field("binary", &true)?;
                state.end()
            }
            GitChange::Text(text) => {
                let mut state = serializer.serialize_struct("GitChange", 5)?;
                state.serialize_field("file_path", &text.file_path)?;
                state.serialize_field("binary", &false)?;
                state.serialize_field("additions", &text.additions)?;
                state.serialize_field("deletions", &text.deletions)?;
                state.serialize_field("changed_line_numbers", &text.changed_line_numbers)?;
                state.end()
            }
        }
    }
}

/// A change together with the categories computed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorizedChange {
    #[serde(flatten)]
    pub change: GitChange,
    pub categories: CategorySet,
}

impl CategorizedChange {
    pub fn file_path(&self) -> &Path {
        self.change.file_path()
    }
}
