use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::categorize::Categorizer;
use crate::core::change::{CategorizedChange, CategorySet, DiffCategory, GitChange};
use crate::error::{Error, Result};

/// Exclusion clause of a [`DiffFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClause", into = "RawClause")]
pub enum ExcludeClause {
    /// Exclude changes whose categories equal this set.
    Exactly(CategorySet),
    /// Exclude changes sharing any category with this set.
    Contains(CategorySet),
}

/// Requirement clause of a [`DiffFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClause", into = "RawClause")]
pub enum RequireClause {
    /// Keep only changes whose categories equal this set.
    Exactly(CategorySet),
    /// Keep only changes carrying at least every category in this set.
    AtLeast(CategorySet),
}

/// Inclusion/exclusion policy over category sets. A change must pass both
/// clauses to be included; binary changes are never included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ExcludeClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require: Option<RequireClause>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterDiffOutput {
    pub included: Vec<CategorizedChange>,
    pub excluded: Vec<CategorizedChange>,
}

/// Wire shape of a clause before the single sub-mode is enforced.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exactly: Option<Vec<DiffCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    at_least: Option<Vec<DiffCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contains: Option<Vec<DiffCategory>>,
}

impl RawClause {
    fn single_mode(self, clause: &str, allowed: &str) -> Result<(&'static str, CategorySet)> {
        let mut populated: Vec<(&'static str, Vec<DiffCategory>)> = Vec::new();
        if let Some(categories) = self.exactly {
            populated.push(("exactly", categories));
        }
        if let Some(categories) = self.at_least {
            populated.push(("at_least", categories));
        }
        if let Some(categories) = self.contains {
            populated.push(("contains", categories));
        }

        if populated.len() != 1 {
            let names: Vec<&str> = populated.iter().map(|(name, _)| *name).collect();
            return Err(Error::Configuration(format!(
                "{} clause must set exactly one of {}, found [{}]",
                clause,
                allowed,
                names.join(", ")
            )));
        }

        let (mode, categories) = populated.remove(0);
        Ok((mode, categories.into_iter().collect()))
    }
}

impl TryFrom<RawClause> for ExcludeClause {
    type Error = Error;

    fn try_from(raw: RawClause) -> Result<Self> {
        match raw.single_mode("exclude", "exactly/contains")? {
            ("exactly", categories) => Ok(ExcludeClause::Exactly(categories)),
            ("contains", categories) => Ok(ExcludeClause::Contains(categories)),
            (mode, _) => Err(Error::Configuration(format!(
                "exclude clause does not support {}",
                mode
            ))),
        }
    }
}

impl TryFrom<RawClause> for RequireClause {
    type Error = Error;

    fn try_from(raw: RawClause) -> Result<Self> {
        match raw.single_mode("require", "exactly/at_least")? {
            ("exactly", categories) => Ok(RequireClause::Exactly(categories)),
            ("at_least", categories) => Ok(RequireClause::AtLeast(categories)),
            (mode, _) => Err(Error::Configuration(format!(
                "require clause does not support {}",
                mode
            ))),
        }
    }
}

impl From<ExcludeClause> for RawClause {
    fn from(clause: ExcludeClause) -> Self {
        match clause {
            ExcludeClause::Exactly(set) => RawClause {
                exactly: Some(set.into_iter().collect()),
                ..RawClause::default()
            },
            ExcludeClause::Contains(set) => RawClause {
                contains: Some(set.into_iter().collect()),
                ..RawClause::default()
            },
        }
    }
}

impl From<RequireClause> for RawClause {
    fn from(clause: RequireClause) -> Self {
        match clause {
            RequireClause::Exactly(set) => RawClause {
                exactly: Some(set.into_iter().collect()),
                ..RawClause::default()
            },
            RequireClause::AtLeast(set) => RawClause {
                at_least: Some(set.into_iter().collect()),
                ..RawClause::default()
            },
        }
    }
}

impl ExcludeClause {
    pub fn excludes(&self, categories: &CategorySet) -> bool {
        match self {
            ExcludeClause::Exactly(set) => categories == set,
            ExcludeClause::Contains(set) => !categories.is_disjoint(set),
        }
    }
}

impl RequireClause {
    pub fn accepts(&self, categories: &CategorySet) -> bool {
        match self {
            RequireClause::Exactly(set) => categories == set,
            RequireClause::AtLeast(set) => set.is_subset(categories),
        }
    }
}

impl DiffFilter {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|err| Error::Configuration(err.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::Configuration(err.to_string()))
    }

    pub fn should_include(&self, change: &GitChange, categories: &CategorySet) -> bool {
        if change.is_binary() {
            return false;
        }
        if let Some(exclude) = &self.exclude {
            if exclude.excludes(categories) {
                return false;
            }
        }
        if let Some(require) = &self.require {
            if !require.accepts(categories) {
                return false;
            }
        }
        true
    }

    /// Stable partition of `changes` by their precomputed `categories`.
    pub fn partition(
        &self,
        changes: Vec<GitChange>,
        categories: Vec<CategorySet>,
    ) -> Result<FilterDiffOutput> {
        let expected = changes.len();
        let computed = categories.len();
        let mut category_sets = categories.into_iter();
        let mut output = FilterDiffOutput::default();

        for (index, change) in changes.into_iter().enumerate() {
            let Some(categories) = category_sets.next() else {
                return Err(Error::InternalConsistency {
                    index,
                    file: change.file_path().to_path_buf(),
                    computed,
                    expected,
                });
            };

            let include = self.should_include(&change, &categories);
            let categorized = CategorizedChange { change, categories };
            if include {
                output.included.push(categorized);
            } else {
                output.excluded.push(categorized);
            }
        }

        Ok(output)
    }
}

/// Categorizes `changes` and partitions them with `filter`.
pub async fn filter_diffs(
    filter: &DiffFilter,
    changes: Vec<GitChange>,
    categorizer: &Categorizer,
) -> Result<FilterDiffOutput> {
    let categories = categorizer.categorize_changes(&changes).await?;
    let output = filter.partition(changes, categories)?;
    info!(
        included = output.included.len(),
        excluded = output.excluded.len(),
        "filtered diffs"
    );
    Ok(output)
}
