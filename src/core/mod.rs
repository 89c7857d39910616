pub mod categorize;
pub mod change;
pub mod fanout;
pub mod filter;
pub mod git;
pub mod git_cli;
pub mod hunk;
pub mod normalizer;
pub mod query;

#[cfg(test)]
pub(crate) mod testing;

pub use categorize::Categorizer;
pub use change::{
    CategorizedChange, CategorySet, ChangedLineSet, DiffCategory, GitChange, TextChange,
};
pub use filter::{filter_diffs, DiffFilter, ExcludeClause, FilterDiffOutput, RequireClause};
pub use git::{DiffSource, DiffSummary, FileSummary, Git2Backend, VcsBackend, VcsError};
pub use git_cli::GitCliBackend;
pub use hunk::{changed_lines_in_diff, parse_hunk_line_numbers, ParseError};
pub use normalizer::{ChangeNormalizer, ChangeQuery, PathStyle};
pub use query::{
    filter_to_diff_file_paths, get_filtered_diff, DiffQuery, FilteredDiffInputs, ResolvedDiffInputs,
};
