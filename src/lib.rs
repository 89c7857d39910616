pub mod config;
pub mod core;
pub mod error;
pub mod plugins;

pub use crate::config::{BackendKind, Config};
pub use crate::core::{
    filter_to_diff_file_paths, get_filtered_diff, CategorizedChange, CategorySet, DiffCategory,
    DiffFilter, DiffQuery, ExcludeClause, FilterDiffOutput, FilteredDiffInputs, GitChange,
    PathStyle, RequireClause, TextChange,
};
pub use crate::error::{Error, Result};
