use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::Config;
use crate::core::categorize::Categorizer;
use crate::core::filter::{filter_diffs, DiffFilter, FilterDiffOutput};
use crate::core::git::VcsBackend;
use crate::core::normalizer::{ChangeNormalizer, ChangeQuery};
use crate::error::Result;
use crate::plugins::ClassifierRegistry;

/// Caller-supplied query options. Unset fields fall back to defaults in
/// [`FilteredDiffInputs::resolve`].
#[derive(Debug, Clone, Default)]
pub struct FilteredDiffInputs {
    pub cwd: Option<PathBuf>,
    pub specific_files: Option<Vec<PathBuf>>,
    pub base_ref: Option<String>,
    pub filter: DiffFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDiffInputs {
    pub cwd: PathBuf,
    pub specific_files: Vec<PathBuf>,
    pub base_ref: String,
    pub filter: DiffFilter,
}

impl FilteredDiffInputs {
    pub fn new(filter: DiffFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_base_ref(mut self, base_ref: impl Into<String>) -> Self {
        self.base_ref = Some(base_ref.into());
        self
    }

    pub fn with_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.specific_files = Some(files.into_iter().map(Into::into).collect());
        self
    }

    /// Fills in the process working directory, `HEAD` and "all files".
    pub fn resolve(self) -> Result<ResolvedDiffInputs> {
        self.resolve_with_base("HEAD")
    }

    fn resolve_with_base(self, default_base: &str) -> Result<ResolvedDiffInputs> {
        let cwd = match self.cwd {
            Some(cwd) => cwd,
            None => std::env::current_dir()?,
        };
        let base_ref = self
            .base_ref
            .filter(|base_ref| !base_ref.trim().is_empty())
            .unwrap_or_else(|| default_base.to_string());

        Ok(ResolvedDiffInputs {
            cwd,
            specific_files: self.specific_files.unwrap_or_default(),
            base_ref,
            filter: self.filter,
        })
    }
}

/// End-to-end pipeline: normalize, categorize, partition.
pub struct DiffQuery {
    config: Config,
    registry: Arc<ClassifierRegistry>,
    backend: Option<Arc<dyn VcsBackend>>,
}

impl DiffQuery {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(ClassifierRegistry::with_builtin()),
            backend: None,
        }
    }

    pub fn with_registry(mut self, registry: ClassifierRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Uses `backend` instead of one built from the configured kind.
    pub fn with_backend(mut self, backend: Arc<dyn VcsBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[instrument(skip_all)]
    pub async fn get_filtered_diff(&self, inputs: FilteredDiffInputs) -> Result<FilterDiffOutput> {
        let inputs = inputs.resolve_with_base(&self.config.base_ref)?;
        info!(
            base_ref = %inputs.base_ref,
            cwd = %inputs.cwd.display(),
            files = inputs.specific_files.len(),
            "querying changes"
        );

        let backend = match &self.backend {
            Some(backend) => backend.clone(),
            None => self.config.backend.create(&inputs.cwd),
        };
        let max_concurrency = self.config.max_concurrency.max(1);

        let normalizer = ChangeNormalizer::new(backend, self.config.path_style, max_concurrency);
        let changes = normalizer
            .git_changes(&ChangeQuery {
                base_ref: inputs.base_ref,
                cwd: inputs.cwd.clone(),
                specific_files: inputs.specific_files,
            })
            .await?;

        let categorizer = Categorizer::new(self.registry.clone(), inputs.cwd, max_concurrency);
        filter_diffs(&inputs.filter, changes, &categorizer).await
    }

    /// File paths of the included changes, in pipeline order.
    pub async fn filter_to_diff_file_paths(
        &self,
        inputs: FilteredDiffInputs,
    ) -> Result<Vec<PathBuf>> {
        let output = self.get_filtered_diff(inputs).await?;
        Ok(output
            .included
            .into_iter()
            .map(|change| change.file_path().to_path_buf())
            .collect())
    }
}

/// Runs the pipeline with the default configuration.
pub async fn get_filtered_diff(inputs: FilteredDiffInputs) -> Result<FilterDiffOutput> {
    DiffQuery::new(Config::default()).get_filtered_diff(inputs).await
}

pub async fn filter_to_diff_file_paths(inputs: FilteredDiffInputs) -> Result<Vec<PathBuf>> {
    DiffQuery::new(Config::default())
        .filter_to_diff_file_paths(inputs)
        .await
}
