use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::filter::DiffFilter;
use crate::core::git::{Git2Backend, VcsBackend};
use crate::core::git_cli::GitCliBackend;
use crate::core::normalizer::PathStyle;
use crate::error::{Error, Result};

const CONFIG_FILE_NAMES: &[&str] = &[".difftriage.yml", ".difftriage.yaml"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_ref")]
    pub base_ref: String,

    #[serde(default)]
    pub path_style: PathStyle,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub filter: DiffFilter,
}

/// Which VCS collaborator answers diff queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// libgit2 through the `git2` crate.
    #[default]
    Git2,
    /// The `git` executable on `PATH`.
    Cli,
}

impl BackendKind {
    pub fn create(&self, cwd: &Path) -> Arc<dyn VcsBackend> {
        match self {
            BackendKind::Git2 => Arc::new(Git2Backend::new(cwd)),
            BackendKind::Cli => Arc::new(GitCliBackend::new(cwd)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_ref: default_base_ref(),
            path_style: PathStyle::default(),
            max_concurrency: default_max_concurrency(),
            backend: BackendKind::default(),
            filter: DiffFilter::default(),
        }
    }
}

impl Config {
    /// Loads `.difftriage.yml` (or `.yaml`) from `dir`, then from the home
    /// directory, falling back to defaults when neither exists.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut candidates: Vec<PathBuf> =
            CONFIG_FILE_NAMES.iter().map(|name| dir.join(name)).collect();
        if let Some(home_dir) = dirs::home_dir() {
            candidates.push(home_dir.join(CONFIG_FILE_NAMES[0]));
        }

        for config_path in candidates {
            if config_path.is_file() {
                return Self::from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content).map_err(|err| {
            Error::Configuration(format!("{}: {}", path.display(), err))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn merge_with_cli(
        &mut self,
        cli_base_ref: Option<String>,
        cli_filter: Option<DiffFilter>,
        cli_backend: Option<BackendKind>,
    ) {
        if let Some(base_ref) = cli_base_ref {
            self.base_ref = base_ref;
        }
        if let Some(filter) = cli_filter {
            self.filter = filter;
        }
        if let Some(backend) = cli_backend {
            self.backend = backend;
        }
    }

    pub fn normalize(&mut self) {
        if self.base_ref.trim().is_empty() {
            self.base_ref = default_base_ref();
        }
        self.max_concurrency = self.max_concurrency.max(1);
    }
}

fn default_base_ref() -> String {
    "HEAD".to_string()
}

fn default_max_concurrency() -> usize {
    8
}
