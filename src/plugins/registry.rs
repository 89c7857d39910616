use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::plugins::builtin::TreeSitterClassifier;
use crate::plugins::LanguageClassifier;

/// Language classifiers keyed by lowercase file extension (without the dot).
#[derive(Default, Clone)]
pub struct ClassifierRegistry {
    by_extension: HashMap<String, Arc<dyn LanguageClassifier>>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TreeSitterClassifier::typescript()));
        registry.register(Arc::new(TreeSitterClassifier::tsx()));
        registry
    }

    /// Registers `classifier` for each of its extensions, replacing any
    /// classifier previously registered for them.
    pub fn register(&mut self, classifier: Arc<dyn LanguageClassifier>) {
        for extension in classifier.extensions() {
            debug!(
                extension = *extension,
                classifier = classifier.id(),
                "registering language classifier"
            );
            self.by_extension
                .insert(extension.to_lowercase(), classifier.clone());
        }
    }

    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn LanguageClassifier>> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        self.by_extension.get(&extension).cloned()
    }

    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }
}
