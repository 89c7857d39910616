use anyhow::Result;

use crate::core::CategorySet;

/// Maps changed lines of one language's source text onto categories.
///
/// `lines` are 1-based, ascending, and already exclude blank lines.
pub trait LanguageClassifier: Send + Sync {
    fn id(&self) -> &str;
    fn extensions(&self) -> &[&'static str];
    fn classify(&self, source: &str, lines: &[usize]) -> Result<CategorySet>;
}
