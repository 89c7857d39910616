pub mod builtin;
pub mod language_classifier;
pub mod registry;

pub use language_classifier::LanguageClassifier;
pub use registry::ClassifierRegistry;
