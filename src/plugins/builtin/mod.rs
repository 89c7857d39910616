mod syntax;

pub use syntax::{node_kinds_by_line, TreeSitterClassifier};
