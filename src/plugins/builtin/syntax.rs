use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use tree_sitter::{Language, Node, Parser};

use crate::core::{CategorySet, DiffCategory};
use crate::plugins::LanguageClassifier;

/// Classifies changed lines by the tree-sitter nodes that cover them.
///
/// A line covered by one of `import_kinds` is an import change; a line
/// covered by any other node is a body addition. The root node and comments
/// never cover a line.
pub struct TreeSitterClassifier {
    id: &'static str,
    language: Language,
    extensions: &'static [&'static str],
    import_kinds: &'static [&'static str],
}

impl TreeSitterClassifier {
    pub fn new(
        id: &'static str,
        language: Language,
        extensions: &'static [&'static str],
        import_kinds: &'static [&'static str],
    ) -> Self {
        Self {
            id,
            language,
            extensions,
            import_kinds,
        }
    }

    pub fn typescript() -> Self {
        Self::new(
            "typescript",
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            &["ts"],
            &["import_statement", "import_alias"],
        )
    }

    pub fn tsx() -> Self {
        Self::new(
            "tsx",
            tree_sitter_typescript::LANGUAGE_TSX.into(),
            &["tsx"],
            &["import_statement", "import_alias"],
        )
    }
}

impl LanguageClassifier for TreeSitterClassifier {
    fn id(&self) -> &str {
        self.id
    }

    fn extensions(&self) -> &[&'static str] {
        self.extensions
    }

    fn classify(&self, source: &str, lines: &[usize]) -> Result<CategorySet> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("failed to set language")?;
        let tree = parser.parse(source, None).context("parse returned None")?;

        let mut categories = CategorySet::new();
        for kinds in node_kinds_by_line(tree.root_node(), lines).values() {
            if kinds.iter().any(|kind| self.import_kinds.contains(kind)) {
                categories.insert(DiffCategory::ImportChanges);
            } else if !kinds.is_empty() {
                categories.insert(DiffCategory::BodyAdditions);
            }
        }
        Ok(categories)
    }
}

/// Kinds of every node covering each of `lines` (sorted, 1-based),
/// excluding `root` and comment trivia. Lines nothing covers are absent.
pub fn node_kinds_by_line(
    root: Node<'_>,
    lines: &[usize],
) -> BTreeMap<usize, BTreeSet<&'static str>> {
    let mut kinds_by_line: BTreeMap<usize, BTreeSet<&'static str>> = BTreeMap::new();
    let mut cursor = root.walk();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.is_extra() || node.kind() == "comment" {
            continue;
        }

        let (start, end) = line_span(&node);
        let first = lines.partition_point(|line| *line < start);
        let covered: Vec<usize> = lines[first..]
            .iter()
            .copied()
            .take_while(|line| *line <= end)
            .collect();
        if covered.is_empty() {
            continue;
        }

        if node.id() != root.id() {
            for line in covered {
                kinds_by_line.entry(line).or_default().insert(node.kind());
            }
        }

        stack.extend(node.children(&mut cursor));
    }

    kinds_by_line
}

/// Inclusive 1-based line span. A node ending at column 0 ends on the
/// previous line.
fn line_span(node: &Node<'_>) -> (usize, usize) {
    let start = node.start_position();
    let end = node.end_position();
    let end_line = if end.column == 0 && end.row > start.row {
        end.row
    } else {
        end.row + 1
    };
    (start.row + 1, end_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(source: &str, lines: &[usize]) -> CategorySet {
        TreeSitterClassifier::typescript()
            .classify(source, lines)
            .unwrap()
    }

    fn set(categories: &[DiffCategory]) -> CategorySet {
        categories.iter().copied().collect()
    }

    const SOURCE: &str = "\
import {
    thing,
    thing2,
} from '..';

// helper
export function add(a: number, b: number): number {
    return a + b;
}
";

    #[test]
    fn multi_line_import_is_an_import_change() {
        assert_eq!(classify(SOURCE, &[1, 2, 3, 4]), set(&[DiffCategory::ImportChanges]));
        assert_eq!(classify(SOURCE, &[3]), set(&[DiffCategory::ImportChanges]));
    }

    #[test]
    fn function_body_is_a_body_addition() {
        assert_eq!(classify(SOURCE, &[8]), set(&[DiffCategory::BodyAdditions]));
        assert_eq!(classify(SOURCE, &[7, 8, 9]), set(&[DiffCategory::BodyAdditions]));
    }

    #[test]
    fn mixed_lines_carry_both_categories() {
        assert_eq!(
            classify(SOURCE, &[2, 8]),
            set(&[DiffCategory::BodyAdditions, DiffCategory::ImportChanges])
        );
    }

    #[test]
    fn comments_and_uncovered_lines_contribute_nothing() {
        assert!(classify(SOURCE, &[5, 6]).is_empty());
        assert!(classify(SOURCE, &[42]).is_empty());
        assert!(classify(SOURCE, &[]).is_empty());
    }

    #[test]
    fn reports_kinds_per_line_without_root() {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .unwrap();
        let tree = parser.parse(SOURCE, None).unwrap();

        let kinds = node_kinds_by_line(tree.root_node(), &[1, 6, 8]);
        assert!(kinds[&1].contains("import_statement"));
        assert!(kinds[&8].contains("return_statement"));
        assert!(!kinds[&8].contains("program"));
        assert!(!kinds.contains_key(&6));
    }

    #[test]
    fn tsx_parses_jsx_bodies() {
        let source = "import React from 'react';\n\nexport const App = () => <div>hi</div>;\n";
        let categories = TreeSitterClassifier::tsx().classify(source, &[1, 3]).unwrap();
        assert_eq!(
            categories,
            set(&[DiffCategory::BodyAdditions, DiffCategory::ImportChanges])
        );
    }
}
