use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static HUNK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@@\s+-\d+(?:,\d+)?\s+\+(\d+)(?:,(\d+))?\s+@@").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
#[error("failed to parse diff hunk header '{line}'")]
pub struct ParseError {
    pub line: String,
}

impl ParseError {
    fn new(line: &str) -> Self {
        Self {
            line: line.to_string(),
        }
    }
}

/// Returns the new-side line numbers covered by a unified diff hunk header.
///
/// `@@ -3,2 +7,4 @@` yields `[7, 8, 9, 10]`; a missing count means one line
/// and a count of zero (a pure deletion) yields nothing.
pub fn parse_hunk_line_numbers(header: &str) -> Result<Vec<usize>, ParseError> {
    let caps = HUNK_HEADER
        .captures(header)
        .ok_or_else(|| ParseError::new(header))?;

    let start: usize = caps[1].parse().map_err(|_| ParseError::new(header))?;
    let count: usize = match caps.get(2) {
        Some(m) => m.as_str().parse().map_err(|_| ParseError::new(header))?,
        None => 1,
    };

    let end = start
        .checked_add(count)
        .ok_or_else(|| ParseError::new(header))?;

    Ok((start..end).collect())
}

/// Scans raw diff text and unions the line numbers of every hunk header in it.
pub fn changed_lines_in_diff(diff_text: &str) -> Result<Vec<usize>, ParseError> {
    let mut lines = Vec::new();
    for header in diff_text.lines().filter(|line| line.starts_with("@@")) {
        lines.extend(parse_hunk_line_numbers(header)?);
    }
    Ok(lines)
}
