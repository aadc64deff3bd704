pub mod apply;
pub mod plan;
pub mod types;

pub use apply::ApplyParser;
pub use plan::PlanParser;
pub use types::{MovedResource, Outcome, ParseError, ParseResult};

use regex::Regex;
use std::sync::LazyLock;

/// Interprets the combined output of one terraform/opentofu command.
///
/// Implementations never fail: unrecognized output is reported through
/// `ParseResult::has_parse_error`.
pub trait Parser: Send + Sync {
    fn parse(&self, body: &str) -> ParseResult;
}

/// `Error: ` at line start, optionally inside a diagnostic box.
pub(crate) static FAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(│ |\| )?Error: ").expect("invalid fail regex"));

/// Glyphs terraform draws in front of diagnostic lines, stripped in this order.
const BAR_PREFIXES: [&str; 3] = ["│ ", "│", "| "];

/// Remove at most one leading occurrence of each diagnostic bar glyph.
pub(crate) fn strip_bars(line: &str) -> &str {
    BAR_PREFIXES
        .iter()
        .fold(line, |acc, bar| acc.strip_prefix(bar).unwrap_or(acc))
}

/// Join lines back into a block, dropping the empty line a final newline leaves behind.
pub(crate) fn join_lines<'a, I>(lines: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut collected: Vec<&str> = lines.into_iter().collect();
    if collected.last() == Some(&"") {
        collected.pop();
    }
    collected.join("\n")
}

/// The failure block: first error line through end of body, bars stripped.
pub(crate) fn failure_block(lines: &[&str], from: usize) -> String {
    join_lines(lines[from..].iter().map(|line| strip_bars(line)))
        .trim()
        .to_string()
}
