use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::types::{ParseError, ParseResult};
use super::{failure_block, Parser, FAIL};

static PASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Apply complete!").expect("invalid pass regex"));

/// Parser for `terraform apply` / `tofu apply` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyParser;

impl ApplyParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for ApplyParser {
    fn parse(&self, body: &str) -> ParseResult {
        let lines: Vec<&str> = body.split('\n').collect();
        let first_match = lines
            .iter()
            .position(|line| PASS.is_match(line) || FAIL.is_match(line));

        let Some(index) = first_match else {
            debug!("apply output matches neither pass nor fail signature");
            return ParseResult::unparsable(ParseError::UnrecognizedApply);
        };

        let has_error = FAIL.is_match(lines[index]);
        let result = if has_error {
            failure_block(&lines, index)
        } else {
            lines[index].trim().to_string()
        };
        debug!(line = index, has_error, "parsed apply output");

        ParseResult {
            result,
            has_error,
            ..ParseResult::default()
        }
    }
}
