use serde::Serialize;
use thiserror::Error;

/// Why a command's output could not be interpreted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("cannot parse plan result")]
    UnrecognizedPlan,

    #[error("cannot parse apply result")]
    UnrecognizedApply,
}

/// A resource whose address changed between state and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedResource {
    pub before: String,
    pub after: String,
}

/// Structured view of one plan/apply output.
///
/// When `has_parse_error` is set every other text and list field is empty.
/// Otherwise `result` always holds the status line or the failure block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    /// Status line (pass) or error block (fail), trimmed
    pub result: String,
    /// "will perform the following actions" block
    pub changed_result: String,
    /// Drift detected outside the tool's own state
    pub outside_changes: String,
    /// Warning block
    pub warning: String,
    pub has_add_or_update_only: bool,
    pub has_destroy: bool,
    pub has_no_changes: bool,
    pub has_error: bool,
    pub has_parse_error: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub replaced: Vec<String>,
    pub imported: Vec<String>,
    pub moved: Vec<MovedResource>,
    /// Set only together with `has_parse_error`
    pub error: Option<ParseError>,
}

impl ParseResult {
    pub fn unparsable(error: ParseError) -> Self {
        Self {
            has_parse_error: true,
            error: Some(error),
            ..Self::default()
        }
    }

    /// Classify the result into the single outcome that drives labeling.
    ///
    /// Priority: add-or-update-only, destroy, no-changes, error.
    /// Unparsable output has no outcome.
    pub fn outcome(&self) -> Option<Outcome> {
        if self.has_parse_error {
            return None;
        }
        if self.has_add_or_update_only {
            Some(Outcome::AddOrUpdateOnly)
        } else if self.has_destroy {
            Some(Outcome::Destroy)
        } else if self.has_no_changes {
            Some(Outcome::NoChanges)
        } else if self.has_error {
            Some(Outcome::Error)
        } else {
            None
        }
    }
}

/// Mutually exclusive classification of a plan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    AddOrUpdateOnly,
    Destroy,
    NoChanges,
    Error,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::AddOrUpdateOnly => write!(f, "ADD OR UPDATE"),
            Outcome::Destroy => write!(f, "DESTROY"),
            Outcome::NoChanges => write!(f, "NO CHANGES"),
            Outcome::Error => write!(f, "ERROR"),
        }
    }
}
