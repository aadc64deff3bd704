use std::collections::BTreeMap;
use thiserror::Error;

use crate::github::ApiError;
use crate::terraform::Outcome;

/// Where a notification is posted.
///
/// `number == 0` means no pull request is known yet and the comment is
/// addressed by commit instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestRef {
    pub revision: String,
    pub number: u64,
}

impl PullRequestRef {
    pub fn has_number(&self) -> bool {
        self.number != 0
    }
}

/// Addressing for a newly created comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostTarget {
    PullRequest(u64),
    Commit(String),
}

/// Read-only view of a comment already posted on a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub is_minimized: bool,
}

/// A label as the remote system reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub color: String,
}

/// Desired label for one outcome. An empty name means no label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    pub color: String,
}

/// Labels for the four plan outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultLabels {
    pub add_or_update_only: LabelSpec,
    pub destroy: LabelSpec,
    pub no_changes: LabelSpec,
    pub plan_error: LabelSpec,
}

impl ResultLabels {
    pub fn has_any_label(&self) -> bool {
        self.all().iter().any(|spec| !spec.name.is_empty())
    }

    /// The label to apply for an outcome, if one is configured.
    pub fn for_outcome(&self, outcome: Option<Outcome>) -> Option<&LabelSpec> {
        let spec = match outcome? {
            Outcome::AddOrUpdateOnly => &self.add_or_update_only,
            Outcome::Destroy => &self.destroy,
            Outcome::NoChanges => &self.no_changes,
            Outcome::Error => &self.plan_error,
        };
        (!spec.name.is_empty()).then_some(spec)
    }

    pub fn is_outcome_label(&self, name: &str) -> bool {
        self.all().iter().any(|spec| !spec.name.is_empty() && spec.name == name)
    }

    fn all(&self) -> [&LabelSpec; 4] {
        [
            &self.add_or_update_only,
            &self.destroy,
            &self.no_changes,
            &self.plan_error,
        ]
    }
}

/// A problem that did not stop the notification but is shown in the comment.
#[derive(Debug, Error)]
pub enum Warning {
    #[error("failed to list labels of pull request #{number}: {source}")]
    ListLabels { number: u64, source: ApiError },

    #[error("failed to add label {name}: {source}")]
    AddLabel { name: String, source: ApiError },

    #[error("failed to remove label {name}: {source}")]
    RemoveLabel { name: String, source: ApiError },

    #[error("failed to update label color (name: {name}, color: {color}): {source}")]
    UpdateLabelColor {
        name: String,
        color: String,
        source: ApiError,
    },

    #[error("label name is too long (max: {max}): {name}")]
    LabelTooLong { name: String, max: usize },
}

/// Failures that prevent a notification from being delivered.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to render comment: {0}")]
    Render(#[from] crate::report::RenderError),

    #[error("Failed to embed comment metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Failed to create comment: {0}")]
    Create(#[source] ApiError),

    #[error("Failed to update comment {id}: {source}")]
    Patch { id: u64, source: ApiError },

    #[error("Neither a pull request number nor a commit SHA is known")]
    MissingTarget,
}

/// What happened to the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Created,
    Patched(u64),
    /// An identical comment is already posted
    Unchanged(u64),
    /// No changes and skipping is enabled
    Skipped,
    /// The output had no status line worth reporting
    NothingToReport,
}

impl std::fmt::Display for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Created => write!(f, "comment created"),
            Delivery::Patched(id) => write!(f, "comment {id} updated"),
            Delivery::Unchanged(id) => write!(f, "comment {id} already up to date"),
            Delivery::Skipped => write!(f, "skipped, no changes"),
            Delivery::NothingToReport => write!(f, "nothing to report"),
        }
    }
}

/// Everything the lifecycle manager needs besides the ports.
#[derive(Debug, Clone, Default)]
pub struct NotifyOptions {
    pub pull_request: PullRequestRef,
    /// Distinguishes notifications of several root modules on one pull request
    pub target: String,
    pub vars: BTreeMap<String, String>,
    /// CI run URL shown in the comment
    pub link: String,
    /// CI-specific identifying fields embedded in the trailer
    pub ci_metadata: BTreeMap<String, String>,
    pub patch: bool,
    pub skip_no_changes: bool,
    pub disable_label: bool,
    pub labels: ResultLabels,
    /// Upstream AI summary, rendered only when non-empty and enabled
    pub summary: Option<String>,
    pub summary_enabled: bool,
}
