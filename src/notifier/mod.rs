#[cfg(test)]
pub(crate) mod fakes;
pub mod label;
pub mod metadata;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::exec::ExecOutput;
use crate::github::ApiError;
use crate::mask::Masker;
use crate::report::{
    RenderContext, Renderer, APPLY_PARSE_ERROR_TEMPLATE, APPLY_TEMPLATE,
    PLAN_PARSE_ERROR_TEMPLATE, PLAN_TEMPLATE,
};
use crate::terraform::{ApplyParser, ParseResult, Parser, PlanParser};
use metadata::Metadata;
use types::{
    Comment, Delivery, Label, NotifyError, NotifyOptions, PostTarget, PullRequestRef, Warning,
};

/// Comment operations on the hosting service.
#[async_trait]
pub trait CommentApi: Send + Sync {
    /// Every comment on a pull request, oldest first.
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, ApiError>;
    async fn create_comment(&self, body: &str, target: &PostTarget) -> Result<(), ApiError>;
    async fn patch_comment(&self, id: u64, body: &str) -> Result<(), ApiError>;
    /// Pull requests whose head contains `revision`.
    async fn pull_requests_for_commit(&self, revision: &str) -> Result<Vec<u64>, ApiError>;
}

/// Label operations on the hosting service.
#[async_trait]
pub trait LabelApi: Send + Sync {
    async fn list_labels(&self, number: u64) -> Result<Vec<Label>, ApiError>;
    /// Returns the labels on the pull request after the addition.
    async fn add_labels(&self, number: u64, names: &[String]) -> Result<Vec<Label>, ApiError>;
    async fn remove_label(&self, number: u64, name: &str) -> Result<(), ApiError>;
    async fn update_label_color(&self, name: &str, color: &str) -> Result<(), ApiError>;
}

/// Result of one notification run.
#[derive(Debug)]
pub struct Notification {
    pub parsed: ParseResult,
    pub delivery: Delivery,
}

/// Turns command output into a pull request comment and keeps it up to date.
pub struct Notifier {
    comments: Arc<dyn CommentApi>,
    labels: Arc<dyn LabelApi>,
    renderer: Renderer,
    masker: Masker,
    options: NotifyOptions,
}

impl Notifier {
    pub fn new(
        comments: Arc<dyn CommentApi>,
        labels: Arc<dyn LabelApi>,
        renderer: Renderer,
        masker: Masker,
        options: NotifyOptions,
    ) -> Self {
        Self {
            comments,
            labels,
            renderer,
            masker,
            options,
        }
    }

    #[instrument(skip_all, fields(target = %self.options.target))]
    pub async fn plan(&self, output: &ExecOutput) -> Result<Notification, NotifyError> {
        let pull_request = self.resolve_pull_request().await;
        let parsed = PlanParser::new().parse(&output.combined_output);

        let template = if parsed.has_parse_error {
            warn!("plan output could not be parsed");
            PLAN_PARSE_ERROR_TEMPLATE
        } else if parsed.result.is_empty() {
            return Ok(Notification {
                parsed,
                delivery: Delivery::NothingToReport,
            });
        } else {
            PLAN_TEMPLATE
        };

        let mut warnings = Vec::new();
        if pull_request.has_number()
            && !self.options.disable_label
            && self.options.labels.has_any_label()
        {
            warnings = label::update_labels(
                self.labels.as_ref(),
                parsed.outcome(),
                &self.options.labels,
                pull_request.number,
            )
            .await;
        }

        let body = self.compose("plan", template, output, &parsed, &warnings, &pull_request)?;

        if self.options.patch && pull_request.has_number() {
            match self.comments.list_comments(pull_request.number).await {
                Ok(comments) => {
                    if let Some(existing) = self.find_previous(&comments) {
                        if existing.body == body {
                            info!(id = existing.id, "comment is already up to date");
                            return Ok(Notification {
                                parsed,
                                delivery: Delivery::Unchanged(existing.id),
                            });
                        }
                        self.comments
                            .patch_comment(existing.id, &body)
                            .await
                            .map_err(|source| NotifyError::Patch {
                                id: existing.id,
                                source,
                            })?;
                        info!(id = existing.id, "comment updated");
                        return Ok(Notification {
                            parsed,
                            delivery: Delivery::Patched(existing.id),
                        });
                    }
                    debug!("no previous comment to update");
                }
                Err(e) => warn!(error = %e, "failed to list comments, creating a new one"),
            }
        }

        if parsed.has_no_changes
            && parsed.warning.is_empty()
            && warnings.is_empty()
            && self.options.skip_no_changes
        {
            info!("no changes, skipping comment");
            return Ok(Notification {
                parsed,
                delivery: Delivery::Skipped,
            });
        }

        self.create(&body, &pull_request).await?;
        Ok(Notification {
            parsed,
            delivery: Delivery::Created,
        })
    }

    #[instrument(skip_all, fields(target = %self.options.target))]
    pub async fn apply(&self, output: &ExecOutput) -> Result<Notification, NotifyError> {
        let pull_request = self.resolve_pull_request().await;
        let parsed = ApplyParser::new().parse(&output.combined_output);

        let template = if parsed.has_parse_error {
            warn!("apply output could not be parsed");
            APPLY_PARSE_ERROR_TEMPLATE
        } else if parsed.result.is_empty() {
            return Ok(Notification {
                parsed,
                delivery: Delivery::NothingToReport,
            });
        } else {
            APPLY_TEMPLATE
        };

        let body = self.compose("apply", template, output, &parsed, &[], &pull_request)?;
        self.create(&body, &pull_request).await?;
        Ok(Notification {
            parsed,
            delivery: Delivery::Created,
        })
    }

    /// Fill in the pull request number from the commit when only the revision is known.
    async fn resolve_pull_request(&self) -> PullRequestRef {
        let mut pull_request = self.options.pull_request.clone();
        if pull_request.has_number() || pull_request.revision.is_empty() {
            return pull_request;
        }
        match self
            .comments
            .pull_requests_for_commit(&pull_request.revision)
            .await
        {
            Ok(numbers) => match numbers.first() {
                Some(&number) => {
                    debug!(number, revision = %pull_request.revision, "resolved pull request");
                    pull_request.number = number;
                }
                None => debug!(revision = %pull_request.revision, "commit is not on any pull request"),
            },
            Err(e) => warn!(error = %e, "failed to look up pull request, commenting on the commit"),
        }
        pull_request
    }

    /// Render, embed the trailer and mask, in that order.
    fn compose(
        &self,
        command: &str,
        template: &str,
        output: &ExecOutput,
        parsed: &ParseResult,
        warnings: &[Warning],
        pull_request: &PullRequestRef,
    ) -> Result<String, NotifyError> {
        let context = self.context(command, output, parsed, warnings);
        let mut body = self.renderer.render(template, &context)?;
        body.push_str(&metadata::embed(&self.metadata(command, output, pull_request))?);
        Ok(self.masker.mask(&body))
    }

    fn context(
        &self,
        command: &str,
        output: &ExecOutput,
        parsed: &ParseResult,
        warnings: &[Warning],
    ) -> RenderContext {
        let summary = match &self.options.summary {
            Some(summary) if self.options.summary_enabled => summary.trim().to_string(),
            _ => String::new(),
        };
        RenderContext {
            command: command.to_string(),
            target: self.options.target.clone(),
            vars: self.options.vars.clone(),
            link: self.options.link.clone(),
            result: parsed.result.clone(),
            changed_result: parsed.changed_result.clone(),
            outside_changes: parsed.outside_changes.clone(),
            warning: parsed.warning.clone(),
            body: output.combined_output.clone(),
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
            exit_code: output.exit_code,
            has_add_or_update_only: parsed.has_add_or_update_only,
            has_destroy: parsed.has_destroy,
            has_no_changes: parsed.has_no_changes,
            has_error: parsed.has_error,
            has_parse_error: parsed.has_parse_error,
            parse_error: parsed.error.map(|e| e.to_string()).unwrap_or_default(),
            created: parsed.created.clone(),
            updated: parsed.updated.clone(),
            deleted: parsed.deleted.clone(),
            replaced: parsed.replaced.clone(),
            imported: parsed.imported.clone(),
            moved: parsed.moved.clone(),
            error_messages: warnings.iter().map(ToString::to_string).collect(),
            summary,
        }
    }

    fn metadata(&self, command: &str, output: &ExecOutput, pull_request: &PullRequestRef) -> Metadata {
        let mut map = Metadata::new();
        if !output.ci_name.is_empty() {
            map.insert("CI".to_string(), Value::from(output.ci_name.as_str()));
        }
        for (key, value) in &self.options.ci_metadata {
            map.insert(key.clone(), Value::from(value.as_str()));
        }
        map.insert("Program".to_string(), Value::from(metadata::PROGRAM));
        map.insert("Command".to_string(), Value::from(command));
        if !self.options.target.is_empty() {
            map.insert("Target".to_string(), Value::from(self.options.target.as_str()));
        }
        map.insert("SHA1".to_string(), Value::from(pull_request.revision.as_str()));
        map.insert("PRNumber".to_string(), Value::from(pull_request.number));
        map
    }

    /// The last visible plan comment this tool posted for the same target.
    fn find_previous<'a>(&self, comments: &'a [Comment]) -> Option<&'a Comment> {
        comments.iter().rev().filter(|c| !c.is_minimized).find(|c| {
            metadata::extract(&c.body)
                .is_some_and(|m| metadata::matches(&m, "plan", &self.options.target))
        })
    }

    async fn create(&self, body: &str, pull_request: &PullRequestRef) -> Result<(), NotifyError> {
        let target = if pull_request.has_number() {
            PostTarget::PullRequest(pull_request.number)
        } else if !pull_request.revision.is_empty() {
            PostTarget::Commit(pull_request.revision.clone())
        } else {
            return Err(NotifyError::MissingTarget);
        };
        self.comments
            .create_comment(body, &target)
            .await
            .map_err(NotifyError::Create)?;
        info!(?target, "comment created");
        Ok(())
    }
}
