//! In-memory comment and label ports that record every call.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use super::types::{Comment, Label, PostTarget};
use super::{CommentApi, LabelApi};
use crate::github::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListComments(u64),
    CreateComment(String, PostTarget),
    PatchComment(u64, String),
    PullRequestsForCommit(String),
    ListLabels(u64),
    AddLabels(u64, Vec<String>),
    RemoveLabel(u64, String),
    UpdateLabelColor(String, String),
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub comments: Vec<Comment>,
    pub labels: Vec<Label>,
    pub pulls: Vec<u64>,
    /// Color GitHub reports for a freshly added label
    pub added_color: String,
    pub fail_list_comments: bool,
    pub fail_create: bool,
    pub fail_patch: bool,
    pub fail_pulls: bool,
    pub fail_list_labels: bool,
    pub fail_add_labels: bool,
    /// Status returned by every label removal
    pub remove_error: Option<u16>,
    pub calls: Vec<Call>,
}

#[derive(Debug, Default)]
pub struct FakeGitHub {
    state: Mutex<FakeState>,
}

fn server_error() -> ApiError {
    ApiError::Status {
        status: 500,
        message: "Internal Server Error".to_string(),
    }
}

impl FakeGitHub {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::CreateComment(..) | Call::PatchComment(..)))
            .collect()
    }

    fn record(&self, call: Call) -> MutexGuard<'_, FakeState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl CommentApi for FakeGitHub {
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, ApiError> {
        let state = self.record(Call::ListComments(number));
        if state.fail_list_comments {
            return Err(server_error());
        }
        Ok(state.comments.clone())
    }

    async fn create_comment(&self, body: &str, target: &PostTarget) -> Result<(), ApiError> {
        let mut state = self.record(Call::CreateComment(body.to_string(), target.clone()));
        if state.fail_create {
            return Err(server_error());
        }
        let id = state.comments.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        state.comments.push(Comment {
            id,
            body: body.to_string(),
            is_minimized: false,
        });
        Ok(())
    }

    async fn patch_comment(&self, id: u64, body: &str) -> Result<(), ApiError> {
        let mut state = self.record(Call::PatchComment(id, body.to_string()));
        if state.fail_patch {
            return Err(server_error());
        }
        match state.comments.iter_mut().find(|c| c.id == id) {
            Some(comment) => {
                comment.body = body.to_string();
                Ok(())
            }
            None => Err(ApiError::NotFound(format!("comment {id}"))),
        }
    }

    async fn pull_requests_for_commit(&self, revision: &str) -> Result<Vec<u64>, ApiError> {
        let state = self.record(Call::PullRequestsForCommit(revision.to_string()));
        if state.fail_pulls {
            return Err(server_error());
        }
        Ok(state.pulls.clone())
    }
}

#[async_trait]
impl LabelApi for FakeGitHub {
    async fn list_labels(&self, number: u64) -> Result<Vec<Label>, ApiError> {
        let state = self.record(Call::ListLabels(number));
        if state.fail_list_labels {
            return Err(server_error());
        }
        Ok(state.labels.clone())
    }

    async fn add_labels(&self, number: u64, names: &[String]) -> Result<Vec<Label>, ApiError> {
        let mut state = self.record(Call::AddLabels(number, names.to_vec()));
        if state.fail_add_labels {
            return Err(server_error());
        }
        let color = state.added_color.clone();
        for name in names {
            state.labels.push(Label {
                name: name.clone(),
                color: color.clone(),
            });
        }
        Ok(state.labels.clone())
    }

    async fn remove_label(&self, number: u64, name: &str) -> Result<(), ApiError> {
        let mut state = self.record(Call::RemoveLabel(number, name.to_string()));
        match state.remove_error {
            Some(404) => Err(ApiError::NotFound(format!("label {name}"))),
            Some(status) => Err(ApiError::Status {
                status,
                message: "remove failed".to_string(),
            }),
            None => {
                state.labels.retain(|label| label.name != name);
                Ok(())
            }
        }
    }

    async fn update_label_color(&self, name: &str, color: &str) -> Result<(), ApiError> {
        let mut state = self.record(Call::UpdateLabelColor(name.to_string(), color.to_string()));
        for label in state.labels.iter_mut().filter(|label| label.name == name) {
            label.color = color.to_string();
        }
        Ok(())
    }
}
