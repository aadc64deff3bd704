//! Wire types for the GitHub REST and GraphQL APIs.

use serde::{Deserialize, Serialize};

use crate::notifier::types::{Comment, Label};

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentRequest<'a> {
    pub body: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddLabelsRequest<'a> {
    pub labels: &'a [String],
}

#[derive(Debug, Serialize)]
pub(crate) struct LabelColorRequest<'a> {
    pub color: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelResponse {
    pub name: String,
    #[serde(default)]
    pub color: String,
}

impl From<LabelResponse> for Label {
    fn from(label: LabelResponse) -> Self {
        Label {
            name: label.name,
            color: label.color,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullResponse {
    pub number: u64,
}

pub(crate) const LIST_COMMENTS_QUERY: &str = r"query($owner: String!, $repo: String!, $number: Int!, $cursor: String) {
  repository(owner: $owner, name: $repo) {
    pullRequest(number: $number) {
      comments(first: 100, after: $cursor) {
        pageInfo { hasNextPage endCursor }
        nodes { databaseId body isMinimized }
      }
    }
  }
}";

#[derive(Debug, Serialize)]
pub(crate) struct GraphQlRequest<'a, V> {
    pub query: &'a str,
    pub variables: V,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListCommentsVariables<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub number: u64,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryData {
    pub repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepositoryNode {
    pub pull_request: Option<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestNode {
    pub comments: CommentConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommentConnection {
    pub page_info: PageInfo,
    pub nodes: Vec<CommentNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommentNode {
    pub database_id: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_minimized: bool,
}

impl From<CommentNode> for Comment {
    fn from(node: CommentNode) -> Self {
        Comment {
            id: node.database_id,
            body: node.body,
            is_minimized: node.is_minimized,
        }
    }
}
