pub mod types;

use async_trait::async_trait;
use reqwest::{header, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::notifier::types::{Comment, Label, PostTarget};
use crate::notifier::{CommentApi, LabelApi};
use types::{
    AddLabelsRequest, CommentRequest, ErrorBody, GraphQlRequest, GraphQlResponse,
    LabelColorRequest, LabelResponse, ListCommentsVariables, PullResponse, RepositoryData,
    LIST_COMMENTS_QUERY,
};

const USER_AGENT: &str = "tfnotify";
const PER_PAGE: &str = "100";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("GitHub API resource not found: {0}")]
    NotFound(String),

    #[error("GitHub GraphQL error: {0}")]
    GraphQl(String),

    #[error("Invalid GitHub API URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub token not found in environment")]
    MissingToken,

    #[error("GitHub repository is not configured (owner and repo are required)")]
    MissingRepository,
}

/// GitHub client for comments, labels and pull request lookup on one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    graphql_url: String,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    pub fn new(
        api_url: String,
        graphql_url: String,
        token: String,
        owner: String,
        repo: String,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_url,
            graphql_url,
            token,
            owner,
            repo,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let token = config.github_token().ok_or(ApiError::MissingToken)?;
        let (Some(owner), Some(repo)) = (&config.github.owner, &config.github.repo) else {
            return Err(ApiError::MissingRepository);
        };
        Self::new(
            config.github.api_url(),
            config.github.graphql_endpoint(),
            token,
            owner.clone(),
            repo.clone(),
        )
    }

    /// Repository-scoped REST endpoint; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.api_url).map_err(|_| ApiError::InvalidUrl(self.api_url.clone()))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.api_url.clone()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request
            .header(header::ACCEPT, "application/vnd.github+json")
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| status.to_string());
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(message));
        }
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CommentApi for GitHubClient {
    /// Lists through GraphQL since REST does not say whether a comment is minimized.
    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>, ApiError> {
        let mut comments = Vec::new();
        let mut cursor = None;
        loop {
            let request = GraphQlRequest {
                query: LIST_COMMENTS_QUERY,
                variables: ListCommentsVariables {
                    owner: &self.owner,
                    repo: &self.repo,
                    number,
                    cursor: cursor.take(),
                },
            };
            let response: GraphQlResponse<RepositoryData> = self
                .send(self.http.post(&self.graphql_url).json(&request))
                .await?
                .json()
                .await?;

            if let Some(error) = response.errors.into_iter().next() {
                return Err(ApiError::GraphQl(error.message));
            }
            let connection = response
                .data
                .and_then(|data| data.repository)
                .and_then(|repository| repository.pull_request)
                .map(|pr| pr.comments)
                .ok_or_else(|| ApiError::NotFound(format!("pull request #{number}")))?;

            comments.extend(connection.nodes.into_iter().map(Comment::from));
            match connection.page_info.end_cursor {
                Some(next) if connection.page_info.has_next_page => cursor = Some(next),
                _ => break,
            }
        }
        debug!(count = comments.len(), "listed pull request comments");
        Ok(comments)
    }

    #[instrument(skip(self, body), fields(owner = %self.owner, repo = %self.repo))]
    async fn create_comment(&self, body: &str, target: &PostTarget) -> Result<(), ApiError> {
        let url = match target {
            PostTarget::PullRequest(number) => {
                self.endpoint(&["issues", &number.to_string(), "comments"])?
            }
            PostTarget::Commit(sha) => self.endpoint(&["commits", sha, "comments"])?,
        };
        self.send(self.http.post(url).json(&CommentRequest { body }))
            .await?;
        debug!(bytes = body.len(), "created comment");
        Ok(())
    }

    #[instrument(skip(self, body), fields(owner = %self.owner, repo = %self.repo))]
    async fn patch_comment(&self, id: u64, body: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["issues", "comments", &id.to_string()])?;
        self.send(self.http.patch(url).json(&CommentRequest { body }))
            .await?;
        debug!(bytes = body.len(), "updated comment");
        Ok(())
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn pull_requests_for_commit(&self, revision: &str) -> Result<Vec<u64>, ApiError> {
        let url = self.endpoint(&["commits", revision, "pulls"])?;
        let pulls: Vec<PullResponse> = self.send(self.http.get(url)).await?.json().await?;
        Ok(pulls.into_iter().map(|pr| pr.number).collect())
    }
}

#[async_trait]
impl LabelApi for GitHubClient {
    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn list_labels(&self, number: u64) -> Result<Vec<Label>, ApiError> {
        let url = self.endpoint(&["issues", &number.to_string(), "labels"])?;
        let labels: Vec<LabelResponse> = self
            .send(self.http.get(url).query(&[("per_page", PER_PAGE)]))
            .await?
            .json()
            .await?;
        Ok(labels.into_iter().map(Label::from).collect())
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn add_labels(&self, number: u64, names: &[String]) -> Result<Vec<Label>, ApiError> {
        let url = self.endpoint(&["issues", &number.to_string(), "labels"])?;
        let labels: Vec<LabelResponse> = self
            .send(self.http.post(url).json(&AddLabelsRequest { labels: names }))
            .await?
            .json()
            .await?;
        Ok(labels.into_iter().map(Label::from).collect())
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn remove_label(&self, number: u64, name: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["issues", &number.to_string(), "labels", name])?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner = %self.owner, repo = %self.repo))]
    async fn update_label_color(&self, name: &str, color: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["labels", name])?;
        self.send(self.http.patch(url).json(&LabelColorRequest { color }))
            .await?;
        Ok(())
    }
}
