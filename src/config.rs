use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::notifier::types::{LabelSpec, ResultLabels};

const DEFAULT_CONFIG_FILE: &str = ".tfnotify.toml";
const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .tfnotify.toml.
///
/// All fields are optional, the tool works with zero config inside GitHub Actions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub ci: CiConfig,

    /// Distinguishes comments and labels of several root modules on one PR
    pub target: Option<String>,

    /// Free-form values exposed to templates
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// Named template overrides (e.g. `result`, `changed_result`)
    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    #[serde(default)]
    pub terraform: TerraformConfig,

    #[serde(default)]
    pub masks: Vec<MaskConfig>,

    #[serde(default)]
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// REST API root, defaults to https://api.github.com
    pub base_url: Option<String>,
    /// GraphQL endpoint, derived from base_url when unset
    pub graphql_url: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
}

impl GitHubConfig {
    pub fn api_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string()
    }

    /// GitHub Enterprise serves REST under /api/v3 and GraphQL under /api/graphql.
    pub fn graphql_endpoint(&self) -> String {
        if let Some(url) = &self.graphql_url {
            return url.clone();
        }
        let api = self.api_url();
        match api.strip_suffix("/v3") {
            Some(root) => format!("{root}/graphql"),
            None => format!("{api}/graphql"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CiConfig {
    pub name: Option<String>,
    /// Commit the command ran against
    pub sha: Option<String>,
    pub pr_number: Option<u64>,
    /// URL of the CI run
    pub link: Option<String>,
    /// CI-specific identifying fields embedded in posted comments
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformConfig {
    #[serde(default)]
    pub plan: PlanConfig,
    #[serde(default)]
    pub apply: ApplyConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanConfig {
    pub template: Option<String>,
    pub when_parse_error_template: Option<String>,
    /// Update the previous plan comment instead of posting a new one
    #[serde(default)]
    pub patch: bool,
    #[serde(default)]
    pub skip_no_changes: bool,
    #[serde(default)]
    pub disable_label: bool,
    #[serde(default)]
    pub when_add_or_update_only: LabelConfig,
    #[serde(default)]
    pub when_destroy: LabelConfig,
    #[serde(default)]
    pub when_no_changes: LabelConfig,
    #[serde(default)]
    pub when_plan_error: LabelConfig,
}

/// Label override for one outcome. `label = ""` disables the label.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelConfig {
    pub label: Option<String>,
    pub label_color: Option<String>,
}

impl LabelConfig {
    fn resolve(&self, default_name: &str, default_color: &str, prefix: &str) -> LabelSpec {
        let name = match &self.label {
            Some(name) => name.clone(),
            None => format!("{prefix}{default_name}"),
        };
        let color = self
            .label_color
            .clone()
            .unwrap_or_else(|| default_color.to_string());
        LabelSpec { name, color }
    }
}

impl PlanConfig {
    /// Outcome labels with defaults applied. Defaults get a `<target>/` prefix.
    pub fn result_labels(&self, target: Option<&str>) -> ResultLabels {
        let prefix = target
            .filter(|t| !t.is_empty())
            .map(|t| format!("{t}/"))
            .unwrap_or_default();
        ResultLabels {
            add_or_update_only: self
                .when_add_or_update_only
                .resolve("add-or-update", "1d76db", &prefix),
            destroy: self.when_destroy.resolve("destroy", "d93f0b", &prefix),
            no_changes: self.when_no_changes.resolve("no-changes", "0e8a16", &prefix),
            plan_error: self.when_plan_error.resolve("plan-error", "", &prefix),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplyConfig {
    pub template: Option<String>,
    pub when_parse_error_template: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskKind {
    /// Value of the named environment variable
    Env,
    Equal,
    Regexp,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaskConfig {
    #[serde(rename = "type")]
    pub kind: MaskKind,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Load configuration from the given path, or from .tfnotify.toml in the
    /// current directory. Returns default config if neither exists.
    /// Environment variables fill whatever the file leaves unset.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)?
                } else {
                    debug!("no config file found, using defaults");
                    Config::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Fill unset values from GITHUB_TOKEN and the GitHub Actions environment.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.github.token.is_none() {
            self.github.token = env("GITHUB_TOKEN");
        }

        if env("GITHUB_ACTIONS").as_deref() != Some("true") {
            return;
        }

        self.ci.name.get_or_insert_with(|| "github-actions".to_string());
        if self.github.base_url.is_none() {
            self.github.base_url = env("GITHUB_API_URL");
        }
        if self.github.graphql_url.is_none() {
            self.github.graphql_url = env("GITHUB_GRAPHQL_URL");
        }
        if let Some((owner, repo)) = env("GITHUB_REPOSITORY")
            .as_deref()
            .and_then(|full| full.split_once('/'))
        {
            self.github.owner.get_or_insert_with(|| owner.to_string());
            self.github.repo.get_or_insert_with(|| repo.to_string());
        }
        if self.ci.pr_number.is_none() {
            if let Some(path) = env("GITHUB_EVENT_PATH") {
                self.apply_event_payload(Path::new(&path));
            }
        }
        if self.ci.sha.is_none() {
            self.ci.sha = env("GITHUB_SHA");
        }
        if self.ci.link.is_none() {
            if let (Some(server), Some(repository), Some(run_id)) = (
                env("GITHUB_SERVER_URL"),
                env("GITHUB_REPOSITORY"),
                env("GITHUB_RUN_ID"),
            ) {
                self.ci.link = Some(format!("{server}/{repository}/actions/runs/{run_id}"));
            }
        }
        for (key, var) in [
            ("WorkflowName", "GITHUB_WORKFLOW"),
            ("JobName", "GITHUB_JOB"),
            ("RunID", "GITHUB_RUN_ID"),
        ] {
            if let Some(value) = env(var) {
                self.ci.metadata.entry(key.to_string()).or_insert(value);
            }
        }
    }

    /// Pull request number and head commit from a pull_request event payload.
    fn apply_event_payload(&mut self, path: &Path) {
        #[derive(Deserialize)]
        struct Head {
            sha: String,
        }

        #[derive(Deserialize)]
        struct PullRequest {
            number: u64,
            head: Head,
        }

        #[derive(Deserialize)]
        struct Event {
            pull_request: Option<PullRequest>,
        }

        let event = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<Event>(&raw).map_err(|e| e.to_string()));
        match event {
            Ok(Event {
                pull_request: Some(pr),
            }) => {
                debug!(pr = pr.number, "read pull request from event payload");
                self.ci.pr_number = Some(pr.number);
                self.ci.sha.get_or_insert(pr.head.sha);
            }
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read GitHub event payload"),
        }
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }
}
