mod config;
mod exec;
mod github;
mod mask;
mod notifier;
mod report;
mod terraform;

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use exec::ExecOutput;
use github::GitHubClient;
use mask::{MaskError, Masker, MASKS_ENV};
use notifier::types::{NotifyOptions, PullRequestRef};
use notifier::{Notification, Notifier};
use report::Renderer;

/// tfnotify: run terraform plan/apply and post the result to the pull request.
#[derive(Parser, Debug)]
#[command(name = "tfnotify", version, about)]
struct Cli {
    /// Config file path (defaults to .tfnotify.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// File holding a summary of the change to include in the comment
    #[arg(long, global = true)]
    summary: Option<PathBuf>,

    /// Repository owner
    #[arg(long, global = true, env = "TFNOTIFY_REPO_OWNER")]
    owner: Option<String>,

    /// Repository name
    #[arg(long, global = true, env = "TFNOTIFY_REPO_NAME")]
    repo: Option<String>,

    /// Commit SHA the run belongs to
    #[arg(long, global = true, env = "TFNOTIFY_SHA")]
    sha: Option<String>,

    /// Pull request number
    #[arg(long, global = true, env = "TFNOTIFY_PR_NUMBER")]
    pr: Option<u64>,

    /// Name distinguishing several root modules on one pull request
    #[arg(long, global = true, env = "TFNOTIFY_TARGET")]
    target: Option<String>,

    /// Template variable, e.g. --var env:prod (repeatable)
    #[arg(long = "var", global = true, value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Seconds an interrupted command may take to exit before it is killed
    #[arg(long, global = true, default_value_t = exec::DEFAULT_GRACE_PERIOD.as_secs())]
    grace_period: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run `terraform plan` and comment the result
    Plan {
        /// Update the previous plan comment instead of posting a new one
        #[arg(long)]
        patch: bool,

        /// Do not comment when there are no changes
        #[arg(long)]
        skip_no_changes: bool,

        /// Do not add outcome labels to the pull request
        #[arg(long)]
        disable_label: bool,

        /// Command to run, after `--`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Run `terraform apply` and comment the result
    Apply {
        /// Command to run, after `--`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Plan { .. } => "plan",
            Command::Apply { .. } => "apply",
        }
    }

    fn args(&self) -> &[String] {
        match self {
            Command::Plan { args, .. } | Command::Apply { args } => args,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let mut config = Config::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);
    let masker = build_masker(&config)?;

    let command = cli.command.name();
    info!(command, "running command");
    let runner = exec::Runner::new(masker.clone(), config.ci.name.clone().unwrap_or_default())
        .with_grace_period(Duration::from_secs(cli.grace_period));
    let output = runner.run(cli.command.args()).await?;
    let exit = exit_code(output.exit_code);

    match notify(&cli, &config, masker, &output).await {
        Ok(notification) => {
            info!(delivery = %notification.delivery, "done");
            report::print_terminal_summary(command, &notification.parsed, &notification.delivery);
            Ok(exit)
        }
        Err(e) => {
            error!(error = %e, "failed to notify");
            if output.exit_code == 0 {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(exit)
            }
        }
    }
}

async fn notify(
    cli: &Cli,
    config: &Config,
    masker: Masker,
    output: &ExecOutput,
) -> Result<Notification, Box<dyn std::error::Error>> {
    let client = Arc::new(GitHubClient::from_config(config)?);
    let renderer = Renderer::new(&template_overrides(config))?;
    let summary = read_summary(cli.summary.as_deref())?;
    let options = notify_options(config, summary, cli.summary.is_some());
    debug!(pr = options.pull_request.number, target = %options.target, "notifying");

    let notifier = Notifier::new(client.clone(), client, renderer, masker, options);
    let notification = match cli.command {
        Command::Plan { .. } => notifier.plan(output).await?,
        Command::Apply { .. } => notifier.apply(output).await?,
    };
    Ok(notification)
}

/// Command line flags win over the config file and the environment.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(owner) = &cli.owner {
        config.github.owner = Some(owner.clone());
    }
    if let Some(repo) = &cli.repo {
        config.github.repo = Some(repo.clone());
    }
    if let Some(sha) = &cli.sha {
        config.ci.sha = Some(sha.clone());
    }
    if let Some(pr) = cli.pr {
        config.ci.pr_number = Some(pr);
    }
    if let Some(target) = &cli.target {
        config.target = Some(target.clone());
    }
    config.vars.extend(cli.vars.iter().cloned());

    if let Command::Plan {
        patch,
        skip_no_changes,
        disable_label,
        ..
    } = cli.command
    {
        let plan = &mut config.terraform.plan;
        plan.patch |= patch;
        plan.skip_no_changes |= skip_no_changes;
        plan.disable_label |= disable_label;
    }
}

fn build_masker(config: &Config) -> Result<Masker, MaskError> {
    let mut masks = config.masks.clone();
    if let Ok(spec) = std::env::var(MASKS_ENV) {
        masks.extend(Masker::parse_spec(&spec)?);
    }
    Masker::from_config(&masks, |key| std::env::var(key).ok())
}

/// Partial overrides plus the configured top-level templates.
fn template_overrides(config: &Config) -> BTreeMap<String, String> {
    let mut templates = config.templates.clone();
    let plan = &config.terraform.plan;
    let apply = &config.terraform.apply;
    for (name, template) in [
        (report::PLAN_TEMPLATE, &plan.template),
        (report::PLAN_PARSE_ERROR_TEMPLATE, &plan.when_parse_error_template),
        (report::APPLY_TEMPLATE, &apply.template),
        (report::APPLY_PARSE_ERROR_TEMPLATE, &apply.when_parse_error_template),
    ] {
        if let Some(template) = template {
            templates.insert(name.to_string(), template.clone());
        }
    }
    templates
}

fn read_summary(path: Option<&Path>) -> std::io::Result<Option<String>> {
    path.map(std::fs::read_to_string).transpose()
}

fn notify_options(config: &Config, summary: Option<String>, summary_given: bool) -> NotifyOptions {
    let plan = &config.terraform.plan;
    NotifyOptions {
        pull_request: PullRequestRef {
            revision: config.ci.sha.clone().unwrap_or_default(),
            number: config.ci.pr_number.unwrap_or(0),
        },
        target: config.target.clone().unwrap_or_default(),
        vars: config.vars.clone(),
        link: config.ci.link.clone().unwrap_or_default(),
        ci_metadata: config.ci.metadata.clone(),
        patch: plan.patch,
        skip_no_changes: plan.skip_no_changes,
        disable_label: plan.disable_label,
        labels: plan.result_labels(config.target.as_deref()),
        summary,
        summary_enabled: config.summary.enabled || summary_given,
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("invalid variable {raw:?}, expected key:value"))
}

/// Exit codes outside 0..=255 (e.g. death by signal) map to failure.
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}
