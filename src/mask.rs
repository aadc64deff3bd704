use regex::{NoExpand, Regex};
use thiserror::Error;
use tracing::debug;

use crate::config::{MaskConfig, MaskKind};

/// Text every masked value is replaced with.
pub const MASK_MARKER: &str = "***";

/// Environment variable holding extra masks, e.g. `env:GITHUB_TOKEN,regexp:token-\w+`.
pub const MASKS_ENV: &str = "TFNOTIFY_MASKS";

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Invalid mask regular expression {pattern}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid mask definition: {0} (expected env:, equal: or regexp: prefix)")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub enum Mask {
    Equal(String),
    Regexp(Regex),
}

/// Redacts secrets from text before it leaves the process.
#[derive(Debug, Clone, Default)]
pub struct Masker {
    masks: Vec<Mask>,
}

impl Masker {
    pub fn new(masks: Vec<Mask>) -> Self {
        Self { masks }
    }

    /// Build masks in configured order. `env` masks resolve through `env`;
    /// unset or empty variables are skipped.
    pub fn from_config<F>(configs: &[MaskConfig], env: F) -> Result<Self, MaskError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut masks = Vec::with_capacity(configs.len());
        for config in configs {
            match config.kind {
                MaskKind::Env => match env(&config.value).filter(|v| !v.is_empty()) {
                    Some(value) => masks.push(Mask::Equal(value)),
                    None => debug!(var = %config.value, "mask variable is not set"),
                },
                MaskKind::Equal if config.value.is_empty() => {}
                MaskKind::Equal => masks.push(Mask::Equal(config.value.clone())),
                MaskKind::Regexp => {
                    let regex = Regex::new(&config.value).map_err(|source| MaskError::Regex {
                        pattern: config.value.clone(),
                        source,
                    })?;
                    masks.push(Mask::Regexp(regex));
                }
            }
        }
        Ok(Self { masks })
    }

    /// Parse the comma separated `TFNOTIFY_MASKS` format.
    pub fn parse_spec(spec: &str) -> Result<Vec<MaskConfig>, MaskError> {
        spec.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (kind, value) = entry
                    .split_once(':')
                    .ok_or_else(|| MaskError::Invalid(entry.to_string()))?;
                let kind = match kind {
                    "env" => MaskKind::Env,
                    "equal" => MaskKind::Equal,
                    "regexp" => MaskKind::Regexp,
                    _ => return Err(MaskError::Invalid(entry.to_string())),
                };
                Ok(MaskConfig {
                    kind,
                    value: value.to_string(),
                })
            })
            .collect()
    }

    /// Apply every mask in order.
    pub fn mask(&self, text: &str) -> String {
        self.masks
            .iter()
            .fold(text.to_string(), |acc, mask| match mask {
                Mask::Equal(value) => acc.replace(value.as_str(), MASK_MARKER),
                Mask::Regexp(regex) => regex.replace_all(&acc, NoExpand(MASK_MARKER)).into_owned(),
            })
    }
}
