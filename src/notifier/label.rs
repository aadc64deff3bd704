use tracing::{debug, info, instrument, warn};

use super::types::{ResultLabels, Warning};
use super::LabelApi;
use crate::github::ApiError;
use crate::terraform::Outcome;

/// GitHub rejects longer label names.
pub const MAX_LABEL_LENGTH: usize = 50;

/// Bring the outcome labels on a pull request in line with `outcome`.
///
/// Stale outcome labels are removed and the label for `outcome` is added or
/// recolored. Nothing here is fatal: every failed call becomes a warning.
#[instrument(skip(api, labels))]
pub async fn update_labels(
    api: &dyn LabelApi,
    outcome: Option<Outcome>,
    labels: &ResultLabels,
    number: u64,
) -> Vec<Warning> {
    let mut warnings = Vec::new();
    if number == 0 {
        return warnings;
    }

    let wanted = labels.for_outcome(outcome);
    let wanted_name = wanted.map(|spec| spec.name.as_str()).unwrap_or("");
    let wanted_color = wanted.map(|spec| spec.color.as_str()).unwrap_or("");

    let current = match api.list_labels(number).await {
        Ok(current) => current,
        Err(source) => {
            warn!(number, error = %source, "failed to list labels");
            warnings.push(Warning::ListLabels { number, source });
            return warnings;
        }
    };

    let mut present_color = None;
    for label in current {
        if label.name == wanted_name {
            present_color = Some(label.color);
            continue;
        }
        if !labels.is_outcome_label(&label.name) {
            continue;
        }
        debug!(label = %label.name, "removing stale label");
        match api.remove_label(number, &label.name).await {
            Ok(()) | Err(ApiError::NotFound(_)) => {}
            Err(source) => {
                warn!(label = %label.name, error = %source, "failed to remove label");
                warnings.push(Warning::RemoveLabel {
                    name: label.name,
                    source,
                });
            }
        }
    }

    if wanted_name.is_empty() {
        return warnings;
    }
    if wanted_name.chars().count() > MAX_LABEL_LENGTH {
        warn!(label = %wanted_name, "label name is too long");
        warnings.push(Warning::LabelTooLong {
            name: wanted_name.to_string(),
            max: MAX_LABEL_LENGTH,
        });
        return warnings;
    }

    let actual_color = match present_color {
        Some(color) => color,
        None => match api.add_labels(number, &[wanted_name.to_string()]).await {
            Ok(added) => {
                info!(label = %wanted_name, "label added");
                added
                    .into_iter()
                    .find(|label| label.name == wanted_name)
                    .map(|label| label.color)
                    .unwrap_or_default()
            }
            Err(source) => {
                warn!(label = %wanted_name, error = %source, "failed to add label");
                warnings.push(Warning::AddLabel {
                    name: wanted_name.to_string(),
                    source,
                });
                return warnings;
            }
        },
    };

    if !wanted_color.is_empty() && !actual_color.eq_ignore_ascii_case(wanted_color) {
        debug!(label = %wanted_name, from = %actual_color, to = %wanted_color, "updating label color");
        if let Err(source) = api.update_label_color(wanted_name, wanted_color).await {
            warn!(label = %wanted_name, error = %source, "failed to update label color");
            warnings.push(Warning::UpdateLabelColor {
                name: wanted_name.to_string(),
                color: wanted_color.to_string(),
                source,
            });
        }
    }

    warnings
}
