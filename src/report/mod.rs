pub mod types;

pub use types::RenderContext;

use colored::Colorize;
use handlebars::Handlebars;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::notifier::types::Delivery;
use crate::terraform::{Outcome, ParseResult};

pub const PLAN_TEMPLATE: &str = "plan";
pub const PLAN_PARSE_ERROR_TEMPLATE: &str = "plan_parse_error";
pub const APPLY_TEMPLATE: &str = "apply";
pub const APPLY_PARSE_ERROR_TEMPLATE: &str = "apply_parse_error";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("Failed to render template {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

/// Named comment templates. Every built-in template can be replaced by name,
/// and templates include each other as partials (`{{> result}}`).
pub struct Renderer {
    handlebars: Handlebars<'static>,
}

impl Renderer {
    pub fn new(overrides: &BTreeMap<String, String>) -> Result<Self, RenderError> {
        let mut handlebars = Handlebars::new();
        // Comments are markdown, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        let templates = DEFAULT_TEMPLATES
            .iter()
            .map(|(name, template)| (*name, *template))
            .chain(overrides.iter().map(|(name, template)| (name.as_str(), template.as_str())));
        for (name, template) in templates {
            handlebars
                .register_template_string(name, template)
                .map_err(|source| RenderError::Template {
                    name: name.to_string(),
                    source: Box::new(source),
                })?;
        }
        debug!(overrides = overrides.len(), "registered comment templates");

        Ok(Self { handlebars })
    }

    #[instrument(skip(self, context), fields(command = %context.command))]
    pub fn render(&self, name: &str, context: &RenderContext) -> Result<String, RenderError> {
        self.handlebars
            .render(name, context)
            .map_err(|source| RenderError::Render {
                name: name.to_string(),
                source: Box::new(source),
            })
    }
}

/// Print a one-line colored summary of the run to stderr.
pub fn print_terminal_summary(command: &str, parsed: &ParseResult, delivery: &Delivery) {
    eprintln!(
        "{} {}: {} ({})",
        "tfnotify".bold(),
        command,
        colorize_status(parsed),
        delivery
    );
}

/// Helper to colorize the parse outcome for terminal output.
fn colorize_status(parsed: &ParseResult) -> colored::ColoredString {
    if parsed.has_parse_error {
        return "UNPARSABLE".magenta().bold();
    }
    match parsed.outcome() {
        Some(Outcome::AddOrUpdateOnly) => "ADD OR UPDATE".yellow().bold(),
        Some(Outcome::Destroy) => "DESTROY".red().bold(),
        Some(Outcome::NoChanges) => "NO CHANGES".green().bold(),
        Some(Outcome::Error) => "ERROR".red().bold(),
        None => "COMPLETE".green().bold(),
    }
}

const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    ("plan_title", PLAN_TITLE),
    ("apply_title", APPLY_TITLE),
    ("link", LINK),
    ("result", RESULT),
    ("updated_resources", UPDATED_RESOURCES),
    ("deletion_warning", DELETION_WARNING),
    ("changed_result", CHANGED_RESULT),
    ("outside_the_tool", OUTSIDE_THE_TOOL),
    ("warning", WARNING),
    ("error_messages", ERROR_MESSAGES),
    ("summary", SUMMARY),
    (PLAN_TEMPLATE, PLAN),
    (PLAN_PARSE_ERROR_TEMPLATE, PLAN_PARSE_ERROR),
    (APPLY_TEMPLATE, APPLY),
    (APPLY_PARSE_ERROR_TEMPLATE, APPLY_PARSE_ERROR),
];

const PLAN_TITLE: &str =
    "## {{#if has_error}}:x: Plan Failed{{else}}Plan Result{{/if}}{{#if target}} ({{target}}){{/if}}";

const APPLY_TITLE: &str = "## {{#if has_error}}:x: Apply Failed{{else}}:white_check_mark: Apply Result{{/if}}{{#if target}} ({{target}}){{/if}}";

const LINK: &str = "{{#if link}}[CI link]({{link}}){{/if}}";

const RESULT: &str = r"{{#if result}}
```
{{result}}
```
{{/if}}";

const UPDATED_RESOURCES: &str = r"{{#if created}}
* Create
{{#each created}}
  * {{this}}
{{/each}}
{{/if}}
{{#if updated}}
* Update
{{#each updated}}
  * {{this}}
{{/each}}
{{/if}}
{{#if deleted}}
* Delete
{{#each deleted}}
  * {{this}}
{{/each}}
{{/if}}
{{#if replaced}}
* Replace
{{#each replaced}}
  * {{this}}
{{/each}}
{{/if}}
{{#if imported}}
* Import
{{#each imported}}
  * {{this}}
{{/each}}
{{/if}}
{{#if moved}}
* Move
{{#each moved}}
  * {{before}} => {{after}}
{{/each}}
{{/if}}";

const DELETION_WARNING: &str = r"{{#if has_destroy}}
### :warning: Resource Deletion will happen :warning:
This plan contains resource delete operation. Please check the plan result very carefully!
{{/if}}";

const CHANGED_RESULT: &str = r"{{#if changed_result}}
<details><summary>Change Result (Click me)</summary>

```hcl
{{changed_result}}
```

</details>
{{/if}}";

const OUTSIDE_THE_TOOL: &str = r"{{#if outside_changes}}
<details><summary>:information_source: Objects have changed outside of Terraform</summary>

_This feature was introduced from [Terraform v0.15.4](https://github.com/hashicorp/terraform/releases/tag/v0.15.4)._

```hcl
{{outside_changes}}
```

</details>
{{/if}}";

const WARNING: &str = r"{{#if warning}}
## :warning: Warnings :warning:

```
{{warning}}
```
{{/if}}";

const ERROR_MESSAGES: &str = r"{{#if error_messages}}
## :warning: Errors

{{#each error_messages}}
* {{this}}
{{/each}}
{{/if}}";

const SUMMARY: &str = r"{{#if summary}}
### Summary

{{summary}}
{{/if}}";

const PLAN: &str = r"{{> plan_title}}

{{> link}}

{{> deletion_warning}}
{{> result}}
{{> updated_resources}}
{{> summary}}
{{> changed_result}}
{{> outside_the_tool}}
{{> warning}}
{{> error_messages}}";

const PLAN_PARSE_ERROR: &str = r"## :x: Plan Result{{#if target}} ({{target}}){{/if}}

{{> link}}

It failed to parse the result.

<details><summary>Details (Click me)</summary>

```
{{body}}
```

</details>
{{> error_messages}}";

const APPLY: &str = r"{{> apply_title}}

{{> link}}

{{> result}}
{{> summary}}
<details><summary>Details (Click me)</summary>

```
{{body}}
```

</details>
{{> warning}}
{{> error_messages}}";

const APPLY_PARSE_ERROR: &str = r"## :x: Apply Result{{#if target}} ({{target}}){{/if}}

{{> link}}

It failed to parse the result.

<details><summary>Details (Click me)</summary>

```
{{body}}
```

</details>";
