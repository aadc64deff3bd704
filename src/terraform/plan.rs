use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::LazyLock;
use tracing::debug;

use super::types::{MovedResource, ParseError, ParseResult};
use super::{failure_block, join_lines, Parser, FAIL};

static PASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(Plan: \d|No changes\.|Changes to Outputs:$)").expect("invalid pass regex")
});

static WARNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(│ |\| )?Warning: ").expect("invalid warning regex"));

// "0 to destroy" must not count as a destroy
static HAS_DESTROY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[1-9][0-9]* to destroy\.").expect("invalid destroy regex"));

static HAS_NO_CHANGES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^No changes\.|\b0 to add, 0 to change, 0 to destroy\.")
        .expect("invalid no-changes regex")
});

const OUTSIDE_BANNERS: [&str; 2] = [
    "Note: Objects have changed outside of Terraform",
    "Note: Objects have changed outside of OpenTofu",
];
const OUTSIDE_END_PREFIX: &str = "Unless you have made equivalent changes to your configuration";
const ACTIONS_BANNERS: [&str; 2] = [
    "Terraform will perform the following actions:",
    "OpenTofu will perform the following actions:",
];
const OUTPUTS_BANNER: &str = "Changes to Outputs:";
const RULE_PREFIXES: [&str; 2] = ["─────", "-----"];

/// What a resource header line says will happen to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Delete,
    Replace,
    Import,
    /// `# (imported from "...")`, the resource is named on the previous line
    ImportedFrom,
    /// `# (moved from ...)`, the new address is named on the previous line
    MovedFrom,
    Move,
}

/// Evaluated top to bottom, first match wins.
static ACTIONS: LazyLock<Vec<(Regex, Action)>> = LazyLock::new(|| {
    [
        (r"^ *# (.*) will be created$", Action::Create),
        (r"^ *# (.*) will be updated in-place$", Action::Update),
        (r"^ *# (.*) will be destroyed$", Action::Delete),
        (r"^ *# (.*?)(?: is tainted, so)? must be replaced$", Action::Replace),
        (r"^ *# (.*?) will be replaced, as requested$", Action::Replace),
        (r"^ *# (.*?) will be imported$", Action::Import),
        (r"^ *# \(imported from (.*?)\)$", Action::ImportedFrom),
        (r"^ *# \(moved from (.*?)\)$", Action::MovedFrom),
        (r"^ *# (\S+) has moved to (\S+)$", Action::Move),
    ]
    .into_iter()
    .map(|(pattern, action)| (Regex::new(pattern).expect("invalid resource regex"), action))
    .collect()
});

fn classify(line: &str) -> Option<(Action, Captures<'_>)> {
    ACTIONS
        .iter()
        .find_map(|(pattern, action)| pattern.captures(line).map(|caps| (*action, caps)))
}

/// Address named by the resource header a backreference line follows.
fn header_address(line: &str) -> Option<String> {
    match classify(line)? {
        (Action::ImportedFrom | Action::MovedFrom, _) => None,
        (_, caps) => caps.get(1).map(|m| m.as_str().to_string()),
    }
}

fn is_rule(line: &str) -> bool {
    RULE_PREFIXES.iter().any(|rule| line.starts_with(rule))
}

/// A block of lines whose boundaries are discovered while scanning.
#[derive(Debug, Default)]
struct Span {
    start: Option<usize>,
    end: Option<usize>,
}

impl Span {
    fn open(&mut self, at: usize) {
        if self.start.is_none() {
            self.start = Some(at);
        }
    }

    fn close(&mut self, at: usize) {
        if self.start.is_some() && self.end.is_none() {
            self.end = Some(at);
        }
    }

    fn range(&self, fallback_end: usize) -> Option<Range<usize>> {
        let start = self.start?;
        let end = self.end.unwrap_or(fallback_end).max(start);
        Some(start..end)
    }
}

#[derive(Debug, Default)]
struct Resources {
    created: Vec<String>,
    updated: Vec<String>,
    deleted: Vec<String>,
    replaced: Vec<String>,
    imported: Vec<String>,
    moved: Vec<MovedResource>,
}

impl Resources {
    fn record(&mut self, lines: &[&str], index: usize) {
        let Some((action, caps)) = classify(lines[index]) else {
            return;
        };
        let group = |n: usize| caps.get(n).map_or_else(String::new, |m| m.as_str().to_string());

        match action {
            Action::Create => self.created.push(group(1)),
            Action::Update => self.updated.push(group(1)),
            Action::Delete => self.deleted.push(group(1)),
            Action::Replace => self.replaced.push(group(1)),
            Action::Import => self.imported.push(group(1)),
            Action::Move => self.moved.push(MovedResource {
                before: group(1),
                after: group(2),
            }),
            Action::ImportedFrom | Action::MovedFrom => {
                let Some(previous) = index.checked_sub(1).map(|i| lines[i]) else {
                    return;
                };
                let Some(address) = header_address(previous) else {
                    return;
                };
                if action == Action::ImportedFrom {
                    self.imported.push(address);
                } else {
                    self.moved.push(MovedResource {
                        before: group(1),
                        after: address,
                    });
                }
            }
        }
    }
}

/// Parser for `terraform plan` / `tofu plan` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanParser;

impl PlanParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for PlanParser {
    fn parse(&self, body: &str) -> ParseResult {
        if !PASS.is_match(body) && !FAIL.is_match(body) {
            debug!("plan output matches neither pass nor fail signature");
            return ParseResult::unparsable(ParseError::UnrecognizedPlan);
        }

        let lines: Vec<&str> = body.split('\n').collect();
        let mut outside = Span::default();
        let mut changes = Span::default();
        let mut warning = Span::default();
        let mut rules = Vec::new();
        let mut first_match = None;
        let mut resources = Resources::default();

        for (i, line) in lines.iter().copied().enumerate() {
            if OUTSIDE_BANNERS.contains(&line) {
                outside.open(i + 1);
            }
            if line.starts_with(OUTSIDE_END_PREFIX) {
                outside.close(i + 1);
            }
            if ACTIONS_BANNERS.contains(&line) {
                changes.open(i + 1);
            }
            // Output-only plans have no actions banner, keep the outputs banner in the block.
            if line == OUTPUTS_BANNER {
                changes.open(i);
            }
            if is_rule(line) {
                rules.push(i);
                warning.close(i);
            } else if WARNING.is_match(line) {
                warning.open(i);
            }
            if first_match.is_none() && (FAIL.is_match(line) || PASS.is_match(line)) {
                first_match = Some(i);
            }
            resources.record(&lines, i);
        }

        let Some(first_match) = first_match else {
            return ParseResult::unparsable(ParseError::UnrecognizedPlan);
        };
        let first_line = lines[first_match];
        let has_error = FAIL.is_match(first_line);
        let has_destroy = !has_error && HAS_DESTROY.is_match(first_line);
        let has_no_changes = !has_error && HAS_NO_CHANGES.is_match(first_line);

        let result = if has_error {
            failure_block(&lines, first_match)
        } else {
            first_line.trim().to_string()
        };

        let changes_range = changes.start.map(|start| {
            let end = if has_error {
                rules
                    .iter()
                    .rev()
                    .copied()
                    .find(|&rule| rule >= start && rule < first_match)
            } else {
                rules.iter().copied().find(|&rule| rule >= start)
            };
            start..end.unwrap_or(lines.len()).max(start)
        });
        let outside_range = outside.range(if first_match > outside.start.unwrap_or(0) {
            first_match
        } else {
            lines.len()
        });
        let warning_range = warning.range(lines.len());

        debug!(
            first_match,
            has_error,
            has_destroy,
            has_no_changes,
            created = resources.created.len(),
            updated = resources.updated.len(),
            deleted = resources.deleted.len(),
            "parsed plan output"
        );

        ParseResult {
            result,
            changed_result: span_text(&lines, changes_range),
            outside_changes: span_text(&lines, outside_range),
            warning: span_text(&lines, warning_range),
            has_add_or_update_only: !has_no_changes && !has_destroy && !has_error,
            has_destroy,
            has_no_changes,
            has_error,
            has_parse_error: false,
            created: resources.created,
            updated: resources.updated,
            deleted: resources.deleted,
            replaced: resources.replaced,
            imported: resources.imported,
            moved: resources.moved,
            error: None,
        }
    }
}

fn span_text(lines: &[&str], range: Option<Range<usize>>) -> String {
    range
        .map(|range| join_lines(lines[range].iter().copied()).trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE_PLAN: &str = r#"
Terraform used the selected providers to generate the following execution
plan. Resource actions are indicated with the following symbols:
  + create

Terraform will perform the following actions:

  # null_resource.foo will be created
  + resource "null_resource" "foo" {
      + id = (known after apply)
    }

Plan: 1 to add, 0 to change, 0 to destroy.

─────────────────────────────────────────────────────────────────────────────

Note: You didn't use the -out option to save this plan, so Terraform can't
guarantee to take exactly these actions if you run "terraform apply" now.
"#;

    const DRIFT_PLAN: &str = r#"
Note: Objects have changed outside of Terraform

Terraform detected the following changes made outside of Terraform since the
last "terraform apply":

  # null_resource.bar has been deleted
  - resource "null_resource" "bar" {
      - id = "123" -> null
    }

Unless you have made equivalent changes to your configuration, or ignored the
relevant attributes using ignore_changes, the following plan may include
actions to undo or respond to these changes.

─────────────────────────────────────────────────────────────────────────────

OpenTofu will perform the following actions:

  # null_resource.bar will be created
  + resource "null_resource" "bar" {
      + id = (known after apply)
    }

  # null_resource.baz will be destroyed
  - resource "null_resource" "baz" {
      - id = "456" -> null
    }

Plan: 1 to add, 0 to change, 1 to destroy.
"#;

    const OUTPUTS_ONLY_PLAN: &str = r#"
Changes to Outputs:
  + foo = "bar"

You can apply this plan to save these new output values to the Terraform
state, without changing any real infrastructure.

─────────────────────────────────────────────────────────────────────────────
"#;

    const ERROR_PLAN: &str = r#"
Terraform will perform the following actions:

  # null_resource.foo will be created
  + resource "null_resource" "foo" {}

─────────────────────────────────────────────────────────────────────────────
╷
│ Error: Unsupported argument
│
│   on main.tf line 3, in resource "null_resource" "foo":
│    3:   foo = "bar"
│
│ An argument named "foo" is not expected here.
╵
"#;

    const WARNING_PLAN: &str = r#"
No changes. Your infrastructure matches the configuration.

╷
│ Warning: Argument is deprecated
│
│ Use the aws_s3_bucket_versioning resource instead
╵

─────────────────────────────────────────────────────────────────────────────
"#;

    const ACTIONS_PLAN: &str = r#"
Terraform will perform the following actions:

  # aws_instance.new will be updated in-place
  # (moved from aws_instance.old)
  # aws_instance.a has moved to aws_instance.b
  # aws_instance.c must be replaced
  # aws_instance.d is tainted, so must be replaced
  # aws_instance.e will be replaced, as requested
  # aws_instance.f will be imported
  # aws_instance.g will be updated in-place
  # (imported from "i-123")

Plan: 1 to import, 3 to add, 2 to change, 3 to destroy.
"#;

    fn parse(body: &str) -> ParseResult {
        PlanParser::new().parse(body)
    }

    #[test]
    fn test_create_plan() {
        let result = parse(CREATE_PLAN);
        assert!(!result.has_parse_error);
        assert!(result.has_add_or_update_only);
        assert!(!result.has_destroy);
        assert!(!result.has_no_changes);
        assert!(!result.has_error);
        assert_eq!(result.result, "Plan: 1 to add, 0 to change, 0 to destroy.");
        assert_eq!(result.created, vec!["null_resource.foo"]);
        assert!(result.changed_result.starts_with("# null_resource.foo will be created"));
        assert!(result
            .changed_result
            .ends_with("Plan: 1 to add, 0 to change, 0 to destroy."));
        assert!(result.outside_changes.is_empty());
        assert!(result.warning.is_empty());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_no_changes_plan() {
        let result = parse("No changes. Infrastructure is up-to-date.");
        assert!(result.has_no_changes);
        assert!(!result.has_add_or_update_only);
        assert_eq!(result.result, "No changes. Infrastructure is up-to-date.");
        assert!(result.created.is_empty());
        assert!(result.updated.is_empty());
        assert!(result.deleted.is_empty());
        assert!(result.replaced.is_empty());
        assert!(result.imported.is_empty());
        assert!(result.moved.is_empty());
        assert!(result.changed_result.is_empty());
    }

    #[test]
    fn test_zero_counts_are_no_changes() {
        let result = parse("Plan: 0 to add, 0 to change, 0 to destroy.");
        assert!(result.has_no_changes);
        assert!(!result.has_destroy);

        let result = parse("Plan: 10 to add, 0 to change, 0 to destroy.");
        assert!(!result.has_no_changes);
        assert!(result.has_add_or_update_only);
    }

    #[test]
    fn test_destroy_count() {
        for add in [0, 1, 12] {
            for change in [0, 3] {
                for destroy in [0, 1, 2, 10, 105] {
                    let body = format!("Plan: {add} to add, {change} to change, {destroy} to destroy.\n");
                    let result = parse(&body);
                    assert_eq!(result.has_destroy, destroy >= 1, "{body}");
                }
            }
        }
    }

    #[test]
    fn test_drift_and_destroy() {
        let result = parse(DRIFT_PLAN);
        assert!(result.has_destroy);
        assert!(!result.has_add_or_update_only);
        assert_eq!(result.created, vec!["null_resource.bar"]);
        assert_eq!(result.deleted, vec!["null_resource.baz"]);
        assert!(result
            .outside_changes
            .starts_with("Terraform detected the following changes made outside of Terraform"));
        assert!(result.outside_changes.ends_with(
            "Unless you have made equivalent changes to your configuration, or ignored the"
        ));
        assert!(result.changed_result.starts_with("# null_resource.bar will be created"));
        assert!(result
            .changed_result
            .ends_with("Plan: 1 to add, 0 to change, 1 to destroy."));
    }

    #[test]
    fn test_outputs_only_plan_keeps_banner() {
        let result = parse(OUTPUTS_ONLY_PLAN);
        assert!(result.has_add_or_update_only);
        assert_eq!(result.result, "Changes to Outputs:");
        assert!(result.changed_result.starts_with("Changes to Outputs:"));
        assert!(result.changed_result.contains("+ foo = \"bar\""));
        assert!(result
            .changed_result
            .ends_with("without changing any real infrastructure."));
    }

    #[test]
    fn test_error_plan() {
        let result = parse(ERROR_PLAN);
        assert!(result.has_error);
        assert!(!result.has_add_or_update_only);
        assert!(!result.has_destroy);
        assert!(result.result.starts_with("Error: Unsupported argument"));
        assert!(result.result.contains("  on main.tf line 3"));
        assert!(result.result.contains("An argument named \"foo\" is not expected here."));
        assert!(!result.result.contains('│'));
        assert!(result
            .changed_result
            .ends_with(r#"+ resource "null_resource" "foo" {}"#));
        assert!(!result.changed_result.contains("Error:"));
    }

    #[test]
    fn test_first_matching_line_decides() {
        let body = "Terraform will perform the following actions:\n\n  # a.b will be created\n\n\
            Plan: 1 to add, 0 to change, 0 to destroy.\n\nError: late failure\n";
        let result = parse(body);
        assert!(!result.has_error);
        assert!(result.has_add_or_update_only);
        assert_eq!(result.result, "Plan: 1 to add, 0 to change, 0 to destroy.");
        assert_eq!(result.created, vec!["a.b"]);

        let result = parse("Error: early failure\n\nPlan: 0 to add, 0 to change, 1 to destroy.\n");
        assert!(result.has_error);
        assert!(!result.has_destroy);
        assert!(result.result.starts_with("Error: early failure"));
    }

    #[test]
    fn test_outputs_banner_before_actions_banner() {
        let body = "Changes to Outputs:\n  + foo = \"bar\"\n\n\
            Terraform will perform the following actions:\n\n  # a.b will be created\n\n\
            Plan: 1 to add, 0 to change, 0 to destroy.\n";
        let result = parse(body);
        assert!(result.changed_result.starts_with("Changes to Outputs:"));
        assert!(result.changed_result.contains("# a.b will be created"));
        assert_eq!(result.result, "Changes to Outputs:");
    }

    #[test]
    fn test_plain_error() {
        let result = parse("Error: something broke\n\ndetails here\n");
        assert!(result.has_error);
        assert!(result.result.starts_with("Error: something broke"));
        assert_eq!(result.result, "Error: something broke\n\ndetails here");
        assert!(!result.has_parse_error);
    }

    #[test]
    fn test_warning_block() {
        let result = parse(WARNING_PLAN);
        assert!(result.has_no_changes);
        assert!(result.warning.starts_with("│ Warning: Argument is deprecated"));
        assert!(result.warning.ends_with('╵'));
    }

    #[test]
    fn test_warning_block_ends_at_dashed_rule() {
        let body = "No changes.\n\n| Warning: Deprecated\n|\n| Use something else\n-----\ntrailing text\n";
        let result = parse(body);
        assert_eq!(result.warning, "| Warning: Deprecated\n|\n| Use something else");
    }

    #[test]
    fn test_backreference_to_address_with_spaces() {
        let body = concat!(
            "  # module.m[\"a b\"].x will be updated in-place\n",
            "  # (moved from module.m[\"a b\"].old)\n",
            "  # module.m[\"c d\"].y will be imported\n",
            "  # module.m[\"c d\"].z will be updated in-place\n",
            "  # (imported from \"i-1\")\n",
            "Plan: 1 to import, 0 to add, 2 to change, 0 to destroy.\n",
        );
        let result = parse(body);
        assert_eq!(
            result.moved,
            vec![MovedResource {
                before: "module.m[\"a b\"].old".to_string(),
                after: "module.m[\"a b\"].x".to_string(),
            }]
        );
        assert_eq!(
            result.imported,
            vec!["module.m[\"c d\"].y", "module.m[\"c d\"].z"]
        );
    }

    #[test]
    fn test_resource_actions() {
        let result = parse(ACTIONS_PLAN);
        assert!(result.has_destroy);
        assert_eq!(result.updated, vec!["aws_instance.new", "aws_instance.g"]);
        assert_eq!(
            result.replaced,
            vec!["aws_instance.c", "aws_instance.d", "aws_instance.e"]
        );
        assert_eq!(result.imported, vec!["aws_instance.f", "aws_instance.g"]);
        assert_eq!(
            result.moved,
            vec![
                MovedResource {
                    before: "aws_instance.old".to_string(),
                    after: "aws_instance.new".to_string(),
                },
                MovedResource {
                    before: "aws_instance.a".to_string(),
                    after: "aws_instance.b".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_backreference_on_first_line_is_skipped() {
        let result = parse("  # (moved from aws_instance.old)\nPlan: 0 to add, 1 to change, 0 to destroy.");
        assert!(result.moved.is_empty());
        assert!(result.has_add_or_update_only);
    }

    #[test]
    fn test_unparsable_plan() {
        for body in ["", "random text", "Plan:  nothing", "  Error: indented"] {
            let result = parse(body);
            assert!(result.has_parse_error, "{body:?}");
            assert_eq!(result.error, Some(ParseError::UnrecognizedPlan));
            assert!(result.result.is_empty());
            assert!(result.changed_result.is_empty());
            assert!(result.warning.is_empty());
            assert!(result.created.is_empty());
            assert!(result.moved.is_empty());
        }
    }

    #[test]
    fn test_classify_order() {
        assert_eq!(
            classify("  # a.b will be created").map(|(a, _)| a),
            Some(Action::Create)
        );
        assert_eq!(
            classify("  # a.b is tainted, so must be replaced").map(|(a, c)| (a, c[1].to_string())),
            Some((Action::Replace, "a.b".to_string()))
        );
        assert_eq!(
            classify(r#"  # (imported from "x")"#).map(|(a, _)| a),
            Some(Action::ImportedFrom)
        );
        assert_eq!(classify("  # a.b has been deleted").map(|(a, _)| a), None);
    }
}
