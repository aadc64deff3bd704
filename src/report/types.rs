use serde::Serialize;
use std::collections::BTreeMap;

use crate::terraform::MovedResource;

/// Data handed to the comment templates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderContext {
    /// `plan` or `apply`
    pub command: String,
    pub target: String,
    pub vars: BTreeMap<String, String>,
    /// CI run URL
    pub link: String,
    pub result: String,
    pub changed_result: String,
    pub outside_changes: String,
    pub warning: String,
    /// Full combined output of the command
    pub body: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub has_add_or_update_only: bool,
    pub has_destroy: bool,
    pub has_no_changes: bool,
    pub has_error: bool,
    pub has_parse_error: bool,
    /// Why the output could not be parsed
    pub parse_error: String,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub replaced: Vec<String>,
    pub imported: Vec<String>,
    pub moved: Vec<MovedResource>,
    /// Non-fatal problems collected while notifying
    pub error_messages: Vec<String>,
    /// AI generated summary, empty when disabled
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_serializes_moved_resources() {
        let context = RenderContext {
            moved: vec![MovedResource {
                before: "a.old".to_string(),
                after: "a.new".to_string(),
            }],
            ..RenderContext::default()
        };
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["moved"][0]["before"], "a.old");
        assert_eq!(value["moved"][0]["after"], "a.new");
        assert_eq!(value["has_destroy"], false);
    }
}
