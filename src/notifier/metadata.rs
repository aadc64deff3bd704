//! Invisible trailer that identifies a posted comment.
//!
//! The trailer is a single-line HTML comment carrying a JSON object, so it
//! never shows up in rendered markdown:
//!
//! ```text
//! <!-- tfnotify-metadata:v1 {"Command":"plan","Program":"tfnotify",...} -->
//! ```

use serde_json::{Map, Value};

pub type Metadata = Map<String, Value>;

pub const PROGRAM: &str = "tfnotify";

const PREFIX: &str = "<!-- tfnotify-metadata:v1 ";
const SUFFIX: &str = " -->";

/// Encode metadata as a trailer to append to a comment body.
pub fn embed(metadata: &Metadata) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(metadata)?;
    // `>` only occurs inside JSON strings; escaping it keeps `-->` out of the comment.
    let json = json.replace('>', "\\u003e");
    Ok(format!("\n{PREFIX}{json}{SUFFIX}"))
}

/// Recover the metadata of the last trailer in a comment body.
///
/// Bodies without a trailer, or with a trailer written by something else,
/// yield `None`.
pub fn extract(body: &str) -> Option<Metadata> {
    let start = body.rfind(PREFIX)? + PREFIX.len();
    let rest = &body[start..];
    let end = rest.find(SUFFIX)?;
    serde_json::from_str(&rest[..end]).ok()
}

/// Whether a trailer was written by this tool for the given command and target.
pub fn matches(metadata: &Metadata, command: &str, target: &str) -> bool {
    let field = |key: &str| metadata.get(key).and_then(Value::as_str).unwrap_or("");
    field("Program") == PROGRAM && field("Command") == command && field("Target") == target
}
