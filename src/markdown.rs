//! Shared YAML-frontmatter + markdown-body splitting, used by both the
//! thread store (messages) and the task store (tickets).
//!
//! Format: an opening `---` line, YAML key-value (or block) lines, a
//! closing `---` line, then the markdown body verbatim.

use crate::errors::{KdError, KdResult};

/// Split a file's contents into its raw frontmatter YAML block and body.
/// Returns `(yaml, body)`. A file with no `---` fence has an empty
/// frontmatter block and the whole file as body.
pub fn split_frontmatter(contents: &str) -> (&str, &str) {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    if !contents.starts_with("---") {
        return ("", contents);
    }
    let rest = &contents[3..];
    let rest = rest.strip_prefix('\n').unwrap_or(rest);

    match rest.find("\n---") {
        Some(end) => {
            let yaml = &rest[..end];
            let after = &rest[end + 4..];
            // Skip to the end of the closing fence line.
            let after = match after.find('\n') {
                Some(nl) => &after[nl + 1..],
                None => "",
            };
            (yaml, after)
        }
        None => ("", contents),
    }
}

/// Parse a document's frontmatter into `T` and return `(value, body)`.
pub fn parse<T: serde::de::DeserializeOwned>(contents: &str) -> KdResult<(T, String)> {
    let (yaml, body) = split_frontmatter(contents);
    let value: T = if yaml.trim().is_empty() {
        serde_yaml::from_str("{}")?
    } else {
        serde_yaml::from_str(yaml)?
    };
    Ok((value, body.to_string()))
}

/// Serialize `value` as a frontmatter block followed by `body`.
pub fn compose<T: serde::Serialize>(value: &T, body: &str) -> KdResult<String> {
    let yaml = serde_yaml::to_string(value).map_err(KdError::from)?;
    let yaml = yaml.trim_end();
    Ok(format!("---\n{yaml}\n---\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        from: String,
        n: u32,
    }

    #[test]
    fn round_trips_frontmatter_and_body() {
        let doc = compose(&Sample { from: "king".into(), n: 3 }, "hello\nworld\n").unwrap();
        let (parsed, body): (Sample, String) = parse(&doc).unwrap();
        assert_eq!(parsed, Sample { from: "king".into(), n: 3 });
        assert_eq!(body, "hello\nworld\n");
    }

    #[test]
    fn no_fence_is_all_body() {
        let (yaml, body) = split_frontmatter("just a body\nwith lines\n");
        assert_eq!(yaml, "");
        assert_eq!(body, "just a body\nwith lines\n");
    }
}
