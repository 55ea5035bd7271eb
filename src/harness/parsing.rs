//! Sentinel-line parsing shared by the STATUS and VERDICT tags (spec §4.4
//! steps 4 and §4.4 termination-gate step 3): scan from the end of the
//! response for the last line matching `<TAG>: <VALUE>` after stripping
//! leading/trailing markdown decoration (`**`, `_`, `>`, `-`, `#`, backticks).

fn strip_decoration(line: &str) -> &str {
    line.trim_matches(|c: char| matches!(c, '*' | '_' | '>' | '-' | '#' | '`' | ' ' | '\t'))
}

/// Find the last line matching `tag: VALUE` (case-insensitive on both the
/// tag and the value) and return the uppercased value, if any.
pub fn extract_last_tag(response: &str, tag: &str) -> Option<String> {
    let prefix = format!("{}:", tag.to_uppercase());
    for line in response.lines().rev() {
        let stripped = strip_decoration(line);
        let upper = stripped.to_uppercase();
        if let Some(rest) = upper.strip_prefix(&prefix) {
            let value = rest.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// The first paragraph of a response: everything up to the first blank
/// line, or the whole response if there is none (spec §4.4 step 6: "a
/// worklog entry extracted from the first paragraph of the response").
pub fn first_paragraph(response: &str) -> String {
    response
        .split("\n\n")
        .next()
        .unwrap_or(response)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_status_with_markdown_decoration() {
        let response = "Did the work.\n\n**STATUS: DONE**";
        assert_eq!(extract_last_tag(response, "STATUS").as_deref(), Some("DONE"));
    }

    #[test]
    fn extracts_status_behind_blockquote_and_heading_markers() {
        assert_eq!(extract_last_tag("> STATUS: BLOCKED", "STATUS").as_deref(), Some("BLOCKED"));
        assert_eq!(extract_last_tag("# STATUS: CONTINUE", "STATUS").as_deref(), Some("CONTINUE"));
    }

    #[test]
    fn picks_the_last_matching_line_not_the_first() {
        let response = "STATUS: CONTINUE\nmore work\nSTATUS: DONE";
        assert_eq!(extract_last_tag(response, "STATUS").as_deref(), Some("DONE"));
    }

    #[test]
    fn missing_tag_returns_none() {
        assert_eq!(extract_last_tag("no sentinel here", "VERDICT"), None);
    }

    #[test]
    fn first_paragraph_stops_at_blank_line() {
        let response = "Investigated the flaky test.\n\nThen fixed it.\n\nSTATUS: DONE";
        assert_eq!(first_paragraph(response), "Investigated the flaky test.");
    }
}
