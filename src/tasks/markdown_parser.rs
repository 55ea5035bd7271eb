//! Parses a task's markdown body into title / description / acceptance
//! criteria / worklog (spec §6, "Task body").

use super::model::AcceptanceItem;

pub struct ParsedBody {
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<AcceptanceItem>,
    pub worklog: Vec<String>,
}

/// Parse a task body of the form:
///
/// ```text
/// # Title
///
/// Description paragraph(s).
///
/// ## Acceptance Criteria
/// - [ ] item one
/// - [x] item two
///
/// ## Worklog
/// - entry one
/// - entry two
/// ```
pub fn parse_body(body: &str) -> ParsedBody {
    let mut title = String::new();
    let mut description_lines = Vec::new();
    let mut acceptance_criteria = Vec::new();
    let mut worklog = Vec::new();

    #[derive(PartialEq)]
    enum Section {
        BeforeTitle,
        Description,
        Acceptance,
        Worklog,
        Other,
    }
    let mut section = Section::BeforeTitle;

    for line in body.lines() {
        let trimmed = line.trim_end();
        if let Some(rest) = trimmed.strip_prefix("# ") {
            if section == Section::BeforeTitle && title.is_empty() {
                title = rest.trim().to_string();
                section = Section::Description;
                continue;
            }
        }
        if let Some(rest) = trimmed.trim_start().strip_prefix("## ") {
            let heading = rest.trim().to_ascii_lowercase();
            section = if heading == "acceptance criteria" {
                Section::Acceptance
            } else if heading == "worklog" {
                Section::Worklog
            } else {
                Section::Other
            };
            continue;
        }

        match section {
            Section::Description => {
                description_lines.push(trimmed.to_string());
            }
            Section::Acceptance => {
                if let Some(item) = parse_checkbox_line(trimmed) {
                    acceptance_criteria.push(item);
                }
            }
            Section::Worklog => {
                if let Some(entry) = trimmed.trim_start().strip_prefix("- ") {
                    worklog.push(entry.to_string());
                }
            }
            Section::BeforeTitle | Section::Other => {}
        }
    }

    let description = description_lines
        .into_iter()
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    ParsedBody {
        title,
        description,
        acceptance_criteria,
        worklog,
    }
}

fn parse_checkbox_line(line: &str) -> Option<AcceptanceItem> {
    let line = line.trim_start();
    let rest = line.strip_prefix("- [")?;
    let (mark, rest) = rest.split_at(1);
    let rest = rest.strip_prefix("] ")?;
    let checked = match mark {
        "x" | "X" => true,
        " " => false,
        _ => return None,
    };
    Some(AcceptanceItem {
        text: rest.trim().to_string(),
        checked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_body() {
        let body = "\
# Add retry logic

This adds exponential backoff to the HTTP client.

## Acceptance Criteria
- [ ] retries 3 times
- [x] logs each attempt

## Worklog
- started investigating
- wrote first pass
";
        let parsed = parse_body(body);
        assert_eq!(parsed.title, "Add retry logic");
        assert_eq!(
            parsed.description,
            "This adds exponential backoff to the HTTP client."
        );
        assert_eq!(parsed.acceptance_criteria.len(), 2);
        assert!(!parsed.acceptance_criteria[0].checked);
        assert!(parsed.acceptance_criteria[1].checked);
        assert_eq!(parsed.worklog, vec!["started investigating", "wrote first pass"]);
    }

    #[test]
    fn missing_sections_default_empty() {
        let parsed = parse_body("# Just a title\n\nJust a description.\n");
        assert_eq!(parsed.title, "Just a title");
        assert!(parsed.acceptance_criteria.is_empty());
        assert!(parsed.worklog.is_empty());
    }
}
