//! Renders a task's structured body back to markdown, and appends worklog
//! entries in place (spec §6: "new entries inserted before the next `##`
//! heading, not at EOF, so worklog entries stay inside their section").

use super::model::{AcceptanceItem, Task};

/// Render the full body (everything after the frontmatter fence) for a task.
pub fn render_body(task: &Task) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", task.title));
    if !task.description.is_empty() {
        out.push_str(&task.description);
        out.push_str("\n\n");
    }

    out.push_str("## Acceptance Criteria\n");
    for item in &task.acceptance_criteria {
        out.push_str(&render_checkbox_line(item));
        out.push('\n');
    }
    out.push('\n');

    out.push_str("## Worklog\n");
    for entry in &task.worklog {
        out.push_str("- ");
        out.push_str(entry);
        out.push('\n');
    }

    out
}

fn render_checkbox_line(item: &AcceptanceItem) -> String {
    format!("- [{}] {}", if item.checked { "x" } else { " " }, item.text)
}

/// Insert a new worklog entry into an already-rendered body, placing it at
/// the end of the `## Worklog` section (before the next `##` heading or
/// EOF), rather than blindly appending to the end of the file.
pub fn append_worklog_entry(body: &str, entry: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let worklog_idx = lines
        .iter()
        .position(|l| l.trim().eq_ignore_ascii_case("## worklog"));

    let Some(start) = worklog_idx else {
        // No worklog section yet — append one at EOF.
        let mut out = body.trim_end().to_string();
        out.push_str("\n\n## Worklog\n- ");
        out.push_str(entry);
        out.push('\n');
        return out;
    };

    // Find the end of the worklog section: next heading after `start`, or EOF.
    let mut end = lines.len();
    for (i, line) in lines.iter().enumerate().skip(start + 1) {
        if line.trim_start().starts_with("## ") {
            end = i;
            break;
        }
    }

    let mut out_lines: Vec<String> = lines[..end].iter().map(|s| s.to_string()).collect();
    out_lines.push(format!("- {entry}"));
    out_lines.extend(lines[end..].iter().map(|s| s.to_string()));

    let mut out = out_lines.join("\n");
    if body.ends_with('\n') {
        out.push('\n');
    }
    out
}
