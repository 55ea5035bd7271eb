//! Thread History Formatter (spec §4.6) — renders a thread as a plain
//! conversation block for injection into council-review and group-chat
//! prompts.

use super::model::SequencedMessage;

/// Strip a leading `<sender>:` prefix from a body, if present, to avoid
/// double-prefixing when history is recursively injected into a later
/// prompt (the sender is known from the message's own `from` field).
fn strip_sender_prefix<'a>(body: &'a str, sender: &str) -> &'a str {
    let prefix = format!("{sender}:");
    match body.strip_prefix(prefix.as_str()) {
        Some(rest) => rest.trim_start_matches(' '),
        None => body,
    }
}

/// Render `messages` as `"[Previous conversation]\n<from>: <body>\n\n..."`
/// followed by a trailing instruction addressed to `target_name`.
pub fn format_history(messages: &[SequencedMessage], target_name: &str) -> String {
    let mut out = String::from("[Previous conversation]\n");
    for m in messages {
        let body = strip_sender_prefix(&m.message.body, &m.message.from);
        out.push_str(&m.message.from);
        out.push_str(": ");
        out.push_str(body);
        out.push_str("\n\n");
    }
    out.push_str("---\n");
    out.push_str(&format!(
        "You are {target_name}. Continue the discussion. Respond to the points raised above."
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::model::Message;
    use chrono::Utc;

    fn msg(from: &str, body: &str) -> SequencedMessage {
        SequencedMessage {
            seqno: 1,
            message: Message {
                from: from.to_string(),
                to: None,
                timestamp: Utc::now(),
                refs: None,
                unknown: Default::default(),
                body: body.to_string(),
            },
        }
    }

    #[test]
    fn renders_conversation_block() {
        let out = format_history(&[msg("king", "hi there"), msg("claude", "hello")], "codex");
        assert!(out.starts_with("[Previous conversation]\n"));
        assert!(out.contains("king: hi there"));
        assert!(out.contains("claude: hello"));
        assert!(out.ends_with("You are codex. Continue the discussion. Respond to the points raised above."));
    }

    #[test]
    fn strips_leading_sender_prefix_to_avoid_double_prefixing() {
        let out = format_history(&[msg("king", "king: hi there")], "codex");
        assert!(out.contains("king: hi there"));
        assert!(!out.contains("king: king: hi there"));
    }
}
