//! Output-envelope parser for the `cursor` (cursor-agent) backend: NDJSON
//! lines where each event carries the *cumulative* assistant text seen so
//! far, not a delta. Kingdom computes the delta itself by diffing against
//! the previous snapshot so council transcripts still stream incrementally.

use serde::Deserialize;

use super::{BackendParser, StreamEvent};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CursorEvent {
    Session { id: Option<String> },
    Assistant { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Default)]
pub struct CursorParser {
    session_id: Option<String>,
    latest_text: String,
}

impl BackendParser for CursorParser {
    fn feed(&mut self, line: &str) -> Vec<StreamEvent> {
        let Ok(event) = serde_json::from_str::<CursorEvent>(line) else {
            return Vec::new();
        };
        match event {
            CursorEvent::Session { id } => {
                if id.is_some() {
                    self.session_id = id;
                }
                Vec::new()
            }
            CursorEvent::Assistant { text } => {
                let delta = text.strip_prefix(self.latest_text.as_str()).unwrap_or(&text).to_string();
                self.latest_text = text;
                if delta.is_empty() {
                    Vec::new()
                } else {
                    vec![StreamEvent::TextDelta(delta)]
                }
            }
            CursorEvent::Unknown => Vec::new(),
        }
    }

    fn resume_id(&self) -> Option<String> {
        self.session_id.clone()
    }

    fn final_text(&self) -> Option<String> {
        if self.latest_text.is_empty() {
            None
        } else {
            Some(self.latest_text.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_snapshots_diff_into_deltas() {
        let mut parser = CursorParser::default();
        let e1 = parser.feed(r#"{"type":"assistant","text":"Hel"}"#);
        let e2 = parser.feed(r#"{"type":"assistant","text":"Hello"}"#);
        assert!(matches!(&e1[0], StreamEvent::TextDelta(d) if d == "Hel"));
        assert!(matches!(&e2[0], StreamEvent::TextDelta(d) if d == "lo"));
        assert_eq!(parser.final_text().as_deref(), Some("Hello"));
    }

    #[test]
    fn non_extending_snapshot_emits_full_replacement() {
        let mut parser = CursorParser::default();
        parser.feed(r#"{"type":"assistant","text":"draft one"}"#);
        let events = parser.feed(r#"{"type":"assistant","text":"rewritten"}"#);
        assert!(matches!(&events[0], StreamEvent::TextDelta(d) if d == "rewritten"));
    }
}
