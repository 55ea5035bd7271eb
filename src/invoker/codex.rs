//! Output-envelope parser for the `codex` backend: NDJSON events where the
//! last `item.completed` event carrying an `assistant_message` item is the
//! turn's result. Session id arrives in a `session_configured` event.

use serde::Deserialize;

use super::{BackendParser, StreamEvent};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CodexEvent {
    SessionConfigured {
        session_id: Option<String>,
    },
    ItemCompleted {
        item: CodexItem,
    },
    AgentMessageDelta {
        delta: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct CodexItem {
    #[serde(rename = "type")]
    item_type: String,
    text: Option<String>,
}

#[derive(Default)]
pub struct CodexParser {
    session_id: Option<String>,
    last_assistant_message: Option<String>,
}

impl BackendParser for CodexParser {
    fn feed(&mut self, line: &str) -> Vec<StreamEvent> {
        let Ok(event) = serde_json::from_str::<CodexEvent>(line) else {
            return Vec::new();
        };
        match event {
            CodexEvent::SessionConfigured { session_id } => {
                if session_id.is_some() {
                    self.session_id = session_id;
                }
                Vec::new()
            }
            CodexEvent::ItemCompleted { item } if item.item_type == "assistant_message" => {
                if let Some(text) = item.text {
                    self.last_assistant_message = Some(text);
                }
                Vec::new()
            }
            CodexEvent::ItemCompleted { .. } => Vec::new(),
            CodexEvent::AgentMessageDelta { delta } => vec![StreamEvent::TextDelta(delta)],
            CodexEvent::Unknown => Vec::new(),
        }
    }

    fn resume_id(&self) -> Option<String> {
        self.session_id.clone()
    }

    fn final_text(&self) -> Option<String> {
        self.last_assistant_message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_assistant_message_wins() {
        let mut parser = CodexParser::default();
        parser.feed(r#"{"type":"session_configured","session_id":"sid-1"}"#);
        parser.feed(r#"{"type":"item_completed","item":{"type":"assistant_message","text":"first"}}"#);
        parser.feed(r#"{"type":"item_completed","item":{"type":"reasoning","text":"scratch"}}"#);
        parser.feed(r#"{"type":"item_completed","item":{"type":"assistant_message","text":"final"}}"#);

        assert_eq!(parser.resume_id().as_deref(), Some("sid-1"));
        assert_eq!(parser.final_text().as_deref(), Some("final"));
    }

    #[test]
    fn deltas_stream_through() {
        let mut parser = CodexParser::default();
        let events = parser.feed(r#"{"type":"agent_message_delta","delta":"hi"}"#);
        assert_eq!(events.len(), 1);
    }
}
