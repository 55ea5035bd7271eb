//! Output-envelope parser for the `claude` backend: stream-json events on
//! stdout, one JSON object per line. Grounded on the teacher's
//! `session/claude.rs` `ClaudeEvent` enum, trimmed to the fields Kingdom
//! actually needs (text deltas, the final result, and the session id used
//! for `--resume`).

use serde::Deserialize;

use super::{BackendParser, StreamEvent};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeEvent {
    System {
        session_id: Option<String>,
    },
    Assistant {
        message: AssistantMessage,
    },
    Result {
        result: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Default)]
pub struct ClaudeParser {
    session_id: Option<String>,
    result: Option<String>,
    last_assistant_text: Option<String>,
}

impl BackendParser for ClaudeParser {
    fn feed(&mut self, line: &str) -> Vec<StreamEvent> {
        let Ok(event) = serde_json::from_str::<ClaudeEvent>(line) else {
            return Vec::new();
        };
        match event {
            ClaudeEvent::System { session_id } => {
                if session_id.is_some() {
                    self.session_id = session_id;
                }
                Vec::new()
            }
            ClaudeEvent::Assistant { message } => {
                let mut deltas = Vec::new();
                let mut text = String::new();
                for block in message.content {
                    match block {
                        ContentBlock::Text { text: t } => {
                            deltas.push(StreamEvent::TextDelta(t.clone()));
                            text.push_str(&t);
                        }
                        ContentBlock::Thinking { thinking } => {
                            deltas.push(StreamEvent::ThinkingDelta(thinking));
                        }
                        ContentBlock::Other => {}
                    }
                }
                if !text.is_empty() {
                    self.last_assistant_text = Some(text);
                }
                deltas
            }
            ClaudeEvent::Result { result } => {
                self.result = result;
                Vec::new()
            }
            ClaudeEvent::Unknown => Vec::new(),
        }
    }

    fn resume_id(&self) -> Option<String> {
        self.session_id.clone()
    }

    fn final_text(&self) -> Option<String> {
        self.result.clone().or_else(|| self.last_assistant_text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_session_id_and_text_and_result() {
        let mut parser = ClaudeParser::default();
        parser.feed(r#"{"type":"system","session_id":"abc-123"}"#);
        let events = parser.feed(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}"#,
        );
        assert_eq!(events.len(), 1);
        parser.feed(r#"{"type":"result","result":"hello world"}"#);

        assert_eq!(parser.resume_id().as_deref(), Some("abc-123"));
        assert_eq!(parser.final_text().as_deref(), Some("hello world"));
    }

    #[test]
    fn falls_back_to_last_assistant_text_without_result_event() {
        let mut parser = ClaudeParser::default();
        parser.feed(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}"#);
        assert_eq!(parser.final_text().as_deref(), Some("partial"));
    }

    #[test]
    fn ignores_unparseable_lines() {
        let mut parser = ClaudeParser::default();
        assert!(parser.feed("not json").is_empty());
        assert!(parser.feed(r#"{"type":"tool_use"}"#).is_empty());
    }
}
