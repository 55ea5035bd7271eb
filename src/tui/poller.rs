//! File-tailing poll loop (spec §4.7). Pure logic, deliberately kept free
//! of any ratatui/crossterm dependency so it can be driven by a fixed-
//! interval tick in `app.rs` and exercised directly in tests.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::errors::KdResult;
use crate::invoker::{BackendParser, StreamEvent};
use crate::invoker::claude::ClaudeParser;
use crate::invoker::codex::CodexParser;
use crate::invoker::cursor::CursorParser;
use crate::layout::Layout;
use crate::threads::{SequencedMessage, ThreadStore};

#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    NewMessage(SequencedMessage),
    StreamStarted { member: String },
    StreamDelta { member: String, text: String },
    ThinkingDelta { member: String, text: String },
    AgentError { member: String, text: String },
}

/// Tracks per-thread poll state: the highest message ordinal already
/// dispatched, and a byte offset into each member's stream file.
pub struct ThreadPoller {
    last_seen_seqno: u32,
    stream_offsets: HashMap<String, u64>,
}

impl ThreadPoller {
    pub fn new() -> Self {
        Self { last_seen_seqno: 0, stream_offsets: HashMap::new() }
    }

    /// Scan for message files with ordinal beyond what's been seen so far
    /// (spec §4.7 step 1).
    pub fn poll_messages(&mut self, layout: &Layout, branch: &str, thread: &str) -> KdResult<Vec<PollEvent>> {
        let store = ThreadStore::new(layout);
        let messages = store.list_messages(branch, thread)?;
        let mut events = Vec::new();
        for m in messages {
            if m.seqno > self.last_seen_seqno {
                self.last_seen_seqno = m.seqno;
                events.push(PollEvent::NewMessage(m));
            }
        }
        Ok(events)
    }

    /// Read new bytes from a member's stream file and feed them through the
    /// backend-appropriate parser. Handles the shrink/restart case by
    /// resetting the tracked offset to 0 (spec §4.7 step 2).
    pub fn poll_stream(&mut self, backend: &str, member: &str, path: &std::path::Path) -> Vec<PollEvent> {
        let Ok(mut file) = std::fs::File::open(path) else {
            return Vec::new();
        };
        let Ok(metadata) = file.metadata() else {
            return Vec::new();
        };
        let size = metadata.len();
        let offset = self.stream_offsets.entry(member.to_string()).or_insert(0);
        let first_read = *offset == 0;

        if size < *offset {
            *offset = 0;
        }
        if file.seek(SeekFrom::Start(*offset)).is_err() {
            return Vec::new();
        }

        let mut buf = String::new();
        if file.read_to_string(&mut buf).is_err() {
            return Vec::new();
        }

        // Retain a trailing partial line (no newline yet) for the next tick.
        let (consumed, complete): (u64, &str) = match buf.rfind('\n') {
            Some(idx) => ((idx + 1) as u64, &buf[..idx]),
            None => (0, ""),
        };
        *offset += consumed;

        let mut events = Vec::new();
        if first_read && !complete.is_empty() {
            events.push(PollEvent::StreamStarted { member: member.to_string() });
        }
        for line in complete.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.extend(feed_line(backend, member, line));
        }
        events
    }
}

impl Default for ThreadPoller {
    fn default() -> Self {
        Self::new()
    }
}

fn feed_line(backend: &str, member: &str, line: &str) -> Vec<PollEvent> {
    fn translate(member: &str, events: Vec<StreamEvent>) -> Vec<PollEvent> {
        events
            .into_iter()
            .map(|e| match e {
                StreamEvent::TextDelta(text) => PollEvent::StreamDelta { member: member.to_string(), text },
                StreamEvent::ThinkingDelta(text) => PollEvent::ThinkingDelta { member: member.to_string(), text },
            })
            .collect()
    }
    match backend {
        "claude" => translate(member, ClaudeParser::default().feed(line)),
        "codex" => translate(member, CodexParser::default().feed(line)),
        "cursor" => translate(member, CursorParser::default().feed(line)),
        _ => vec![PollEvent::AgentError { member: member.to_string(), text: format!("unknown backend: {backend}") }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::ThreadPattern;
    use tempfile::tempdir;

    #[test]
    fn poll_messages_only_returns_new_ordinals() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let store = ThreadStore::new(&layout);
        store.create_thread("b", "t", vec![], ThreadPattern::Work).unwrap();
        store.append_message("b", "t", "king", None, "hi", None).unwrap();

        let mut poller = ThreadPoller::new();
        let first = poller.poll_messages(&layout, "b", "t").unwrap();
        assert_eq!(first.len(), 1);

        let second = poller.poll_messages(&layout, "b", "t").unwrap();
        assert!(second.is_empty());

        store.append_message("b", "t", "claude", None, "hello", None).unwrap();
        let third = poller.poll_messages(&layout, "b", "t").unwrap();
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn poll_stream_tracks_offset_and_retains_partial_line() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join(".stream-claude.jsonl");
        std::fs::write(&path, r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}"#.to_string() + "\n").unwrap();

        let mut poller = ThreadPoller::new();
        let events = poller.poll_stream("claude", "claude", &path);
        assert!(events.iter().any(|e| matches!(e, PollEvent::StreamStarted { .. })));
        assert!(events.iter().any(|e| matches!(e, PollEvent::StreamDelta { text, .. } if text == "hi")));

        // Appending a partial line (no trailing newline) yields nothing yet.
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        use std::io::Write;
        write!(f, "{{\"type\":\"assistant\"").unwrap();
        let events = poller.poll_stream("claude", "claude", &path);
        assert!(events.is_empty());
    }

    #[test]
    fn poll_stream_resets_offset_on_shrink() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join(".stream-claude.jsonl");
        std::fs::write(&path, "a".repeat(100) + "\n").unwrap();
        let mut poller = ThreadPoller::new();
        poller.poll_stream("claude", "claude", &path);
        assert!(*poller.stream_offsets.get("claude").unwrap() > 0);

        std::fs::write(&path, "short\n").unwrap();
        poller.poll_stream("claude", "claude", &path);
        // Offset was reset to 0 before re-reading the shrunk file.
        assert!(*poller.stream_offsets.get("claude").unwrap() <= "short\n".len() as u64);
    }
}
