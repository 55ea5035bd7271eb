//! Thread and message data model (§3, Entity: Thread / Message).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a thread is used for — drives how the history formatter and the
/// council orchestrator treat it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadPattern {
    /// Fan-out to advisors; read-only by convention.
    Council,
    /// A peasant's work thread for one task.
    Work,
    /// Two-party direct conversation (e.g. King <-> one agent).
    Direct,
}

/// `threads/<slug>/thread.json` — tracked metadata for a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMeta {
    /// Original (non-normalized) name, preserved for display.
    pub name: String,
    pub members: Vec<String>,
    pub pattern: ThreadPattern,
    pub created_at: DateTime<Utc>,
}

/// One message's YAML frontmatter plus body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<String>>,
    /// Unrecognized frontmatter keys, preserved but not interpreted
    /// (spec §4.1: "unknown frontmatter keys are preserved but not surfaced").
    #[serde(flatten)]
    pub unknown: std::collections::BTreeMap<String, serde_yaml::Value>,
    #[serde(skip)]
    pub body: String,
}

/// A message together with the sequence number its filename encodes.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedMessage {
    pub seqno: u32,
    pub message: Message,
}

/// Strip trailing whitespace from every line of `body`, preserving
/// intentional empty lines (spec §3 invariant, §8 boundary behavior).
pub fn strip_trailing_whitespace(body: &str) -> String {
    body.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}
