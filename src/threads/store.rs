//! Thread Store (spec §4.1) — append-only, numbered, concurrency-safe
//! message log per thread.
//!
//! Sequencing uses exclusive-create as the coordination primitive (design
//! notes §9): the writer scans the directory for the highest existing
//! ordinal, then opens `NNNN-<sender>.md` with `create_new(true)`. If that
//! loses a race to another writer, it retries with N+1, bounded, rather
//! than taking an OS file lock.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::errors::{KdError, KdResult};
use crate::layout::Layout;
use crate::markdown;
use crate::slug::slugify;

use super::model::{Message, SequencedMessage, ThreadMeta, ThreadPattern};

/// Bounded retry count for the exclusive-create sequencing race.
const MAX_CREATE_ATTEMPTS: u32 = 32;

pub struct ThreadStore<'a> {
    layout: &'a Layout,
}

impl<'a> ThreadStore<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    /// Create a thread directory and write its metadata blob. Refuses to
    /// overwrite an existing thread.
    pub fn create_thread(
        &self,
        branch: &str,
        thread_name: &str,
        members: Vec<String>,
        pattern: ThreadPattern,
    ) -> KdResult<()> {
        let dir = self.layout.thread_dir(branch, thread_name);
        if dir.exists() {
            return Err(KdError::ThreadAlreadyExists {
                branch: branch.to_string(),
                thread: thread_name.to_string(),
            });
        }
        std::fs::create_dir_all(&dir).map_err(|e| KdError::io(&dir, e))?;

        let meta = ThreadMeta {
            name: thread_name.to_string(),
            members,
            pattern,
            created_at: Utc::now(),
        };
        let path = self.layout.thread_meta_path(branch, thread_name);
        let json = serde_json::to_string_pretty(&meta)?;
        std::fs::write(&path, json).map_err(|e| KdError::io(&path, e))?;
        Ok(())
    }

    pub fn read_thread_meta(&self, branch: &str, thread_name: &str) -> KdResult<ThreadMeta> {
        let path = self.layout.thread_meta_path(branch, thread_name);
        let raw = std::fs::read_to_string(&path).map_err(|e| KdError::io(&path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Enumerate thread directories under a branch.
    pub fn list_threads(&self, branch: &str) -> KdResult<Vec<ThreadMeta>> {
        let dir = self.layout.threads_dir(branch);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut metas = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| KdError::io(&dir, e))? {
            let entry = entry.map_err(|e| KdError::io(&dir, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Ok(meta) = self.read_thread_meta(branch, &name) {
                metas.push(meta);
            }
        }
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(metas)
    }

    /// Atomically append the next message in `thread`. Strips per-line
    /// trailing whitespace from `body`. Returns the sequence number and
    /// the path written.
    pub fn append_message(
        &self,
        branch: &str,
        thread_name: &str,
        from: &str,
        to: Option<&str>,
        body: &str,
        refs: Option<Vec<String>>,
    ) -> KdResult<(u32, PathBuf)> {
        let dir = self.layout.thread_dir(branch, thread_name);
        std::fs::create_dir_all(&dir).map_err(|e| KdError::io(&dir, e))?;

        let body = crate::threads::model::strip_trailing_whitespace(body);
        let message = Message {
            from: from.to_string(),
            to: to.map(|s| s.to_string()),
            timestamp: Utc::now(),
            refs,
            unknown: Default::default(),
            body: body.clone(),
        };
        let doc = markdown::compose(&message, &body)?;

        let sender_slug = slugify(from);
        let mut next = highest_seqno(&dir)? + 1;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let filename = format!("{:04}-{}.md", next, sender_slug);
            let path = dir.join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(doc.as_bytes())
                        .map_err(|e| KdError::io(&path, e))?;
                    return Ok((next, path));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    next += 1;
                    continue;
                }
                Err(e) => return Err(KdError::io(&path, e)),
            }
        }

        Err(KdError::Contended {
            branch: branch.to_string(),
            thread: thread_name.to_string(),
            attempts: MAX_CREATE_ATTEMPTS,
        })
    }

    /// Parse a single message file.
    pub fn read_message(&self, path: &Path) -> KdResult<Message> {
        let raw = std::fs::read_to_string(path).map_err(|e| KdError::io(path, e))?;
        let (mut message, body): (Message, String) = markdown::parse(&raw)?;
        message.body = body;
        Ok(message)
    }

    /// List all messages in a thread, ordered by sequence number.
    pub fn list_messages(&self, branch: &str, thread_name: &str) -> KdResult<Vec<SequencedMessage>> {
        let dir = self.layout.thread_dir(branch, thread_name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| KdError::io(&dir, e))? {
            let entry = entry.map_err(|e| KdError::io(&dir, e))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(seqno) = parse_seqno(name) else {
                continue;
            };
            let message = self.read_message(&path)?;
            out.push(SequencedMessage { seqno, message });
        }
        out.sort_by_key(|m| m.seqno);
        Ok(out)
    }
}

/// Extract the 4-digit numeric prefix from a `NNNN-<sender>.md` filename.
fn parse_seqno(filename: &str) -> Option<u32> {
    if !filename.ends_with(".md") {
        return None;
    }
    let prefix = filename.get(0..4)?;
    if prefix.len() != 4 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if filename.as_bytes().get(4) != Some(&b'-') {
        return None;
    }
    prefix.parse().ok()
}

fn highest_seqno(dir: &Path) -> KdResult<u32> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut max = 0u32;
    for entry in std::fs::read_dir(dir).map_err(|e| KdError::io(dir, e))? {
        let entry = entry.map_err(|e| KdError::io(dir, e))?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(n) = parse_seqno(name) {
                max = max.max(n);
            }
        }
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(layout: &Layout) -> ThreadStore<'_> {
        ThreadStore::new(layout)
    }

    #[test]
    fn append_and_list_messages_in_order() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let s = store(&layout);
        s.create_thread("feat-x", "design", vec!["king".into()], ThreadPattern::Work)
            .unwrap();

        let (n1, _) = s
            .append_message("feat-x", "design", "king", None, "first", None)
            .unwrap();
        let (n2, _) = s
            .append_message("feat-x", "design", "claude", None, "second", None)
            .unwrap();
        assert_eq!(n1, 1);
        assert_eq!(n2, 2);

        let msgs = s.list_messages("feat-x", "design").unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].seqno, 1);
        assert_eq!(msgs[0].message.body, "first");
        assert_eq!(msgs[1].seqno, 2);
        assert_eq!(msgs[1].message.from, "claude");
    }

    #[test]
    fn concurrent_appends_are_dense_and_unique() {
        let tmp = tempdir().unwrap();
        let layout = std::sync::Arc::new(Layout::new(tmp.path()));
        let s = ThreadStore::new(&layout);
        s.create_thread("feat-x", "t", vec![], ThreadPattern::Work).unwrap();
        drop(s);

        let mut handles = Vec::new();
        for i in 0..10 {
            let layout = layout.clone();
            handles.push(std::thread::spawn(move || {
                let s = ThreadStore::new(&layout);
                s.append_message("feat-x", "t", &format!("agent-{i}"), None, "hi", None)
                    .unwrap()
                    .0
            }));
        }
        let mut seqnos: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seqnos.sort();
        assert_eq!(seqnos, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn strips_trailing_whitespace_but_keeps_blank_lines() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let s = store(&layout);
        s.create_thread("b", "t", vec![], ThreadPattern::Work).unwrap();
        s.append_message("b", "t", "king", None, "hi   \n\nthere\t\n", None)
            .unwrap();
        let msgs = s.list_messages("b", "t").unwrap();
        assert_eq!(msgs[0].message.body, "hi\n\nthere");
    }

    #[test]
    fn create_thread_refuses_overwrite() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let s = store(&layout);
        s.create_thread("b", "t", vec![], ThreadPattern::Work).unwrap();
        let err = s.create_thread("b", "t", vec![], ThreadPattern::Work).unwrap_err();
        assert!(matches!(err, KdError::ThreadAlreadyExists { .. }));
    }

    #[test]
    fn list_messages_skips_unrelated_files() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let s = store(&layout);
        s.create_thread("b", "t", vec![], ThreadPattern::Work).unwrap();
        std::fs::write(layout.thread_dir("b", "t").join(".stream-claude.jsonl"), "{}").unwrap();
        s.append_message("b", "t", "king", None, "hi", None).unwrap();
        let msgs = s.list_messages("b", "t").unwrap();
        assert_eq!(msgs.len(), 1);
    }
}
