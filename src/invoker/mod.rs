//! Agent Invoker (spec §4.2) — builds argv + env for an AI CLI backend,
//! runs it as a subprocess with teed stdout/stderr capture, enforces a
//! wall-clock timeout via process-group kill, and parses the backend's
//! output envelope. Grounded on the teacher's `session/claude.rs`
//! spawn/event-loop shape, generalized across backends instead of
//! hardcoded to one CLI.

pub mod claude;
pub mod codex;
pub mod cursor;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AgentProfile;
use crate::errors::{KdError, KdResult};

/// Host environment variables whose presence indicates this process is
/// itself running inside one of the agent CLIs (spec §4.2 step 2). Matched
/// case-insensitively against env var *names*.
const HOST_ENV_SIGNALS: &[&str] = &["CLAUDECODE", "CLAUDE_CODE", "CURSOR_TRACE_ID", "CODEX_SANDBOX"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    ThinkingDelta(String),
}

/// Per-backend output-envelope parser. Each backend tolerates a distinct
/// NDJSON schema (spec §4.2 step 7) but exposes the same shape back to the
/// invoker: streamed deltas, a resume token, and the final text.
pub trait BackendParser: Default {
    fn feed(&mut self, line: &str) -> Vec<StreamEvent>;
    fn resume_id(&self) -> Option<String>;
    fn final_text(&self) -> Option<String>;
}

pub struct AgentQuery {
    pub agent: String,
    pub prompt: String,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub resume: Option<String>,
    /// When set, stdout lines are teed here with per-line flush (spec §4.2
    /// step 4) and the file is deleted on success, kept on error/timeout.
    pub stream_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    pub text: String,
    pub error: Option<String>,
    pub session_id: Option<String>,
    pub elapsed: Duration,
}

impl AgentResponse {
    pub fn is_timeout(&self) -> bool {
        self.error.as_deref().map(|e| e.contains("timeout")).unwrap_or(false)
    }
}

/// Strip host-CLI signal env vars from a clean child environment built on
/// top of the current process's own environment (spec §4.2 step 2).
fn scrub_env() -> Vec<(String, String)> {
    std::env::vars()
        .filter(|(key, _)| {
            let upper = key.to_ascii_uppercase();
            !HOST_ENV_SIGNALS.iter().any(|signal| upper.contains(signal))
        })
        .collect()
}

/// The flag(s) a backend needs to emit NDJSON instead of its default
/// human-readable output, gated on `AgentProfile.supports_stream_format`
/// (spec §4.2 step 1).
fn stream_format_args(agent: &str) -> Vec<String> {
    match agent {
        "claude" | "cursor" => vec!["--output-format".into(), "stream-json".into()],
        "codex" => vec!["--json".into()],
        _ => Vec::new(),
    }
}

fn build_argv(profile: &AgentProfile, query: &AgentQuery) -> Vec<String> {
    let mut argv = profile.base_args.clone();
    if profile.supports_stream_format {
        argv.extend(stream_format_args(&query.agent));
    }
    if profile.supports_resume {
        if let Some(resume) = &query.resume {
            argv.push("--resume".to_string());
            argv.push(resume.clone());
        }
    }
    argv.push("-p".to_string());
    argv.push(query.prompt.clone());
    argv
}

/// Run one backend turn to completion (or timeout). The only public entry
/// point into this module — council and the peasant harness both call
/// through here, never spawn subprocesses directly (spec §7: "each
/// invocation owns its own process group; the invoker is the only code
/// path that kills subprocesses it started").
pub async fn invoke(profile: &AgentProfile, query: AgentQuery) -> KdResult<AgentResponse> {
    match query.agent.as_str() {
        "claude" => run::<claude::ClaudeParser>(profile, query).await,
        "codex" => run::<codex::CodexParser>(profile, query).await,
        "cursor" => run::<cursor::CursorParser>(profile, query).await,
        other => Err(KdError::AgentMissing(other.to_string())),
    }
}

async fn run<P: BackendParser + Send + 'static>(profile: &AgentProfile, query: AgentQuery) -> KdResult<AgentResponse> {
    if profile.binary.is_empty() {
        return Err(KdError::AgentMissing(query.agent.clone()));
    }

    let started = Instant::now();
    let argv = build_argv(profile, &query);

    let mut cmd = Command::new(&profile.binary);
    cmd.args(&argv)
        .current_dir(&query.cwd)
        .env_clear()
        .envs(scrub_env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        std::os::unix::process::CommandExt::process_group(cmd.as_std_mut(), 0);
    }

    let mut child = cmd
        .spawn()
        .map_err(|_| KdError::AgentMissing(profile.binary.clone()))?;

    // stdin is closed immediately: every agent CLI here takes its prompt via
    // argv, not stdin, but the channel must still exist to satisfy CLIs that
    // probe for EOF before proceeding.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.shutdown().await;
    }

    let pid = child.id();
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let stream_file = match &query.stream_path {
        Some(path) => Some(
            tokio::fs::File::create(path)
                .await
                .map_err(|e| KdError::io(path, e))?,
        ),
        None => None,
    };

    let stdout_task = tokio::spawn(read_stdout::<P>(stdout, stream_file));
    let stderr_task = tokio::spawn(read_stderr(stderr));

    let wait_result = tokio::time::timeout(query.timeout, child.wait()).await;

    let (parser, captured_text) = match tokio::time::timeout(Duration::from_secs(2), stdout_task).await {
        Ok(Ok(result)) => result,
        _ => (P::default(), String::new()),
    };
    let stderr_text = tokio::time::timeout(Duration::from_secs(2), stderr_task)
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();

    let elapsed = started.elapsed();

    let response = match wait_result {
        Err(_) => {
            // Wall-clock timeout: kill the whole process group (spec §4.2
            // step 5), keep whatever the readers already captured.
            kill_process_group(pid);
            let _ = child.kill().await;
            AgentResponse {
                text: captured_text,
                error: Some(format!("agent timeout after {:?}", query.timeout)),
                session_id: parser.resume_id(),
                elapsed,
            }
        }
        Ok(Ok(status)) if status.success() => AgentResponse {
            text: parser.final_text().unwrap_or(captured_text),
            error: None,
            session_id: parser.resume_id(),
            elapsed,
        },
        Ok(Ok(_status)) => AgentResponse {
            text: captured_text,
            error: Some(stderr_text),
            session_id: parser.resume_id(),
            elapsed,
        },
        Ok(Err(e)) => AgentResponse {
            text: captured_text,
            error: Some(e.to_string()),
            session_id: parser.resume_id(),
            elapsed,
        },
    };

    if response.error.is_none() {
        if let Some(path) = &query.stream_path {
            let _ = tokio::fs::remove_file(path).await;
        }
    }

    Ok(response)
}

async fn read_stdout<P: BackendParser>(
    stdout: tokio::process::ChildStdout,
    mut stream_file: Option<tokio::fs::File>,
) -> (P, String) {
    let mut parser = P::default();
    let mut captured = String::new();
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(line = %line, "agent stdout");
                if let Some(file) = stream_file.as_mut() {
                    let _ = file.write_all(line.as_bytes()).await;
                    let _ = file.write_all(b"\n").await;
                    let _ = file.flush().await;
                }
                let _ = parser.feed(&line);
                if !captured.is_empty() {
                    captured.push('\n');
                }
                captured.push_str(&line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "error reading agent stdout");
                break;
            }
        }
    }
    (parser, captured)
}

async fn read_stderr(stderr: tokio::process::ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut captured = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(line = %line, "agent stderr");
        if !captured.is_empty() {
            captured.push('\n');
        }
        captured.push_str(&line);
    }
    captured
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_env_removes_host_signals() {
        std::env::set_var("CLAUDECODE", "1");
        let scrubbed = scrub_env();
        std::env::remove_var("CLAUDECODE");
        assert!(!scrubbed.iter().any(|(k, _)| k == "CLAUDECODE"));
    }

    #[test]
    fn build_argv_includes_resume_flag_when_supported() {
        let profile = AgentProfile {
            binary: "claude".into(),
            base_args: vec![],
            supports_resume: true,
            supports_stream_format: true,
        };
        let query = AgentQuery {
            agent: "claude".into(),
            prompt: "do the thing".into(),
            cwd: PathBuf::from("."),
            timeout: Duration::from_secs(1),
            resume: Some("sid-1".into()),
            stream_path: None,
        };
        let argv = build_argv(&profile, &query);
        assert!(argv.contains(&"--resume".to_string()));
        assert!(argv.contains(&"sid-1".to_string()));
        assert_eq!(argv.last(), Some(&"do the thing".to_string()));
    }

    #[test]
    fn build_argv_omits_stream_format_flags_when_unsupported() {
        let profile = AgentProfile {
            binary: "claude".into(),
            base_args: vec![],
            supports_resume: false,
            supports_stream_format: false,
        };
        let query = AgentQuery {
            agent: "claude".into(),
            prompt: "hi".into(),
            cwd: PathBuf::from("."),
            timeout: Duration::from_secs(1),
            resume: None,
            stream_path: None,
        };
        let argv = build_argv(&profile, &query);
        assert!(!argv.contains(&"--output-format".to_string()));
    }

    #[test]
    fn build_argv_omits_resume_when_unsupported() {
        let profile = AgentProfile {
            binary: "legacy".into(),
            base_args: vec![],
            supports_resume: false,
            supports_stream_format: false,
        };
        let query = AgentQuery {
            agent: "legacy".into(),
            prompt: "hi".into(),
            cwd: PathBuf::from("."),
            timeout: Duration::from_secs(1),
            resume: Some("sid-1".into()),
            stream_path: None,
        };
        let argv = build_argv(&profile, &query);
        assert!(!argv.contains(&"--resume".to_string()));
    }
}
