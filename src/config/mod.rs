//! `.kd/config.json` loading.
//!
//! Config is loaded once per process and treated as immutable thereafter
//! (§5 shared-resource policy). Unknown keys under `council.` / `chat.` are
//! rejected at load (spec §6) via `deny_unknown_fields` on the relevant
//! sub-structs; unrecognized top-level keys are tolerated for forward
//! compatibility with agent-config sections this crate doesn't model.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{KdError, KdResult};
use crate::layout::Layout;

fn default_members() -> Vec<String> {
    vec!["claude".into(), "codex".into(), "cursor".into()]
}

fn default_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouncilMode {
    Broadcast,
    Sequential,
}

impl Default for CouncilMode {
    fn default() -> Self {
        CouncilMode::Broadcast
    }
}

fn default_preamble() -> String {
    "You are a read-only advisor. Do not modify files and do not invoke \
     state-changing version-control commands (commit, push, merge, reset). \
     Review and respond only."
        .to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CouncilConfig {
    #[serde(default = "default_members")]
    pub members: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// `None` means "default to unmuted-member count", resolved by the caller
    /// because that count isn't known at config-load time.
    pub auto_messages: Option<usize>,
    #[serde(default)]
    pub mode: CouncilMode,
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            members: default_members(),
            timeout: default_timeout(),
            auto_messages: None,
            mode: CouncilMode::default(),
            preamble: default_preamble(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingVisibility {
    Auto,
    Show,
    Hide,
}

impl Default for ThinkingVisibility {
    fn default() -> Self {
        ThinkingVisibility::Auto
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChatConfig {
    #[serde(default)]
    pub thinking_visibility: ThinkingVisibility,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            thinking_visibility: ThinkingVisibility::default(),
        }
    }
}

/// Per-agent-backend CLI invocation profile (binary name, base args, whether
/// it supports `--resume` and a streaming output format).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub binary: String,
    pub base_args: Vec<String>,
    pub supports_resume: bool,
    pub supports_stream_format: bool,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            binary: String::new(),
            base_args: Vec::new(),
            supports_resume: true,
            supports_stream_format: true,
        }
    }
}

fn default_agents() -> std::collections::HashMap<String, AgentProfile> {
    let mut m = std::collections::HashMap::new();
    // The `--output-format stream-json` / `--json` flags aren't hardcoded
    // here — they're added by the invoker per `supports_stream_format`.
    m.insert(
        "claude".to_string(),
        AgentProfile {
            binary: "claude".to_string(),
            base_args: vec![],
            supports_resume: true,
            supports_stream_format: true,
        },
    );
    m.insert(
        "codex".to_string(),
        AgentProfile {
            binary: "codex".to_string(),
            base_args: vec![],
            supports_resume: true,
            supports_stream_format: true,
        },
    );
    m.insert(
        "cursor".to_string(),
        AgentProfile {
            binary: "cursor-agent".to_string(),
            base_args: vec![],
            supports_resume: true,
            supports_stream_format: true,
        },
    );
    m
}

/// Fully-resolved configuration — immutable for the lifetime of a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub council: CouncilConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default = "default_agents")]
    pub agents: std::collections::HashMap<String, AgentProfile>,
    /// Gate commands run on a `STATUS: DONE` (e.g. `["pytest", "ruff check"]`).
    #[serde(default = "default_gates")]
    pub gates: Vec<String>,
    /// Hard cap on harness iterations before a task is failed.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Bounce cap before the harness escalates to the human (spec §4.4 step 5).
    #[serde(default = "default_bounce_cap")]
    pub bounce_cap: u32,
}

fn default_gates() -> Vec<String> {
    vec!["pytest".into(), "ruff check".into()]
}

fn default_max_iterations() -> u32 {
    50
}

fn default_bounce_cap() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            council: CouncilConfig::default(),
            chat: ChatConfig::default(),
            agents: default_agents(),
            gates: default_gates(),
            max_iterations: default_max_iterations(),
            bounce_cap: default_bounce_cap(),
        }
    }
}

impl Config {
    /// Load `.kd/config.json`, falling back to built-in defaults when the
    /// file does not exist. A malformed file is a hard error — config
    /// parsing is a programmer-error class (§7), not something to paper
    /// over with defaults.
    pub fn load(layout: &Layout) -> KdResult<Self> {
        let path = layout.config_path();
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> KdResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| KdError::io(path, e))?;
        let cfg: Config = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> KdResult<()> {
        if self.council.members.is_empty() {
            return Err(KdError::InvalidConfig {
                key: "council.members".into(),
                reason: "must be non-empty".into(),
            });
        }
        for name in &self.council.members {
            if !self.agents.contains_key(name) {
                return Err(KdError::InvalidConfig {
                    key: "council.members".into(),
                    reason: format!("member `{name}` has no matching agent config"),
                });
            }
        }
        if self.council.timeout == 0 {
            return Err(KdError::InvalidConfig {
                key: "council.timeout".into(),
                reason: "must be positive".into(),
            });
        }
        if self.council.preamble.trim().is_empty() {
            return Err(KdError::InvalidConfig {
                key: "council.preamble".into(),
                reason: "must be non-empty".into(),
            });
        }
        Ok(())
    }

    /// Resolve `council.auto_messages`, defaulting to the unmuted-member
    /// count when unset (spec §6).
    pub fn auto_messages(&self, unmuted_member_count: usize) -> usize {
        self.council.auto_messages.unwrap_or(unmuted_member_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_council_keys() {
        let json = r#"{"council": {"members": ["claude"], "bogus_key": 1}}"#;
        let err = serde_json::from_str::<Config>(json).unwrap_err();
        assert!(err.to_string().contains("bogus_key") || err.to_string().contains("unknown field"));
    }

    #[test]
    fn rejects_empty_members() {
        let cfg = Config {
            council: CouncilConfig {
                members: vec![],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_member_without_agent_profile() {
        let mut cfg = Config::default();
        cfg.council.members.push("ghost".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn auto_messages_defaults_to_unmuted_count() {
        let cfg = Config::default();
        assert_eq!(cfg.auto_messages(2), 2);
    }

    #[test]
    fn auto_messages_respects_explicit_override() {
        let mut cfg = Config::default();
        cfg.council.auto_messages = Some(0);
        assert_eq!(cfg.auto_messages(5), 0);
    }
}
