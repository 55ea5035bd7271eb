//! Council Orchestrator (spec §4.3) — concurrent fan-out of a prompt to N
//! advisor subprocesses, with per-advisor streaming capture and write-once
//! persistence of finalized responses into the thread.

use std::collections::HashSet;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::KdResult;
use crate::invoker::{self, AgentQuery, AgentResponse};
use crate::layout::Layout;
use crate::threads::{ThreadStore, format_history};

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9_-]+)").unwrap());

#[derive(Debug, Clone)]
pub struct CouncilReply {
    pub member: String,
    pub response: AgentResponse,
}

/// Parse `@<name>` mentions out of a prompt. `@all` is treated as an
/// explicit broadcast marker rather than a member name (spec §4.3 step 1).
pub fn parse_mentions(prompt: &str) -> Vec<String> {
    MENTION
        .captures_iter(prompt)
        .map(|c| c[1].to_string())
        .filter(|name| name != "all")
        .collect()
}

/// Resolve which configured members a prompt targets: explicit `targets`
/// wins; otherwise mentions restrict to matching members (falling back to
/// everyone when none match); otherwise everyone.
pub fn resolve_targets(config: &Config, prompt: &str, targets: Option<&[String]>) -> Vec<String> {
    if let Some(explicit) = targets {
        if !explicit.is_empty() {
            return explicit.to_vec();
        }
    }
    let mentioned: HashSet<String> = parse_mentions(prompt).into_iter().collect();
    if mentioned.is_empty() {
        return config.council.members.clone();
    }
    let matching: Vec<String> = config
        .council
        .members
        .iter()
        .filter(|m| mentioned.contains(*m))
        .cloned()
        .collect();
    if matching.is_empty() {
        config.council.members.clone()
    } else {
        matching
    }
}

/// Fan out `prompt` to the council, appending each member's reply to the
/// thread as soon as it completes (completion order, not launch order).
pub async fn query_to_thread(
    layout: &Layout,
    config: &Config,
    branch: &str,
    thread: &str,
    prompt: &str,
    targets: Option<&[String]>,
) -> KdResult<Vec<CouncilReply>> {
    let store = ThreadStore::new(layout);
    let messages = store.list_messages(branch, thread)?;

    let members = resolve_targets(config, prompt, targets);
    let timeout = std::time::Duration::from_secs(config.council.timeout);
    let worktree_dir = layout.root().to_path_buf();

    let mut in_flight = FuturesUnordered::new();
    for member in members {
        let Some(profile) = config.agents.get(&member).cloned() else {
            warn!(member = %member, "council member has no agent profile, skipping");
            continue;
        };
        let history = format_history(&messages, &member);
        let full_prompt = format!("{}\n\n{}\n\n{}", config.council.preamble, history, prompt);
        let stream_path = layout.stream_path(branch, thread, &member);
        let query = AgentQuery {
            agent: member.clone(),
            prompt: full_prompt,
            cwd: worktree_dir.clone(),
            timeout,
            resume: None,
            stream_path: Some(stream_path),
        };
        in_flight.push(tokio::spawn(async move {
            let response = invoker::invoke(&profile, query).await;
            (member, response)
        }));
    }

    // Appended in completion order, not launch order (spec §4.3, §5).
    let mut replies = Vec::new();
    while let Some(joined) = in_flight.next().await {
        let (member, result) = joined.expect("council task panicked");
        let response = match result {
            Ok(r) => r,
            Err(e) => AgentResponse {
                text: String::new(),
                error: Some(e.to_string()),
                session_id: None,
                elapsed: std::time::Duration::default(),
            },
        };

        let body = match &response.error {
            Some(err) if response.text.is_empty() => format!("(error: {err})"),
            Some(err) => format!("{}\n\n(partial — error: {err})", response.text),
            None => response.text.clone(),
        };

        store.append_message(branch, thread, &member, None, &body, None)?;
        info!(member = %member, ok = response.error.is_none(), "council reply appended");
        replies.push(CouncilReply { member, response });
    }

    Ok(replies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_members(members: &[&str]) -> Config {
        let mut cfg = Config::default();
        cfg.council.members = members.iter().map(|s| s.to_string()).collect();
        cfg
    }

    #[test]
    fn mentions_restrict_targets_to_matching_members() {
        let cfg = config_with_members(&["claude", "codex", "cursor"]);
        let targets = resolve_targets(&cfg, "what do you think @codex?", None);
        assert_eq!(targets, vec!["codex".to_string()]);
    }

    #[test]
    fn unmatched_mention_falls_back_to_everyone() {
        let cfg = config_with_members(&["claude", "codex"]);
        let targets = resolve_targets(&cfg, "hey @nobody", None);
        assert_eq!(targets, cfg.council.members);
    }

    #[test]
    fn at_all_is_not_treated_as_a_member_name() {
        let cfg = config_with_members(&["claude", "codex"]);
        let targets = resolve_targets(&cfg, "@all please review", None);
        assert_eq!(targets, cfg.council.members);
    }

    #[test]
    fn explicit_targets_override_mentions() {
        let cfg = config_with_members(&["claude", "codex", "cursor"]);
        let targets = resolve_targets(&cfg, "@codex go", Some(&["cursor".to_string()]));
        assert_eq!(targets, vec!["cursor".to_string()]);
    }
}
