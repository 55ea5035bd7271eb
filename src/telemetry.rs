//! In-memory council invocation counters (SPEC_FULL.md supplemental
//! feature, grounded on the shape of the teacher's `session/telemetry.rs`
//! span counters, stripped of OTel export and SQLite persistence — Kingdom
//! has no daemon to export spans from, so this is observational only,
//! surfaced once at the end of a council run rather than continuously).

use std::collections::HashMap;

use crate::council::CouncilReply;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberCounters {
    pub calls: u32,
    pub timeouts: u32,
    pub failures: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CouncilTelemetry {
    by_member: HashMap<String, MemberCounters>,
}

impl CouncilTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, replies: &[CouncilReply]) {
        for reply in replies {
            let counters = self.by_member.entry(reply.member.clone()).or_default();
            counters.calls += 1;
            if reply.response.is_timeout() {
                counters.timeouts += 1;
            } else if reply.response.error.is_some() {
                counters.failures += 1;
            }
        }
    }

    pub fn for_member(&self, member: &str) -> MemberCounters {
        self.by_member.get(member).cloned().unwrap_or_default()
    }

    /// Render a one-line-per-member summary for end-of-run CLI output.
    pub fn summary(&self) -> String {
        let mut members: Vec<&String> = self.by_member.keys().collect();
        members.sort();
        members
            .into_iter()
            .map(|m| {
                let c = &self.by_member[m];
                format!("{m}: {} calls, {} timeouts, {} failures", c.calls, c.timeouts, c.failures)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::AgentResponse;
    use std::time::Duration;

    fn reply(member: &str, error: Option<&str>) -> CouncilReply {
        CouncilReply {
            member: member.to_string(),
            response: AgentResponse {
                text: String::new(),
                error: error.map(|s| s.to_string()),
                session_id: None,
                elapsed: Duration::default(),
            },
        }
    }

    #[test]
    fn tallies_calls_timeouts_and_failures_per_member() {
        let mut telemetry = CouncilTelemetry::new();
        telemetry.record(&[
            reply("claude", None),
            reply("claude", Some("agent timeout after 10s")),
            reply("codex", Some("nonzero exit")),
        ]);

        assert_eq!(telemetry.for_member("claude"), MemberCounters { calls: 2, timeouts: 1, failures: 0 });
        assert_eq!(telemetry.for_member("codex"), MemberCounters { calls: 1, timeouts: 0, failures: 1 });
        assert_eq!(telemetry.for_member("cursor"), MemberCounters::default());
    }

    #[test]
    fn summary_lists_members_in_sorted_order() {
        let mut telemetry = CouncilTelemetry::new();
        telemetry.record(&[reply("codex", None), reply("claude", None)]);
        let summary = telemetry.summary();
        assert!(summary.find("claude").unwrap() < summary.find("codex").unwrap());
    }
}
