//! Group-chat auto-turn scheduler (spec §4.7). Pure decision logic: given a
//! human message and the current chat state, decide who gets queried next
//! and whether a previously-launched round is still valid.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPlan {
    /// First exchange of a thread: everyone, launched concurrently.
    Broadcast(Vec<String>),
    /// Follow-up: one member at a time, in order, up to the budget.
    Sequential(Vec<String>),
    /// A directed `@member` message: skip auto-turns entirely.
    None,
}

#[derive(Debug, Default)]
pub struct AutoTurnScheduler {
    generation: u64,
    interrupted: bool,
}

impl AutoTurnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bump the generation and clear the interrupt flag for a fresh human
    /// message (spec §4.7: "On a human input: bump a monotonic generation
    /// counter").
    pub fn on_human_message(&mut self) -> u64 {
        self.generation += 1;
        self.interrupted = false;
        self.generation
    }

    /// Escape: set the interrupt flag and invalidate the generation so any
    /// in-flight sequential plan aborts before its next member launches.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
        self.generation += 1;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// True if `generation` still matches the current round — callers must
    /// re-check this before launching each sequential member (spec §4.7).
    pub fn is_current(&self, generation: u64) -> bool {
        !self.interrupted && generation == self.generation
    }

    /// Decide the plan for this human message. `mentioned` being non-empty
    /// means the message was directed and must skip auto-turns. `unmuted`
    /// lists active members in configured order.
    pub fn plan(
        is_first_exchange: bool,
        mentioned: &[String],
        unmuted: &[String],
        auto_messages: usize,
    ) -> TurnPlan {
        if !mentioned.is_empty() {
            return TurnPlan::None;
        }
        if is_first_exchange {
            return TurnPlan::Broadcast(unmuted.to_vec());
        }
        let budget = auto_messages.min(unmuted.len());
        TurnPlan::Sequential(unmuted.iter().take(budget).cloned().collect())
    }
}
