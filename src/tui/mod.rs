//! Chat TUI (spec §4.7): group-chat view over a thread's messages and
//! per-member stream files, plus the auto-turn scheduling that decides who
//! gets queried after a human message.

pub mod app;
pub mod poller;
pub mod scheduler;

pub use app::ChatApp;
pub use poller::{PollEvent, ThreadPoller};
pub use scheduler::{AutoTurnScheduler, TurnPlan};
