pub mod model;
pub mod store;

pub use model::{pid_is_alive, AgentSession, SessionStatus};
pub use store::{BranchState, SessionStore};
