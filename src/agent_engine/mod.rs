pub mod engine;
pub mod event_bus;
pub mod history;
pub mod loop_control;
pub mod sessions;
pub mod state;

pub use engine::{AgentEngine, HistoryMode};
pub use sessions::SessionManager;
