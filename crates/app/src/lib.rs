pub mod conversation;
pub mod orchestrator;
pub mod tui;

pub use conversation::Conversation;
pub use orchestrator::{
    AppEvent, CycleEvent, Orchestrator, RemoteTranscriber, SessionLauncher, FALLBACK_REPLY,
};
