use crate::error::AppError;
use parking_lot::RwLock;
use std::sync::Arc;

/// Conversation-cycle states driven by the push-to-talk gesture.
///
/// `Idle` is the only state that accepts a new gesture. `Recording` covers
/// the interval from gesture-down until the capture session has drained,
/// `Processing` the round-trip through the remote endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Recording,
    Processing,
}

pub struct StateManager {
    state: Arc<RwLock<AppState>>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(AppState::Idle)),
        }
    }

    pub fn transition(&self, new_state: AppState) -> Result<(), AppError> {
        let mut current = self.state.write();

        // Validate state transitions
        let valid = matches!(
            (&*current, &new_state),
            (AppState::Idle, AppState::Recording)
                | (AppState::Idle, AppState::Processing)
                | (AppState::Recording, AppState::Idle)
                | (AppState::Recording, AppState::Processing)
                | (AppState::Processing, AppState::Idle)
        );

        if !valid {
            return Err(AppError::Fatal(format!(
                "Invalid state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("State transition: {:?} -> {:?}", *current, new_state);
        *current = new_state;
        Ok(())
    }

    pub fn current(&self) -> AppState {
        *self.state.read()
    }
}
