//! Foundation crate tests
//!
//! Tests cover:
//! - The push-to-talk state machine (valid and invalid transitions)
//! - Error type formatting

use murmur_foundation::error::{AppError, AudioError};
use murmur_foundation::state::{AppState, StateManager};

// ─── StateManager Tests ─────────────────────────────────────────────

#[test]
fn state_manager_starts_idle() {
    let manager = StateManager::new();
    assert_eq!(manager.current(), AppState::Idle);
}

#[test]
fn full_gesture_cycle_is_valid() {
    let manager = StateManager::new();
    manager.transition(AppState::Recording).unwrap();
    manager.transition(AppState::Processing).unwrap();
    manager.transition(AppState::Idle).unwrap();
    assert_eq!(manager.current(), AppState::Idle);
}

#[test]
fn empty_transcript_returns_to_idle() {
    let manager = StateManager::new();
    manager.transition(AppState::Recording).unwrap();
    manager.transition(AppState::Idle).unwrap();
    assert_eq!(manager.current(), AppState::Idle);
}

#[test]
fn typed_message_skips_recording() {
    // A typed submission enters the cycle without a capture session.
    let manager = StateManager::new();
    manager.transition(AppState::Processing).unwrap();
    manager.transition(AppState::Idle).unwrap();
}

#[test]
fn recording_cannot_reenter_recording() {
    let manager = StateManager::new();
    manager.transition(AppState::Recording).unwrap();
    let err = manager.transition(AppState::Recording).unwrap_err();
    assert!(matches!(err, AppError::Fatal(_)));
    // State unchanged after a rejected transition
    assert_eq!(manager.current(), AppState::Recording);
}

#[test]
fn processing_cannot_start_recording() {
    let manager = StateManager::new();
    manager.transition(AppState::Processing).unwrap();
    assert!(manager.transition(AppState::Recording).is_err());
    assert_eq!(manager.current(), AppState::Processing);
}

#[test]
fn processing_cannot_reenter_processing() {
    let manager = StateManager::new();
    manager.transition(AppState::Processing).unwrap();
    assert!(manager.transition(AppState::Processing).is_err());
}

// ─── Error Tests ────────────────────────────────────────────────────

#[test]
fn audio_error_wraps_into_app_error() {
    let err: AppError = AudioError::DeviceNotFound {
        name: Some("pipewire".into()),
    }
    .into();
    let msg = err.to_string();
    assert!(msg.contains("Audio subsystem error"));
    assert!(msg.contains("pipewire"));
}

#[test]
fn config_error_display() {
    let err = AppError::Config("missing api url".into());
    assert_eq!(err.to_string(), "Configuration error: missing api url");
}
