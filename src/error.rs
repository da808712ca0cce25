use std::fmt;

use crate::clock::ClockState;

/// Failures surfaced to callers of the engines.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The audio clock could not reach the running state. Callers should ask
    /// the user to interact with the app and try again.
    AudioUnavailable { state: ClockState, reason: String },
    /// An operation was called before its setup step.
    NotInitialized(&'static str),
    /// The output device refused to open or start.
    Device(String),
    /// Configuration or session data could not be read.
    Config(String),
}

impl EngineError {
    pub fn audio_unavailable(state: ClockState, reason: impl Into<String>) -> Self {
        EngineError::AudioUnavailable {
            state,
            reason: reason.into(),
        }
    }

    /// True when retrying after a fresh user gesture may succeed.
    pub fn requires_user_interaction(&self) -> bool {
        matches!(self, EngineError::AudioUnavailable { .. })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::AudioUnavailable { state, reason } => write!(
                f,
                "audio clock could not be started (state: {state}): {reason}. User interaction required."
            ),
            EngineError::NotInitialized(what) => write!(f, "{what} must be initialized first"),
            EngineError::Device(msg) => write!(f, "audio device error: {msg}"),
            EngineError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Errors raised by individual graph nodes. These only occur during
/// teardown races and are absorbed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeError {
    AlreadyDisposed,
    InvalidState(&'static str),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::AlreadyDisposed => write!(f, "node already disposed"),
            NodeError::InvalidState(msg) => write!(f, "invalid node state: {msg}"),
        }
    }
}

impl std::error::Error for NodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_unavailable_mentions_user_interaction() {
        let err = EngineError::audio_unavailable(ClockState::Suspended, "autoplay blocked");
        assert!(err.requires_user_interaction());
        let msg = err.to_string();
        assert!(msg.contains("suspended"));
        assert!(msg.contains("User interaction required"));
    }

    #[test]
    fn not_initialized_is_not_a_user_prompt() {
        let err = EngineError::NotInitialized("CompositeSignalGenerator");
        assert!(!err.requires_user_interaction());
        assert_eq!(
            err.to_string(),
            "CompositeSignalGenerator must be initialized first"
        );
    }
}
