//! Error types for the observable set.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! specific condition instead of parsing messages.

use thiserror::Error;

use crate::listener::ListenerId;

/// Error returned by a listener callback.
///
/// The set never inspects the message; it is carried back to the caller of
/// `add` (or logged, depending on the notify policy).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    /// Creates a listener error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Wraps any error, keeping its display text.
    #[must_use]
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(err.to_string())
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Top-level error type for observable set operations.
#[derive(Debug, Error)]
pub enum ObservableError {
    /// A listener failed while being notified and the policy is fail-fast.
    #[error("Listener {listener} failed at position {position}: {source}")]
    Listener {
        /// Registration id of the failing listener.
        listener: ListenerId,
        /// Index of the failing listener inside the notification snapshot.
        position: usize,
        /// The error the listener returned.
        #[source]
        source: ListenerError,
    },

    /// The backing set lock was poisoned by a panic in user code.
    #[error("Poisoned lock: {context}")]
    Poisoned {
        /// Operation that observed the poisoned lock.
        context: &'static str,
    },

    /// Configuration could not be parsed or is invalid.
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The channel behind a stream has no remaining sender.
    #[error("Disconnected: {path}")]
    Disconnected {
        /// Which channel was disconnected.
        path: String,
    },

    /// A bounded wait elapsed.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        /// The elapsed wait in milliseconds.
        duration_ms: u64,
    },
}

impl ObservableError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if a listener callback failed.
    #[must_use]
    pub const fn is_listener(&self) -> bool {
        matches!(self, Self::Listener { .. })
    }

    /// Returns true if a lock was poisoned.
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        matches!(self, Self::Poisoned { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if a stream was disconnected.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Returns true if a bounded wait timed out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The listener error, if a listener failed.
    #[must_use]
    pub const fn listener_error(&self) -> Option<&ListenerError> {
        match self {
            Self::Listener { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for observable set operations.
pub type ObservableResult<T> = Result<T, ObservableError>;
