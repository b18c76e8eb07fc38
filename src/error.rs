//! Error types for ssh-sandbox.

use thiserror::Error;

/// Main error type for ssh-sandbox operations.
///
/// Only startup and listener failures surface as this type. Errors inside a
/// single session end that session and are reported through
/// [`SessionEnd`](crate::session::SessionEnd) instead.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The host key could not be loaded.
    #[error("failed to load host key from {path}: {reason}")]
    HostKey { path: String, reason: String },

    /// The listener kept failing and was given up.
    #[error("listener unusable: {0}")]
    Listener(#[source] std::io::Error),

    /// SSH transport error.
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Invalid session state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },
}

/// Convenience Result type for ssh-sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[test]
    fn test_bind_display() {
        let err = SandboxError::Bind {
            addr: "0.0.0.0:2222".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert!(err.to_string().contains("0.0.0.0:2222"));
        assert!(err.to_string().contains("address in use"));
    }

    #[test]
    fn test_host_key_display() {
        let err = SandboxError::HostKey {
            path: "id_ed25519".into(),
            reason: "no such file".into(),
        };
        assert!(err.to_string().contains("id_ed25519"));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_listener_display() {
        let err = SandboxError::Listener(std::io::Error::new(
            std::io::ErrorKind::Other,
            "too many open files",
        ));
        assert!(err.to_string().contains("listener unusable"));
        assert!(err.to_string().contains("too many open files"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = SandboxError::InvalidStateTransition {
            from: SessionState::Closed,
            to: SessionState::Active,
        };
        assert!(err.to_string().contains("Closed"));
        assert!(err.to_string().contains("Active"));
    }
}
