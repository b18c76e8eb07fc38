//! Session state machine.

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Transport established, welcome text not yet written.
    #[default]
    Initializing,
    /// Reading and dispatching input lines.
    Active,
    /// Leaving the loop; connection resources are being released.
    Terminating,
    /// Resources released. No further transitions.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Initializing -> Active
    /// - Initializing -> Terminating (welcome could not be written)
    /// - Active -> Terminating
    /// - Terminating -> Closed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Initializing, Active)
                | (Initializing, Terminating)
                | (Active, Terminating)
                | (Terminating, Closed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// The state is left unchanged when the transition is invalid.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::SandboxError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is the terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Check if the session is dispatching commands.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}
