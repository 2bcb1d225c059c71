//! Coordinator state definitions.

/// Coordinator operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Coordinator is starting up.
    Starting,
    /// Coordinator is running and accepting reservations.
    Running,
    /// Coordinator is shutting down; pending transactions may still resolve.
    ShuttingDown,
    /// Coordinator is stopped.
    Stopped,
}

impl CoordinatorState {
    /// Check if new reservations are accepted.
    ///
    /// `Starting` accepts them too, so the coordinator can serve requests
    /// before the background sweep is spawned.
    pub fn accepts_reservations(&self) -> bool {
        matches!(self, CoordinatorState::Starting | CoordinatorState::Running)
    }

    /// Check if the coordinator is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Stopped)
    }
}
