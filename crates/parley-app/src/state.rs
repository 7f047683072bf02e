//! Observable view state.

/// Lifecycle of the active room view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewStatus {
    /// No room selected
    #[default]
    Idle,
    /// Waiting for the most recent page
    Loading,
    /// History loaded; live messages are merged
    Ready,
    /// Initial page failed; live messages are still merged
    Error(String),
}

impl ViewStatus {
    /// Whether live messages should be merged into the view.
    pub fn accepts_live(&self) -> bool {
        matches!(self, Self::Ready | Self::Error(_))
    }
}
