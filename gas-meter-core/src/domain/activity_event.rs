use time::OffsetDateTime;

/// Label the history reports while the monitored switch is active.
pub const ACTIVE_STATE: &str = "on";

/// One state change of the monitored switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub timestamp: OffsetDateTime,
    pub state: String,
}

impl ActivityEvent {
    pub fn new(timestamp: OffsetDateTime, state: impl Into<String>) -> Self {
        Self {
            timestamp,
            state: state.into(),
        }
    }

    /// Any label other than `"on"`, including unknown ones, counts as inactive.
    pub fn is_active(&self) -> bool {
        self.state == ACTIVE_STATE
    }
}
