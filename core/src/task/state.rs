use std::fmt;

/// Lifecycle of a single runner.
///
/// `NotStarted -> Sending -> Receiving -> Completed`, with `Failed` reachable
/// from every non-terminal state. Nothing leaves `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    NotStarted,
    Sending,
    Receiving,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (NotStarted, Sending)
                | (NotStarted, Failed)
                | (Sending, Receiving)
                | (Sending, Failed)
                | (Receiving, Completed)
                | (Receiving, Failed)
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TaskState::NotStarted => "NotStarted",
            TaskState::Sending => "Sending",
            TaskState::Receiving => "Receiving",
            TaskState::Completed => "Completed",
            TaskState::Failed => "Failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
