//! Shutdown state machine (spec §4.6): `RUNNING -> STOPPING -> STOPPED`, driven
//! exclusively by the actor task in [`crate::actor`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownState {
    Running,
    Stopping,
    Stopped,
}

impl ShutdownState {
    pub fn accepts_submissions(&self) -> bool {
        matches!(self, ShutdownState::Running)
    }

    pub fn begin_stopping(&mut self) {
        if *self == ShutdownState::Running {
            *self = ShutdownState::Stopping;
        }
    }

    pub fn finalize_if_drained(&mut self, outstanding: usize, timer_stopped: bool) {
        if *self == ShutdownState::Stopping && outstanding == 0 && timer_stopped {
            *self = ShutdownState::Stopped;
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self == ShutdownState::Stopped
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        ShutdownState::Running
    }
}
