use thiserror::Error;

/// Where a session's working snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    /// The remote event document.
    Remote,
    /// The local cache copy, used when the remote has nothing usable.
    Cache,
    /// Participant records stored outside the event document.
    Detached,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Remote => "remote",
            SnapshotSource::Cache => "cache",
            SnapshotSource::Detached => "detached",
        }
    }
}

/// Lifecycle of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Sources are being consulted.
    Loading,
    /// A snapshot was adopted; updates happen in place from here on.
    Ready(SnapshotSource),
    /// No source knows the event. Terminal.
    NotFound,
}

/// Outcome of the initial load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Resolved(SnapshotSource),
    Missing,
}

/// Error returned when an event does not apply to the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid session transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    pub from: SessionPhase,
    pub event: SessionEvent,
}

/// Phase tracker: `Loading` resolves exactly once, then never changes.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Loading,
        }
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Loading, SessionEvent::Resolved(source)) => SessionPhase::Ready(source),
            (SessionPhase::Loading, SessionEvent::Missing) => SessionPhase::NotFound,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        self.phase = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_phase_is_loading() {
        assert_eq!(SessionStateMachine::new().phase(), SessionPhase::Loading);
    }

    #[test]
    fn loading_resolves_once() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(
            sm.apply(SessionEvent::Resolved(SnapshotSource::Cache)),
            Ok(SessionPhase::Ready(SnapshotSource::Cache))
        );

        let err = sm
            .apply(SessionEvent::Resolved(SnapshotSource::Remote))
            .unwrap_err();
        assert_eq!(err.from, SessionPhase::Ready(SnapshotSource::Cache));
        assert_eq!(sm.phase(), SessionPhase::Ready(SnapshotSource::Cache));
    }

    #[test]
    fn not_found_is_terminal() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(sm.apply(SessionEvent::Missing), Ok(SessionPhase::NotFound));
        assert!(sm.apply(SessionEvent::Resolved(SnapshotSource::Remote)).is_err());
        assert!(sm.apply(SessionEvent::Missing).is_err());
    }
}
