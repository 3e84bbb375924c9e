use surge_core::prelude::Phase;

/// Turns the phase announcements of every worker into one run wide timeline.
///
/// Workers move through the same phases at slightly different times, so only the first
/// announcement of each phase is let through. Announcements for an index at or below the current one
/// are duplicates or stragglers.
#[derive(Debug, Default)]
pub(crate) struct PhaseTracker {
    current: Option<u32>,
}

impl PhaseTracker {
    /// Returns true if this phase advances the timeline.
    pub(crate) fn observe(&mut self, phase: &Phase) -> bool {
        if self.current.is_some_and(|current| phase.index <= current) {
            return false;
        }

        self.current = Some(phase.index);
        true
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Option<u32> {
        self.current
    }
}
