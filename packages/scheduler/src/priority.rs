/// Urgency classes for scheduled work, most urgent first. Smaller numeric
/// value wins every comparison in the engine; `NoWork` is the absence of
/// pending work rather than a schedulable level.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityLevel {
    NoWork = 0,
    Synchronous = 1,
    Task = 2,
    Animation = 3,
    High = 4,
    Low = 5,
    Offscreen = 6,
}

impl PriorityLevel {
    /// Deferred levels run against a deadline and may be time-sliced.
    /// Synchronous, Task and Animation work runs to exhaustion.
    pub fn is_deferred(self) -> bool {
        matches!(
            self,
            PriorityLevel::High | PriorityLevel::Low | PriorityLevel::Offscreen
        )
    }

    /// The more urgent of two levels, treating `NoWork` as "nothing
    /// pending" rather than "most urgent".
    pub fn more_urgent(self, other: PriorityLevel) -> PriorityLevel {
        match (self, other) {
            (PriorityLevel::NoWork, b) => b,
            (a, PriorityLevel::NoWork) => a,
            (a, b) => a.min(b),
        }
    }

    /// True when `self` is pending work at least as urgent as `other`.
    pub fn at_least(self, other: PriorityLevel) -> bool {
        self != PriorityLevel::NoWork && self <= other
    }
}

/// How long a task at the given level may sit in the queue before it is
/// considered expired and must run even without budget. Milliseconds.
pub fn timeout_for_level(level: PriorityLevel) -> f64 {
    match level {
        PriorityLevel::NoWork => f64::MAX,
        PriorityLevel::Synchronous => -1.0,
        PriorityLevel::Task => 0.0,
        PriorityLevel::Animation => 100.0,
        PriorityLevel::High => 250.0,
        PriorityLevel::Low => 5000.0,
        PriorityLevel::Offscreen => 1073741823.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn more_urgent_prefers_smaller_level() {
        assert_eq!(
            PriorityLevel::Synchronous.more_urgent(PriorityLevel::Low),
            PriorityLevel::Synchronous
        );
        assert_eq!(
            PriorityLevel::Offscreen.more_urgent(PriorityLevel::Animation),
            PriorityLevel::Animation
        );
    }

    #[test]
    fn no_work_never_wins() {
        assert_eq!(
            PriorityLevel::NoWork.more_urgent(PriorityLevel::Low),
            PriorityLevel::Low
        );
        assert_eq!(
            PriorityLevel::Low.more_urgent(PriorityLevel::NoWork),
            PriorityLevel::Low
        );
        assert!(!PriorityLevel::NoWork.at_least(PriorityLevel::Offscreen));
    }

    #[test]
    fn at_least_is_inclusive() {
        assert!(PriorityLevel::Task.at_least(PriorityLevel::Task));
        assert!(PriorityLevel::Task.at_least(PriorityLevel::Low));
        assert!(!PriorityLevel::Low.at_least(PriorityLevel::Task));
    }
}
