//! Process-wide pass instance counting and eligibility.

/// Counts full annotation pass invocations against a run limit.
#[derive(Debug, Clone, Default)]
pub struct InstanceCoordinator {
    started: u32,
    current: Option<u32>,
    limit: Option<u32>,
}

impl InstanceCoordinator {
    /// `limit = None` means unlimited.
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            started: 0,
            current: None,
            limit,
        }
    }

    /// Starts the next instance. Every call consumes an index, eligible or
    /// not; returns the index only if the pass may run.
    pub fn begin(&mut self) -> Option<u32> {
        let instance = self.started;
        self.started = self.started.saturating_add(1);
        let eligible = self.limit.map_or(true, |limit| instance < limit);
        self.current = eligible.then_some(instance);
        self.current
    }

    /// Index of the running eligible instance.
    pub fn current(&self) -> Option<u32> {
        self.current
    }

    pub fn started(&self) -> u32 {
        self.started
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Control input is only read by instance 0.
    pub fn is_seeding(&self) -> bool {
        self.current == Some(0)
    }

    /// True during the final eligible instance (always, when unlimited).
    pub fn is_last_eligible(&self) -> bool {
        match (self.limit, self.current) {
            (None, _) => true,
            (Some(limit), Some(current)) => current + 1 == limit,
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_run_limit() {
        let mut c = InstanceCoordinator::new(Some(1));
        assert_eq!(c.begin(), Some(0));
        assert!(c.is_seeding());
        assert!(c.is_last_eligible());
        assert_eq!(c.begin(), None);
        assert!(!c.is_seeding());
        assert!(!c.is_last_eligible());
        assert_eq!(c.started(), 2);
    }

    #[test]
    fn test_zero_limit_never_runs() {
        let mut c = InstanceCoordinator::new(Some(0));
        assert_eq!(c.begin(), None);
        assert_eq!(c.begin(), None);
    }

    #[test]
    fn test_unlimited() {
        let mut c = InstanceCoordinator::new(None);
        for expected in 0..5 {
            assert_eq!(c.begin(), Some(expected));
            assert!(c.is_last_eligible());
        }
    }

    #[test]
    fn test_last_of_three() {
        let mut c = InstanceCoordinator::new(Some(3));
        c.begin();
        assert!(!c.is_last_eligible());
        c.begin();
        assert!(!c.is_last_eligible());
        c.begin();
        assert!(c.is_last_eligible());
        assert!(!c.is_seeding());
    }
}
