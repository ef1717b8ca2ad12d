use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counting gate bounding how many block validations run at once.
///
/// Acquisition never waits: when the gate is full the caller is refused and
/// must answer the client right away. A limit of zero admits everyone but
/// still counts.
#[derive(Clone, Debug)]
pub struct ValidationGate {
    limit: usize,
    active: Arc<AtomicUsize>,
}

impl ValidationGate {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Validations currently holding a permit.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Take a slot if one is free.
    pub fn try_acquire(&self) -> Option<ValidationPermit> {
        let limit = self.limit;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (limit == 0 || n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| ValidationPermit {
                active: Arc::clone(&self.active),
            })
    }
}

/// A held validation slot, released on drop.
#[derive(Debug)]
pub struct ValidationPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for ValidationPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded() {
        let gate = ValidationGate::new(2);
        let a = gate.try_acquire().unwrap();
        let b = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.active(), 2);

        drop(a);
        assert_eq!(gate.active(), 1);
        let _c = gate.try_acquire().unwrap();
        drop(b);
        assert_eq!(gate.active(), 1);
    }

    #[test]
    fn refused_acquire_does_not_count() {
        let gate = ValidationGate::new(1);
        let _a = gate.try_acquire().unwrap();
        for _ in 0..10 {
            assert!(gate.try_acquire().is_none());
        }
        assert_eq!(gate.active(), 1);
    }

    #[test]
    fn zero_is_unlimited() {
        let gate = ValidationGate::new(0);
        let permits: Vec<_> = (0..100).map(|_| gate.try_acquire().unwrap()).collect();
        assert_eq!(gate.active(), 100);
        drop(permits);
        assert_eq!(gate.active(), 0);
    }

    #[test]
    fn clones_share_the_count() {
        let gate = ValidationGate::new(1);
        let other = gate.clone();
        let _p = gate.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }

    #[test]
    fn released_across_threads() {
        let gate = ValidationGate::new(4);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = gate.try_acquire().unwrap();
                std::thread::spawn(move || drop(p))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(gate.active(), 0);
    }
}
