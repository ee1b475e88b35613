use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Process-wide ceiling on in-flight uploads. Shared by every capture session;
/// a tick that can't get a permit is dropped, never queued.
#[derive(Debug, Clone)]
pub struct UploadGate {
    in_flight: Arc<AtomicUsize>,
    ceiling: usize,
}

impl UploadGate {
    pub fn new(ceiling: usize) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            ceiling,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Reserve one upload slot, or `None` when the ceiling is reached.
    pub fn try_acquire(&self) -> Option<UploadPermit> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.ceiling {
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(UploadPermit {
                        in_flight: Arc::clone(&self.in_flight),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Releases its slot when dropped, whether the upload succeeded or not.
#[derive(Debug)]
pub struct UploadPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for UploadPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_refuses_over_ceiling_and_releases_on_drop() {
        let gate = UploadGate::new(2);
        let first = gate.try_acquire().unwrap();
        let _second = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_flight(), 2);

        drop(first);
        assert_eq!(gate.in_flight(), 1);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_gate_is_shared_between_clones() {
        let gate = UploadGate::new(1);
        let clone = gate.clone();
        let _permit = gate.try_acquire().unwrap();
        assert!(clone.try_acquire().is_none());
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_ceiling() {
        let gate = UploadGate::new(3);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.try_acquire())
            })
            .collect();
        let permits: Vec<_> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(permits.len(), 3);
        assert_eq!(gate.in_flight(), 3);
    }
}
