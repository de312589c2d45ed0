use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide busy gate shared by the ingestion and analysis runs.
///
/// One flag, no distinction between which run holds it. `try_start` never
/// blocks or queues; it either claims the gate or reports a conflict.
pub struct RunGuard {
    busy: AtomicBool,
}

/// The single per-process instance. Resets to idle on restart by construction.
pub static GUARD: RunGuard = RunGuard::new();

impl RunGuard {
    pub const fn new() -> Self {
        RunGuard {
            busy: AtomicBool::new(false),
        }
    }

    /// Claim the gate. Returns `None` immediately when a run is in flight.
    /// The transition is a single compare-and-set, safe under concurrent
    /// callers.
    pub fn try_start(&self) -> Option<RunPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit { guard: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the gate on drop, so the guard cannot stay busy after an error
/// or panic anywhere inside a run.
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn second_start_conflicts() {
        let guard = RunGuard::new();
        let permit = guard.try_start();
        assert!(permit.is_some());
        assert!(guard.try_start().is_none());
        drop(permit);
        assert!(guard.try_start().is_some());
    }

    #[test]
    fn released_after_panic() {
        let guard = Arc::new(RunGuard::new());
        let g = Arc::clone(&guard);
        let result = std::thread::spawn(move || {
            let _permit = g.try_start().unwrap();
            panic!("run blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!guard.is_busy());
        assert!(guard.try_start().is_some());
    }

    #[test]
    fn concurrent_starts_admit_exactly_one() {
        let guard = Arc::new(RunGuard::new());
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = Arc::clone(&guard);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                let permit = guard.try_start();
                let admitted = if permit.is_some() { 1 } else { 0 };
                // Everyone holds their outcome until all have tried.
                barrier.wait();
                drop(permit);
                admitted
            }));
        }
        let admitted: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 1);
        assert!(!guard.is_busy());
    }
}
