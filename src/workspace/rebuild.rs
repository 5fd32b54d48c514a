//! Coalescing guard for full re-diagnosis.
//!
//! A full pass is never run concurrently with another one.  A request that
//! arrives while a pass is running is remembered, and exactly one more pass
//! runs after the current one finishes, however many requests arrived.
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct State {
    running: bool,
    pending: bool,
}

#[derive(Debug, Default)]
pub struct RebuildGuard {
    state: Mutex<State>,
}

impl RebuildGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a pass.  Returns `true` when the caller should run it, or
    /// `false` when a running pass will pick the request up.
    pub fn begin(&self) -> bool {
        let mut state = self.state.lock();
        if state.running {
            state.pending = true;
            false
        } else {
            state.running = true;
            true
        }
    }

    /// Called by the runner after each pass.  Returns `true` when another
    /// pass was requested meanwhile and must run now.
    pub fn finish_pass(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending {
            state.pending = false;
            true
        } else {
            state.running = false;
            false
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_during_a_pass_coalesce_into_one() {
        let guard = RebuildGuard::new();
        assert!(guard.begin());
        assert!(guard.is_running());

        assert!(!guard.begin());
        assert!(!guard.begin());

        assert!(guard.finish_pass());
        assert!(!guard.finish_pass());
        assert!(!guard.is_running());

        assert!(guard.begin());
        assert!(!guard.finish_pass());
    }

    #[test]
    fn test_runner_loop_runs_pending_pass() {
        let guard = RebuildGuard::new();
        let mut passes = 0;
        assert!(guard.begin());
        loop {
            passes += 1;
            if passes == 1 {
                // a change arrives while the first pass runs
                assert!(!guard.begin());
            }
            if !guard.finish_pass() {
                break;
            }
        }
        assert_eq!(passes, 2);
    }
}
