use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::consts::{PSF_SKEW_WAIT_ATTEMPTS, PSF_SKEW_WAIT_INTERVAL};
use crate::error::{LightsheetError, Result};

/// Source of delays, swapped out in tests.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Bounded polling: `attempts` sleeps, the n-th lasting
/// `interval * backoff^(n-1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub backoff: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: PSF_SKEW_WAIT_ATTEMPTS,
            interval: PSF_SKEW_WAIT_INTERVAL,
            backoff: 1,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff.saturating_pow(attempt.saturating_sub(1));
        self.interval.saturating_mul(factor)
    }
}

/// Poll `ready` until it holds, sleeping between checks. Returns `false`
/// once the policy is exhausted.
pub fn wait_until(policy: &RetryPolicy, clock: &dyn Clock, mut ready: impl FnMut() -> bool) -> bool {
    if ready() {
        return true;
    }
    for attempt in 1..=policy.attempts {
        clock.sleep(policy.delay(attempt));
        if ready() {
            return true;
        }
    }
    false
}

/// Block until `path` exists as a file.
pub fn wait_for_file(path: &Path, policy: &RetryPolicy, clock: &dyn Clock) -> Result<()> {
    let mut checks = 0;
    let found = wait_until(policy, clock, || {
        checks += 1;
        if checks > 1 {
            info!("still waiting on '{}'", path.display());
        }
        path.is_file()
    });
    if found {
        Ok(())
    } else {
        Err(LightsheetError::DependencyTimeout {
            path: path.to_path_buf(),
            attempts: policy.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeClock {
        slept: RefCell<Vec<Duration>>,
    }

    impl Clock for FakeClock {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    #[test]
    fn ready_immediately_never_sleeps() {
        let clock = FakeClock::default();
        assert!(wait_until(&RetryPolicy::default(), &clock, || true));
        assert!(clock.slept.borrow().is_empty());
    }

    #[test]
    fn gives_up_after_budget() {
        let clock = FakeClock::default();
        let policy = RetryPolicy::default();
        assert!(!wait_until(&policy, &clock, || false));
        assert_eq!(clock.slept.borrow().len(), 3);
        assert!(clock.slept.borrow().iter().all(|d| *d == Duration::from_secs(30)));
    }

    #[test]
    fn succeeds_on_late_appearance() {
        let clock = FakeClock::default();
        let mut calls = 0;
        assert!(wait_until(&RetryPolicy::default(), &clock, || {
            calls += 1;
            calls == 3
        }));
        assert_eq!(clock.slept.borrow().len(), 2);
    }

    #[test]
    fn backoff_grows_delay() {
        let policy = RetryPolicy {
            attempts: 3,
            interval: Duration::from_secs(1),
            backoff: 2,
        };
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn missing_file_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let err = wait_for_file(
            &dir.path().join("psf_skewed.tif"),
            &RetryPolicy::default(),
            &FakeClock::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LightsheetError::DependencyTimeout { attempts: 3, .. }));
    }
}
