//! Escalating spin delay for blocking latch operations
//!
//! Short waits back off with [`crossbeam::utils::Backoff`] (spin, then
//! yield). Every `sleep_every` retries the waiter sleeps instead, for a time
//! proportional to the retry count and capped by the configuration.

use crossbeam::utils::Backoff;

use crate::config::SpinConfig;

/// Retry counter and delay policy for one blocking call
#[derive(Debug)]
pub struct SpinDelay {
    config: SpinConfig,
    spins: u32,
    backoff: Backoff,
}

impl SpinDelay {
    pub fn new(config: &SpinConfig) -> Self {
        Self {
            config: *config,
            spins: 0,
            backoff: Backoff::new(),
        }
    }

    /// Retries so far
    pub fn spins(&self) -> u32 {
        self.spins
    }

    /// Forget accumulated retries, e.g. after losing a CAS race that made
    /// progress possible again
    pub fn reset(&mut self) {
        self.spins = 0;
        self.backoff.reset();
    }

    /// Note a lost CAS race.
    ///
    /// Backoff starts over. With a timeout configured the race counts as a
    /// retry, so contention cannot postpone the timeout indefinitely;
    /// otherwise the retry count is cleared as well.
    pub fn contended(&mut self) -> std::result::Result<(), u32> {
        self.backoff.reset();
        match self.config.timeout_spins {
            Some(limit) => {
                self.spins = self.spins.saturating_add(1);
                if self.spins > limit {
                    return Err(self.spins);
                }
            }
            None => self.spins = 0,
        }
        Ok(())
    }

    /// Wait before the next retry.
    ///
    /// Returns `Err(spins)` once the configured timeout is exceeded.
    pub fn pause(&mut self) -> std::result::Result<(), u32> {
        self.spins = self.spins.saturating_add(1);
        if let Some(limit) = self.config.timeout_spins {
            if self.spins > limit {
                return Err(self.spins);
            }
        }

        self.wait();
        Ok(())
    }

    #[cfg(all(feature = "loom", test))]
    fn wait(&self) {
        crate::sync::yield_now();
    }

    #[cfg(not(all(feature = "loom", test)))]
    fn wait(&self) {
        let every = self.config.sleep_every.max(1);
        if self.spins % every == 0 {
            std::thread::sleep(self.config.sleep_for(self.spins));
        } else if self.backoff.is_completed() {
            crate::sync::yield_now();
        } else {
            self.backoff.snooze();
        }
    }
}
