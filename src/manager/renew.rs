use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::core::types::Expiry;

/// Time to wait before renewing a session expiring at `expires_at`.
pub fn renewal_delay(expires_at: Expiry, lead_time: Duration) -> Duration {
    expires_at
        .remaining()
        .unwrap_or_default()
        .saturating_sub(lead_time)
}

struct Slot {
    enabled: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Holds at most one pending renewal timer.
///
/// Every schedule or cancel bumps the generation; a fired timer only acts while its
/// generation is still current.
pub struct RenewScheduler {
    slot: Mutex<Slot>,
}

impl RenewScheduler {
    pub fn new(enabled: bool) -> Self {
        Self {
            slot: Mutex::new(Slot {
                enabled,
                generation: 0,
                timer: None,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.slot.lock().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.slot.lock().enabled = enabled;
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().timer.is_some()
    }

    /// Replaces any pending timer with one running `task` after `delay`.
    pub fn schedule<F, Fut>(&self, delay: Duration, task: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }

        let generation = slot.generation;
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task(generation).await;
        }));
        generation
    }

    /// Detaches a fired timer so that rescheduling from inside it does not abort it.
    /// Returns false when the timer has been superseded.
    pub fn release(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            return false;
        }
        slot.timer.take();
        true
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.slot.lock().generation == generation
    }

    /// Cancels the pending timer, if any.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for RenewScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.slot.get_mut().timer.take() {
            timer.abort();
        }
    }
}
