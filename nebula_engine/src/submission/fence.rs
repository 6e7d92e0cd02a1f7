/// Completion fence - monotonic 64-bit counter shared with the device
///
/// The CPU side hands out strictly increasing values; the device reports the
/// last value it finished. `last_completed` is cached and only moves forward.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::{Device, FenceHandle, QueueKind};
use crate::error::{Error, Result};
use crate::sync::{self, WaitEvent};
use crate::engine_bail;

pub struct CompletionFence {
    device: Arc<dyn Device>,
    kind: QueueKind,
    handle: FenceHandle,
    /// Last value handed out; the lock also serializes submission with signaling
    signal_lock: Mutex<u64>,
    last_signaled: AtomicU64,
    last_completed: AtomicU64,
}

impl CompletionFence {
    /// Create a fence at value 0 on the queue of the given kind
    ///
    /// # Errors
    ///
    /// - `InitializationFailed` if the device cannot create the fence
    pub fn new(device: Arc<dyn Device>, kind: QueueKind) -> Result<Self> {
        let handle = match device.create_fence(0) {
            Ok(handle) => handle,
            Err(e) => engine_bail!("nebula::CompletionFence", Error::InitializationFailed =>
                "Failed to create {} fence: {}", kind.name(), e),
        };

        Ok(Self {
            device,
            kind,
            handle,
            signal_lock: Mutex::new(0),
            last_signaled: AtomicU64::new(0),
            last_completed: AtomicU64::new(0),
        })
    }

    /// Run `submit`, then signal the next value, as one critical section
    ///
    /// Values returned are strictly increasing and follow the order in which
    /// `submit` closures reached the device.
    pub fn signal_after<F>(&self, submit: F) -> Result<u64>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut last = sync::lock(&self.signal_lock, "CompletionFence signal")?;
        submit()?;

        let value = *last + 1;
        self.device.signal_fence(self.kind, self.handle, value)?;
        *last = value;
        self.last_signaled.store(value, Ordering::Release);
        Ok(value)
    }

    /// Signal the next value with no work attached
    pub fn signal(&self) -> Result<u64> {
        self.signal_after(|| Ok(()))
    }

    /// Whether the device has reached `value`
    ///
    /// Once true for a value, stays true.
    pub fn is_complete(&self, value: u64) -> bool {
        if value <= self.last_completed.load(Ordering::Acquire) {
            return true;
        }
        value <= self.refresh()
    }

    /// Last value the device reported complete
    pub fn last_completed(&self) -> u64 {
        self.refresh()
    }

    /// Last value handed out by `signal`/`signal_after`
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled.load(Ordering::Acquire)
    }

    fn refresh(&self) -> u64 {
        let reported = self.device.completed_value(self.handle);
        let previous = self.last_completed.fetch_max(reported, Ordering::AcqRel);
        previous.max(reported)
    }

    /// Block until the device reaches `value`
    ///
    /// # Errors
    ///
    /// - `InvalidResource` if `value` was never signaled (the wait could not end)
    pub fn wait_for(&self, value: u64) -> Result<()> {
        if let Some(event) = self.prepare_wait(value)? {
            event.wait();
            self.last_completed.fetch_max(value, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Block until the device reaches `value` or `timeout` elapses
    ///
    /// Returns `Ok(false)` on timeout.
    pub fn wait_for_timeout(&self, value: u64, timeout: Duration) -> Result<bool> {
        match self.prepare_wait(value)? {
            None => Ok(true),
            Some(event) => {
                if event.wait_timeout(timeout) {
                    self.last_completed.fetch_max(value, Ordering::AcqRel);
                    Ok(true)
                } else {
                    Ok(self.is_complete(value))
                }
            }
        }
    }

    fn prepare_wait(&self, value: u64) -> Result<Option<Arc<WaitEvent>>> {
        if self.is_complete(value) {
            return Ok(None);
        }
        if value > self.last_signaled() {
            engine_bail!("nebula::CompletionFence", Error::InvalidResource =>
                "Wait for fence value {} which was never signaled (last {})", value, self.last_signaled());
        }

        let event = Arc::new(WaitEvent::new());
        self.device.set_completion_event(self.handle, value, event.clone())?;
        Ok(Some(event))
    }

    pub fn handle(&self) -> FenceHandle {
        self.handle
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }
}

impl std::fmt::Debug for CompletionFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionFence")
            .field("kind", &self.kind)
            .field("last_signaled", &self.last_signaled())
            .field("last_completed", &self.last_completed.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
#[path = "fence_tests.rs"]
mod tests;
