/// Priority bucket - deferred command buffers of one priority level
///
/// Registered buffers are counted as pending until `mark_ready` moves them
/// into the ready FIFO. `next_ready` blocks while buffers are pending and
/// none is ready, so a drain only leaves a bucket once it is empty.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::Result;
use crate::submission::CommandBuffer;
use crate::sync;
use crate::engine_err;

#[derive(Default)]
struct BucketState {
    ready: VecDeque<CommandBuffer>,
    pending: usize,
}

#[derive(Default)]
pub(crate) struct PriorityBucket {
    state: Mutex<BucketState>,
    ready_signal: Condvar,
}

impl PriorityBucket {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self) -> Result<()> {
        sync::lock(&self.state, "PriorityBucket")?.pending += 1;
        Ok(())
    }

    /// Move a registered buffer into the ready FIFO
    pub(crate) fn mark_ready(&self, mut buffer: CommandBuffer) -> Result<()> {
        let mut state = sync::lock(&self.state, "PriorityBucket")?;
        debug_assert!(state.pending > 0);
        state.pending = state.pending.saturating_sub(1);
        buffer.registered = false;
        state.ready.push_back(buffer);
        drop(state);

        self.ready_signal.notify_all();
        Ok(())
    }

    /// Forget a registered buffer that will never become ready
    pub(crate) fn withdraw(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.pending = state.pending.saturating_sub(1);
        drop(state);

        self.ready_signal.notify_all();
    }

    /// Next ready buffer, or `None` once nothing is ready or pending
    pub(crate) fn next_ready(&self) -> Result<Option<CommandBuffer>> {
        let mut state = sync::lock(&self.state, "PriorityBucket")?;
        loop {
            if let Some(buffer) = state.ready.pop_front() {
                return Ok(Some(buffer));
            }
            if state.pending == 0 {
                return Ok(None);
            }
            state = self
                .ready_signal
                .wait(state)
                .map_err(|_| engine_err!("nebula::PriorityBucket", "PriorityBucket lock poisoned"))?;
        }
    }

    /// (ready, pending) counts
    pub(crate) fn counts(&self) -> (usize, usize) {
        self.state
            .lock()
            .map(|s| (s.ready.len(), s.pending))
            .unwrap_or((0, 0))
    }
}
