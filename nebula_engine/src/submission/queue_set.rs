/// One submission queue per device queue kind

use std::sync::Arc;

use crate::device::{Device, QueueKind};
use crate::error::Result;
use crate::submission::{SubmissionConfig, SubmissionQueue};

pub struct QueueSet {
    graphics: SubmissionQueue,
    compute: SubmissionQueue,
    copy: SubmissionQueue,
}

impl QueueSet {
    /// Create the graphics, compute and copy queues
    ///
    /// Each queue is labeled `{config.label}-{kind}`.
    pub fn new(device: Arc<dyn Device>, config: SubmissionConfig) -> Result<Self> {
        let make = |kind: QueueKind| {
            SubmissionQueue::new(
                device.clone(),
                kind,
                SubmissionConfig {
                    priority_levels: config.priority_levels,
                    label: format!("{}-{}", config.label, kind.name()),
                },
            )
        };

        Ok(Self {
            graphics: make(QueueKind::Graphics)?,
            compute: make(QueueKind::Compute)?,
            copy: make(QueueKind::Copy)?,
        })
    }

    pub fn queue(&self, kind: QueueKind) -> &SubmissionQueue {
        match kind {
            QueueKind::Graphics => &self.graphics,
            QueueKind::Compute => &self.compute,
            QueueKind::Copy => &self.copy,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubmissionQueue> {
        QueueKind::ALL.into_iter().map(move |kind| self.queue(kind))
    }

    /// Flush every queue, returning each queue's flushed fence value
    pub fn flush_all(&self) -> Result<[u64; 3]> {
        Ok([
            self.graphics.flush()?,
            self.compute.flush()?,
            self.copy.flush()?,
        ])
    }

    /// Drain every queue's deferred buckets, in `QueueKind::ALL` order
    pub fn drain_deferred_all(&self) -> Result<[u64; 3]> {
        Ok([
            self.graphics.drain_deferred()?,
            self.compute.drain_deferred()?,
            self.copy.drain_deferred()?,
        ])
    }
}

impl std::fmt::Debug for QueueSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
#[path = "queue_set_tests.rs"]
mod tests;
