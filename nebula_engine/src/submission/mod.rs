//! Command submission
//!
//! `SubmissionQueue` hands out `CommandBuffer`s backed by fence-gated
//! recycled allocators, submits them in fence order and drains deferred
//! buffers by priority. `QueueSet` groups one queue per `QueueKind`.

pub mod command_buffer;
pub mod fence;
pub mod queue_set;
pub mod submission_queue;

mod command_pools;
mod priority_bucket;

pub use command_buffer::{CommandBuffer, CommandBufferDesc, CommandBufferState, ExecHook};
pub use fence::CompletionFence;
pub use queue_set::QueueSet;
pub use submission_queue::{SubmissionConfig, SubmissionQueue, SubmissionStats};
