/*!
# Nebula Engine

Concurrency and resource-lifetime core for a GPU rendering engine.

The device executes submitted work asynchronously and reports progress only
through monotonically increasing fence values. This crate keeps CPU-side
resources alive exactly as long as the device may still read them, and gives
the rendering code a small set of entry points built on that guarantee.

## Architecture

- **SubmissionQueue**: acquires, submits and recycles command buffers in fence order
- **QueueSet**: one submission queue per device queue kind
- **GrowableUploadHeap**: per-frame transient memory over fence-tagged rings
- **WorkerPool**: fixed worker threads fed by a bounded lock-free queue
- **LockFreeLinkedQueue / BoundedRingQueue**: MPMC queues used across the engine
- **Device**: backend trait; `SimulatedDevice` runs everything without a GPU

Everything public is reachable through the `nebula` namespace module.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod sync;
pub mod jobs;
pub mod device;
pub mod memory;
pub mod submission;

// Main nebula namespace module
pub mod nebula {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Concurrency primitives
    pub mod sync {
        pub use crate::sync::{LockFreeLinkedQueue, BoundedRingQueue, WaitEvent};
    }

    // Job system
    pub mod jobs {
        pub use crate::jobs::*;
    }

    // Device interface and simulated backend
    pub mod device {
        pub use crate::device::*;
    }

    // Transient memory
    pub mod memory {
        pub use crate::memory::*;
    }

    // Command submission
    pub mod submission {
        pub use crate::submission::*;
    }
}
