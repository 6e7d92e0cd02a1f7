/// Device module - backend collaborator interface and the simulated backend

pub mod device;
pub mod simulated_device;

pub use device::*;
pub use simulated_device::{
    SimulatedDevice, SimulatedDeviceConfig, CompletionMode, SubmittedBuffer,
};
