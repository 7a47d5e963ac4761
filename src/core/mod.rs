//! Control plane: the adaptive polling scheduler and the daemon runtime
//! that wires every subsystem together.

pub mod runtime;
pub mod scheduler;

pub use runtime::Agent;
pub use scheduler::{BurstTrigger, PollDecision, PollScheduler, WaitOutcome};
