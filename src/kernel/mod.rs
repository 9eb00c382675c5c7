//! The kernel - task execution, timers, and signal delivery
//!
//! Single-threaded and cooperative:
//! - One executor, ticked by the host
//! - Synchronous mental model, async implementation
//! - Small, auditable core

pub mod executor;
pub mod signal;
pub mod timer;

pub use executor::{Executor, JoinHandle, Runtime, TaskId, YieldNow, yield_now};
pub use signal::{Interrupted, Interruptible, Signal, SignalFlag};
pub use timer::{Clock, ManualClock, Sleep, SystemClock, Timers};
