//! Interruptible scheduler
//!
//! Drives a [`Computation`] one step at a time. The cancellation flag is
//! checked before every step; once it is seen the flag is cleared, the
//! remaining steps are skipped, and the command exits with 1.
//!
//! A step that never returns does not yield, so it cannot be interrupted.

use super::command::{Computation, Step};
use super::executor::Shell;
use super::io::Io;
use crate::kernel::yield_now;

/// Exit code of a cancelled command
pub const CANCELLED: i32 = 1;

/// Run `computation` to completion or cancellation
pub async fn drive(mut computation: Box<dyn Computation>, shell: &Shell, io: &mut Io) -> i32 {
    let signal = shell.signal();
    let mut steps = 0u64;
    loop {
        if signal.take() {
            tracing::info!(steps, "command cancelled");
            return CANCELLED;
        }
        steps += 1;
        match computation.step(shell, io) {
            Step::Yield => yield_now().await,
            Step::Await(settle) => settle.await,
            Step::Done(code) => return code.unwrap_or(0),
        }
    }
}
