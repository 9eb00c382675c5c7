//! Command contract
//!
//! A command is invoked with its arguments, the shell, and its I/O. It
//! either finishes on the spot or hands back a [`Computation`]: a body
//! split into steps that the scheduler drives, checking for cancellation
//! between steps.

use super::executor::Shell;
use super::io::Io;
use futures::future::LocalBoxFuture;
use std::future::Future;
use std::rc::Rc;

/// Shared command implementation, as stored in filesystem nodes
pub type Executable = Rc<dyn Command>;

/// Something the shell can run. `args` does not include the command name.
pub trait Command {
    fn run(&self, args: &[String], shell: &Shell, io: &mut Io) -> Outcome;
}

impl<F> Command for F
where
    F: Fn(&[String], &Shell, &mut Io) -> Outcome,
{
    fn run(&self, args: &[String], shell: &Shell, io: &mut Io) -> Outcome {
        self(args, shell, io)
    }
}

/// What invoking a command produced
pub enum Outcome {
    /// Finished with an exit code
    Exit(i32),
    /// Finished without an opinion; counts as success
    NoOp,
    /// Not finished: drive this to completion
    Suspend(Box<dyn Computation>),
}

impl Outcome {
    pub fn suspend<C: Computation + 'static>(computation: C) -> Self {
        Outcome::Suspend(Box::new(computation))
    }
}

impl From<i32> for Outcome {
    fn from(code: i32) -> Self {
        Outcome::Exit(code)
    }
}

/// One step's result
pub enum Step {
    /// Run the next step on a later tick
    Yield,
    /// Wait for this to settle, then run the next step
    Await(LocalBoxFuture<'static, ()>),
    /// Finished; `None` means success
    Done(Option<i32>),
}

impl Step {
    pub fn wait<F: Future<Output = ()> + 'static>(future: F) -> Self {
        Step::Await(Box::pin(future))
    }

    pub fn done(code: i32) -> Self {
        Step::Done(Some(code))
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Yield => write!(f, "Yield"),
            Step::Await(_) => write!(f, "Await(..)"),
            Step::Done(code) => write!(f, "Done({:?})", code),
        }
    }
}

/// A command body that runs in steps
///
/// The scheduler calls `step` repeatedly. Nothing runs between steps except
/// other tasks and the cancellation check.
pub trait Computation {
    fn step(&mut self, shell: &Shell, io: &mut Io) -> Step;
}

impl<F> Computation for F
where
    F: FnMut(&Shell, &mut Io) -> Step,
{
    fn step(&mut self, shell: &Shell, io: &mut Io) -> Step {
        self(shell, io)
    }
}
