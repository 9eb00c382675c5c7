//! Signal System
//!
//! Software signals delivered to the shell from the host (Ctrl+C, end of
//! input). Delivery is asynchronous: the host sets a flag, possibly from
//! another thread, and the running command observes it at its next step
//! boundary. Nothing is preempted.
//!
//! | Signal    | Raised by          | Idle shell | Running command     |
//! |-----------|--------------------|------------|---------------------|
//! | Interrupt | Ctrl+C             | exit       | cancel at next step |
//! | Hangup    | end of input       | exit       | exit after command  |

use futures::task::AtomicWaker;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

/// Signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Interrupt (Ctrl+C)
    Interrupt,
    /// Hangup (input closed)
    Hangup,
}

impl Signal {
    /// Parse a conventional signal name
    pub fn from_name(name: &str) -> Option<Signal> {
        match name.trim_start_matches("SIG") {
            "INT" => Some(Signal::Interrupt),
            "HUP" => Some(Signal::Hangup),
            _ => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "SIGINT"),
            Signal::Hangup => write!(f, "SIGHUP"),
        }
    }
}

struct FlagInner {
    raised: AtomicBool,
    waker: AtomicWaker,
}

/// Cancellation flag shared between the host and the scheduler
///
/// Cloning shares the flag. `raise` may be called from any thread.
#[derive(Clone)]
pub struct SignalFlag {
    inner: Arc<FlagInner>,
}

impl SignalFlag {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FlagInner {
                raised: AtomicBool::new(false),
                waker: AtomicWaker::new(),
            }),
        }
    }

    /// Set the flag and wake anything waiting on it
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        self.inner.waker.wake();
    }

    /// Is the flag set?
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether it was set
    pub fn take(&self) -> bool {
        self.inner.raised.swap(false, Ordering::SeqCst)
    }

    /// Future that resolves once the flag is raised (does not clear it)
    pub fn raised(&self) -> Raised {
        Raised { flag: self.clone() }
    }

    /// Run `future` until it finishes or the flag is raised, whichever
    /// comes first. The flag is left set for the caller to observe.
    pub fn interruptible<F: Future>(&self, future: F) -> Interruptible<F> {
        Interruptible {
            inner: future,
            signal: self.raised(),
        }
    }
}

impl Default for SignalFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalFlag")
            .field("raised", &self.is_raised())
            .finish()
    }
}

/// Future returned by [`SignalFlag::raised`]
pub struct Raised {
    flag: SignalFlag,
}

impl Future for Raised {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.flag.is_raised() {
            return Poll::Ready(());
        }
        self.flag.inner.waker.register(cx.waker());
        // Re-check to close the race with a concurrent raise
        if self.flag.is_raised() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

pin_project! {
    /// Future returned by [`SignalFlag::interruptible`]
    pub struct Interruptible<F> {
        #[pin]
        inner: F,
        #[pin]
        signal: Raised,
    }
}

/// The flag was raised before the future finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl<F: Future> Future for Interruptible<F> {
    type Output = Result<F::Output, Interrupted>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(value) = this.inner.poll(cx) {
            return Poll::Ready(Ok(value));
        }
        match this.signal.poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Interrupted)),
            Poll::Pending => Poll::Pending,
        }
    }
}
