//! Async executor for cooperative multitasking
//!
//! Designed for a single-threaded shell:
//! - Tick-based execution (the host decides when to run)
//! - Proper wake semantics (no busy-waiting)
//! - Timers advance from an injected clock once per tick
//! - `block_on` parks between ticks, so signals raised from another thread
//!   wake it
//!
//! There is no preemption. A task runs until it returns `Pending`.

use super::timer::{Clock, Timers};
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::task::{ArcWake, waker};
use slab::Slab;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::thread::Thread;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub usize);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Ready queue shared with wakers
struct ReadyQueue {
    ids: Mutex<VecDeque<TaskId>>,
    /// Thread to unpark when a task becomes ready
    thread: Thread,
}

impl ReadyQueue {
    fn push(&self, id: TaskId) {
        if let Ok(mut ids) = self.ids.lock()
            && !ids.contains(&id)
        {
            ids.push_back(id);
        }
        self.thread.unpark();
    }

    fn pop(&self) -> Option<TaskId> {
        self.ids.lock().ok().and_then(|mut ids| ids.pop_front())
    }

    fn is_empty(&self) -> bool {
        self.ids.lock().map(|ids| ids.is_empty()).unwrap_or(true)
    }
}

/// Waker that marks one task ready
struct TaskWaker {
    id: TaskId,
    ready: Arc<ReadyQueue>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.ready.push(arc_self.id);
    }
}

/// Handle to a spawned task's result
pub struct JoinHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<T>,
}

impl<T> JoinHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Take the result if the task has finished
    pub fn try_result(&mut self) -> Option<T> {
        self.rx.try_recv().ok().flatten()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

/// The executor - runs tasks cooperatively, one tick at a time
pub struct Executor {
    tasks: Slab<LocalBoxFuture<'static, ()>>,
    ready: Arc<ReadyQueue>,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            tasks: Slab::new(),
            ready: Arc::new(ReadyQueue {
                ids: Mutex::new(VecDeque::new()),
                thread: std::thread::current(),
            }),
        }
    }

    /// Spawn a future, returns task ID
    pub fn spawn<F>(&mut self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let id = TaskId(self.tasks.insert(Box::pin(future)));
        self.ready.push(id);
        id
    }

    /// Run one tick of execution
    ///
    /// Polls every task that was ready when the tick started.
    /// Returns the number of tasks that were polled.
    pub fn tick(&mut self) -> usize {
        let mut batch = Vec::new();
        while let Some(id) = self.ready.pop() {
            batch.push(id);
        }

        let mut polled = 0;
        for id in batch {
            let Some(future) = self.tasks.get_mut(id.0) else {
                // Stale wake for a finished task
                continue;
            };

            let waker = waker(Arc::new(TaskWaker {
                id,
                ready: self.ready.clone(),
            }));
            let mut cx = Context::from_waker(&waker);

            polled += 1;
            if future.as_mut().poll(&mut cx).is_ready() {
                self.tasks.remove(id.0);
            }
        }

        polled
    }

    /// Check if there are any active tasks
    pub fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Are any tasks waiting to be polled?
    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Get count of active tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel a task by ID
    ///
    /// The task's future is dropped immediately (cleanup via Drop).
    /// Returns true if the task existed.
    pub fn cancel_task(&mut self, id: TaskId) -> bool {
        self.tasks.try_remove(id.0).is_some()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// Executor plus timers plus a clock: everything a command needs to suspend
pub struct Runtime<C: Clock> {
    executor: Executor,
    timers: Timers,
    clock: C,
}

impl<C: Clock> Runtime<C> {
    pub fn new(clock: C) -> Self {
        Self {
            executor: Executor::new(),
            timers: Timers::new(),
            clock,
        }
    }

    /// Timer handle to give to the shell
    pub fn timers(&self) -> Timers {
        self.timers.clone()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Spawn a future whose result can be collected later
    pub fn spawn<F, T>(&mut self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.executor.spawn(async move {
            let _ = tx.send(future.await);
        });
        JoinHandle { id, rx }
    }

    /// Drop a task before it finishes
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.executor.cancel_task(id)
    }

    /// Fire due timers, then poll ready tasks once
    pub fn tick(&mut self) -> usize {
        for waker in self.timers.tick(self.clock.now()) {
            waker.wake();
        }
        self.executor.tick()
    }

    /// Tick until nothing is ready; time does not move
    pub fn run_until_stalled(&mut self) {
        loop {
            self.tick();
            if !self.executor.has_ready() {
                break;
            }
        }
    }

    /// Run a future to completion, waiting on the clock between ticks.
    ///
    /// Returns `None` if the future can never complete: nothing is ready,
    /// no timer is pending, and the clock cannot wait for an outside wake.
    pub fn block_on<F, T>(&mut self, future: F) -> Option<T>
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let mut handle = self.spawn(future);
        loop {
            self.tick();
            if let Some(result) = handle.try_result() {
                return Some(result);
            }
            if !self.executor.has_ready() {
                let deadline = self.timers.next_deadline();
                if !self.clock.wait_until(deadline) {
                    tracing::warn!(
                        tasks = self.executor.task_count(),
                        "runtime stalled: no task can ever wake"
                    );
                    self.executor.cancel_task(handle.id());
                    return None;
                }
            }
        }
    }

    pub fn has_tasks(&self) -> bool {
        self.executor.has_tasks()
    }
}

/// Future that returns `Pending` exactly once, rescheduling itself
///
/// Lets the host run between steps of a long computation.
pub struct YieldNow {
    yielded: bool,
}

/// Yield to the executor once
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
