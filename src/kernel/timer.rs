//! Timer System
//!
//! Timed delays for commands that suspend (`sleep`, animations).
//!
//! Design:
//! - TimerQueue is a min-heap sorted by deadline
//! - Each timer wakes the future that is waiting on it
//! - The runtime advances the queue's notion of "now" once per tick
//! - Time comes from an injected [`Clock`], so tests can jump forward

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Source of monotonic time in milliseconds
pub trait Clock {
    /// Current time
    fn now(&self) -> f64;

    /// Block until `deadline`, or until woken from elsewhere if `None`.
    ///
    /// Returns false if the clock cannot make progress (nothing to wait for).
    fn wait_until(&self, deadline: Option<f64>) -> bool;
}

/// Wall-clock time; parks the runtime thread while waiting
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn wait_until(&self, deadline: Option<f64>) -> bool {
        match deadline {
            Some(deadline) => {
                let remaining = (deadline - self.now()).max(0.0);
                match Duration::try_from_secs_f64(remaining / 1000.0) {
                    Ok(timeout) => std::thread::park_timeout(timeout),
                    // Too far out to represent
                    Err(_) => std::thread::park(),
                }
            }
            // Wakers unpark us
            None => std::thread::park(),
        }
        true
    }
}

/// Manually driven time for tests: waiting jumps straight to the deadline
#[derive(Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn wait_until(&self, deadline: Option<f64>) -> bool {
        match deadline {
            Some(deadline) => {
                if deadline > self.now.get() {
                    self.now.set(deadline);
                }
                true
            }
            None => false,
        }
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn wait_until(&self, deadline: Option<f64>) -> bool {
        (**self).wait_until(deadline)
    }
}

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Timer is active and waiting
    Pending,
    /// Timer has fired
    Fired,
    /// Timer was cancelled
    Cancelled,
}

/// A timer that fires at a specific deadline
#[derive(Debug)]
pub struct Timer {
    pub id: TimerId,
    /// When this timer should fire (monotonic milliseconds)
    pub deadline: f64,
    /// Waker of the future waiting on this timer
    waker: Option<Waker>,
    pub state: TimerState,
}

impl Timer {
    fn new(id: TimerId, deadline: f64, waker: Option<Waker>) -> Self {
        Self {
            id,
            deadline,
            waker,
            state: TimerState::Pending,
        }
    }

    /// Check if timer has expired
    pub fn is_expired(&self, now: f64) -> bool {
        self.state == TimerState::Pending && now >= self.deadline
    }

    /// Fire the timer, returning the waker to wake (if any)
    fn fire(&mut self) -> Option<Waker> {
        if self.state == TimerState::Pending {
            self.state = TimerState::Fired;
            self.waker.take()
        } else {
            None
        }
    }
}

/// Entry in the timer heap (for ordering)
#[derive(Debug)]
struct TimerEntry {
    deadline: f64,
    id: TimerId,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest deadline first)
        other
            .deadline
            .partial_cmp(&self.deadline)
            .unwrap_or(Ordering::Equal)
    }
}

/// Timer queue - manages all active timers
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    timers: HashMap<TimerId, Timer>,
    next_id: u64,
    /// Time as of the last tick
    now: f64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time as of the last tick
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Schedule a one-shot timer relative to the last tick
    pub fn schedule(&mut self, delay_ms: f64, waker: Option<Waker>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let deadline = self.now + delay_ms.max(0.0);
        self.heap.push(TimerEntry { deadline, id });
        self.timers.insert(id, Timer::new(id, deadline, waker));

        id
    }

    /// Replace the waker a pending timer will wake
    pub fn update_waker(&mut self, id: TimerId, waker: &Waker) {
        if let Some(timer) = self.timers.get_mut(&id)
            && timer.state == TimerState::Pending
        {
            match &timer.waker {
                Some(existing) if existing.will_wake(waker) => {}
                _ => timer.waker = Some(waker.clone()),
            }
        }
    }

    /// Cancel a timer
    ///
    /// Returns true if the timer was pending and is now cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.get_mut(&id) {
            Some(timer) if timer.state == TimerState::Pending => {
                timer.state = TimerState::Cancelled;
                timer.waker = None;
                true
            }
            _ => false,
        }
    }

    /// Advance to `now` and fire expired timers, returning wakers to wake
    pub fn tick(&mut self, now: f64) -> Vec<Waker> {
        if now > self.now {
            self.now = now;
        }

        let mut to_wake = Vec::new();

        while let Some(entry) = self.heap.peek() {
            if entry.deadline > self.now {
                break;
            }
            let Some(entry) = self.heap.pop() else {
                break;
            };

            if let Some(timer) = self.timers.get_mut(&entry.id)
                && timer.is_expired(self.now)
                && let Some(waker) = timer.fire()
            {
                to_wake.push(waker);
            }
        }

        // Cancelled entries are dropped here; fired ones stay until observed
        self.timers.retain(|_, t| t.state != TimerState::Cancelled);

        to_wake
    }

    /// Has this timer fired? Forgets the timer once observed.
    pub fn take_fired(&mut self, id: TimerId) -> bool {
        match self.timers.get(&id) {
            Some(timer) if timer.state == TimerState::Fired => {
                self.timers.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Deadline of the next pending timer
    pub fn next_deadline(&self) -> Option<f64> {
        self.timers
            .values()
            .filter(|t| t.state == TimerState::Pending)
            .map(|t| t.deadline)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    }

    /// Number of pending timers
    pub fn pending_count(&self) -> usize {
        self.timers
            .values()
            .filter(|t| t.state == TimerState::Pending)
            .count()
    }

    /// Check if a timer exists and is pending
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers
            .get(&id)
            .map(|t| t.state == TimerState::Pending)
            .unwrap_or(false)
    }
}

/// Shared handle to the runtime's timer queue
#[derive(Clone, Default)]
pub struct Timers {
    queue: Rc<RefCell<TimerQueue>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// A future that completes `ms` milliseconds after its first poll
    pub fn sleep(&self, ms: f64) -> Sleep {
        Sleep {
            queue: self.queue.clone(),
            delay: ms,
            timer: None,
        }
    }

    pub fn tick(&self, now: f64) -> Vec<Waker> {
        self.queue.borrow_mut().tick(now)
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.queue.borrow().next_deadline()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().pending_count()
    }
}

/// Future returned by [`Timers::sleep`]
pub struct Sleep {
    queue: Rc<RefCell<TimerQueue>>,
    delay: f64,
    timer: Option<TimerId>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(id) = self.timer else {
            let id = self
                .queue
                .borrow_mut()
                .schedule(self.delay, Some(cx.waker().clone()));
            self.timer = Some(id);
            return Poll::Pending;
        };

        let mut queue = self.queue.borrow_mut();
        if queue.take_fired(id) {
            drop(queue);
            self.timer = None;
            self.delay = 0.0;
            return Poll::Ready(());
        }
        queue.update_waker(id, cx.waker());
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(id) = self.timer.take() {
            let mut queue = self.queue.borrow_mut();
            if !queue.cancel(id) {
                queue.take_fired(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use futures::task::noop_waker;

    #[test]
    fn test_oneshot_timer() {
        let mut queue = TimerQueue::new();
        let timer_id = queue.schedule(100.0, Some(noop_waker()));
        assert!(queue.is_pending(timer_id));
        assert_eq!(queue.pending_count(), 1);

        // Not expired yet
        assert!(queue.tick(50.0).is_empty());
        assert!(queue.is_pending(timer_id));

        // Now expired
        assert_eq!(queue.tick(100.0).len(), 1);
        assert!(!queue.is_pending(timer_id));
        assert!(queue.take_fired(timer_id));
        assert!(!queue.take_fired(timer_id));
    }

    #[test]
    fn test_multiple_timers_fire_in_deadline_order() {
        let mut queue = TimerQueue::new();
        let t1 = queue.schedule(100.0, None);
        let t2 = queue.schedule(50.0, None);

        queue.tick(50.0);
        assert!(queue.is_pending(t1));
        assert!(!queue.is_pending(t2));

        queue.tick(100.0);
        assert!(!queue.is_pending(t1));
    }

    #[test]
    fn test_cancel_timer() {
        let mut queue = TimerQueue::new();
        let timer_id = queue.schedule(100.0, Some(noop_waker()));
        assert!(queue.cancel(timer_id));
        assert!(!queue.cancel(timer_id));
        assert!(queue.tick(100.0).is_empty());
    }

    #[test]
    fn test_schedule_is_relative_to_last_tick() {
        let mut queue = TimerQueue::new();
        queue.tick(1000.0);
        queue.schedule(10.0, None);
        assert_eq!(queue.next_deadline(), Some(1010.0));
    }

    #[test]
    fn test_sleep_future() {
        let timers = Timers::new();
        let mut sleep = timers.sleep(20.0);

        assert!((&mut sleep).now_or_never().is_none());
        assert_eq!(timers.pending_count(), 1);

        timers.tick(10.0);
        assert!((&mut sleep).now_or_never().is_none());

        timers.tick(20.0);
        assert!(sleep.now_or_never().is_some());
        assert_eq!(timers.pending_count(), 0);
    }

    #[test]
    fn test_dropped_sleep_cancels_timer() {
        let timers = Timers::new();
        let mut sleep = timers.sleep(20.0);
        assert!((&mut sleep).now_or_never().is_none());
        drop(sleep);
        assert_eq!(timers.pending_count(), 0);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_manual_clock_jumps() {
        let clock = ManualClock::new();
        clock.advance(5.0);
        assert!(clock.wait_until(Some(50.0)));
        assert_eq!(clock.now(), 50.0);
        assert!(!clock.wait_until(None));
    }

    #[test]
    fn test_system_clock_unrepresentable_deadline_parks() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let clock = SystemClock::new();
        let waiter = std::thread::current();
        let done = Arc::new(AtomicBool::new(false));
        let waker = std::thread::spawn({
            let done = done.clone();
            move || {
                while !done.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(5));
                    waiter.unpark();
                }
            }
        });
        assert!(clock.wait_until(Some(f64::INFINITY)));
        assert!(clock.wait_until(Some(1e300)));
        done.store(true, Ordering::SeqCst);
        waker.join().unwrap();
    }
}
