use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation token for a scheduled task. Cancelling after the task ran is a
/// no-op.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Delayed-execution capability. Prefetch and keepalive are built on it so
/// tests can swap in [`ManualScheduler`] and drive virtual time.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/* =========================
   Wall-clock scheduler
   ========================= */

struct Timer {
    deadline: Instant,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest deadline first.
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One timer thread; each due task runs on its own short-lived thread so a
/// slow prefetch never delays a keepalive.
pub struct ThreadScheduler {
    tx: mpsc::Sender<Timer>,
    seq: Mutex<u64>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        if let Err(e) = thread::Builder::new()
            .name("spelltale-timers".into())
            .spawn(move || run_timers(rx))
        {
            warn!(error = %e, "failed to start timer thread");
        }

        Self {
            tx,
            seq: Mutex::new(0),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::default();
        let seq = {
            let mut seq = self.seq.lock();
            *seq += 1;
            *seq
        };

        let timer = Timer {
            deadline: Instant::now() + delay,
            seq,
            handle: handle.clone(),
            task,
        };

        if self.tx.send(timer).is_err() {
            warn!("timer thread is gone; task dropped");
            handle.cancel();
        }
        handle
    }
}

fn run_timers(rx: mpsc::Receiver<Timer>) {
    let mut heap: BinaryHeap<Timer> = BinaryHeap::new();

    loop {
        let received = match heap.peek() {
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(next) => rx.recv_timeout(next.deadline.saturating_duration_since(Instant::now())),
        };

        match received {
            Ok(timer) => heap.push(timer),
            Err(RecvTimeoutError::Timeout) => {}
            // Owner dropped: pending timers belong to a discarded context.
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        while heap.peek().is_some_and(|t| t.deadline <= now) {
            let Some(timer) = heap.pop() else { break };
            if timer.handle.is_cancelled() {
                continue;
            }
            let task = timer.task;
            if let Err(e) = thread::Builder::new()
                .name("spelltale-timer-task".into())
                .spawn(task)
            {
                warn!(error = %e, "failed to run timer task");
            }
        }
    }

    debug!("timer thread exiting");
}

/* =========================
   Virtual-time scheduler
   ========================= */

struct Pending {
    deadline: Duration,
    seq: u64,
    handle: TimerHandle,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    pending: Vec<Pending>,
}

/// Deterministic scheduler: nothing runs until [`ManualScheduler::advance`]
/// moves the virtual clock, and due tasks run inline on the caller's thread
/// in deadline order.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Scheduled, not yet run and not cancelled.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .pending
            .iter()
            .filter(|p| !p.handle.is_cancelled())
            .count()
    }

    /// Run every task due up to `now + by`, including tasks scheduled by
    /// tasks run during this call.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        loop {
            let next = {
                let mut state = self.state.lock();
                state.pending.retain(|p| !p.handle.is_cancelled());

                let due = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.deadline <= target)
                    .min_by_key(|(_, p)| (p.deadline, p.seq))
                    .map(|(i, _)| i);

                match due {
                    Some(i) => {
                        let pending = state.pending.swap_remove(i);
                        state.now = state.now.max(pending.deadline);
                        Some(pending.task)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            match next {
                // Lock released: tasks may schedule more work.
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::default();
        let mut state = self.state.lock();
        state.seq += 1;
        let pending = Pending {
            deadline: state.now + delay,
            seq: state.seq,
            handle: handle.clone(),
            task,
        };
        state.pending.push(pending);
        handle
    }
}
