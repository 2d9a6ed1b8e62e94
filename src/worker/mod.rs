// src/worker/mod.rs

//! Task runner and foreground bridge
//!
//! Every long-running operation implements [`Job`] and is launched with
//! [`start`]. The job body runs on its own thread and talks to the
//! foreground only through channels:
//!
//! - progress snapshots, throttled on the worker side and coalesced on the
//!   foreground side so that each [`TaskHandle::tick`] delivers at most one
//! - a single completion [`Outcome`], delivered after the last progress
//!   snapshot, whether the job succeeded, failed or was cancelled
//!
//! Cancellation is cooperative: [`TaskHandle::cancel`] flips a shared flag
//! that the job observes at [`TaskContext::checkpoint`] calls and inside
//! every transfer progress hook.

use crate::error::{Error, Result};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

/// Minimum interval between two byte-progress notifications
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the worker notices at its next checkpoint
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Position inside a batch of items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProgress {
    /// 1-based index of the item being processed
    pub index: usize,
    pub count: usize,
    pub label: String,
}

/// Full progress snapshot of a worker
///
/// Each notification carries the whole state, so dropping an older
/// snapshot in favour of a newer one never loses information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub item: Option<ItemProgress>,
    pub bytes: u64,
    /// `None` while the total is unknown (indeterminate progress)
    pub total: Option<u64>,
}

impl Progress {
    /// Completed percentage of the current transfer, if the total is known
    pub fn percent(&self) -> Option<u8> {
        match self.total {
            Some(total) if total > 0 => {
                let pct = self.bytes.saturating_mul(100) / total;
                Some(pct.min(100) as u8)
            }
            _ => None,
        }
    }
}

/// Terminal state of a worker
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    /// Human-readable failure message
    Failed(String),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// A unit of background work
pub trait Job: Send + 'static {
    type Output: Send + 'static;

    /// Short name used for the thread and the tracing span
    fn name(&self) -> &'static str;

    /// Execute the job on the worker thread
    fn run(self, ctx: &TaskContext) -> Result<Self::Output>
    where
        Self: Sized;
}

/// Worker-side handle for progress reporting and cancellation checks
pub struct TaskContext {
    sender: Option<Sender<Progress>>,
    cancel: CancellationToken,
    interval: Duration,
    state: RefCell<Progress>,
    last_sent: Cell<Option<Instant>>,
}

impl TaskContext {
    fn new(sender: Sender<Progress>, cancel: CancellationToken, interval: Duration) -> Self {
        Self {
            sender: Some(sender),
            cancel,
            interval,
            state: RefCell::new(Progress::default()),
            last_sent: Cell::new(None),
        }
    }

    /// Context that is not connected to any foreground
    ///
    /// Used when a job body is run synchronously (tests, one-shot tools).
    pub fn detached(cancel: CancellationToken) -> Self {
        Self {
            sender: None,
            cancel,
            interval: DEFAULT_PROGRESS_INTERVAL,
            state: RefCell::new(Progress::default()),
            last_sent: Cell::new(None),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return `Err(Error::Cancelled)` once cancellation was requested
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            debug!("Cancellation observed");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Announce the next item of a batch; always delivered
    pub fn begin_item(&self, index: usize, count: usize, label: &str) {
        {
            let mut state = self.state.borrow_mut();
            state.item = Some(ItemProgress {
                index,
                count,
                label: label.to_string(),
            });
            state.bytes = 0;
            state.total = None;
        }
        self.send_now();
    }

    /// Transfer progress hook, throttled to the configured interval
    ///
    /// Doubles as a cancellation point.
    pub fn transfer(&self, bytes: u64, total: Option<u64>) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            state.bytes = bytes;
            state.total = total;
        }
        let due = match self.last_sent.get() {
            Some(at) => at.elapsed() >= self.interval,
            None => true,
        };
        if due {
            self.send_now();
        }
        self.checkpoint()
    }

    /// Report a finished transfer, bypassing the throttle
    pub fn transfer_done(&self, size: u64) {
        {
            let mut state = self.state.borrow_mut();
            state.bytes = size;
            state.total = Some(size);
        }
        self.send_now();
    }

    /// Switch to indeterminate progress (post-download processing)
    pub fn analyzing(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.bytes = 0;
            state.total = None;
        }
        self.send_now();
    }

    fn send_now(&self) {
        self.last_sent.set(Some(Instant::now()));
        if let Some(sender) = &self.sender {
            // The foreground may already be gone; progress is best-effort.
            let _ = sender.send(self.state.borrow().clone());
        }
    }
}

/// Options for [`start_with`]
#[derive(Debug, Clone)]
pub struct TaskOptions {
    pub cancel: CancellationToken,
    pub progress_interval: Duration,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// Foreground-side handle of a running worker
pub struct TaskHandle<T> {
    name: &'static str,
    cancel: CancellationToken,
    progress_rx: Receiver<Progress>,
    done_rx: Receiver<Outcome<T>>,
    thread: Option<JoinHandle<()>>,
    finished: bool,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        info!("Cancelling worker {}", self.name);
        self.cancel.cancel();
    }

    /// Forward an external interrupt (such as Ctrl-C) to the worker
    ///
    /// Returns `true` on the call that actually requests cancellation.
    pub fn cancel_if_set(&self, interrupt: &CancellationToken) -> bool {
        if interrupt.is_cancelled() && !self.cancel.is_cancelled() {
            self.cancel();
            true
        } else {
            false
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once the completion notification has been handed out
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// One foreground loop iteration
    ///
    /// Drains pending notifications, hands the newest progress snapshot (if
    /// any) to `on_progress`, then returns the outcome if the worker has
    /// finished. The outcome is returned exactly once.
    pub fn tick<F>(&mut self, mut on_progress: F) -> Option<Outcome<T>>
    where
        F: FnMut(&Progress),
    {
        if self.finished {
            return None;
        }

        // Check completion first: every snapshot sent before it is already
        // queued, so the drain below sees them all.
        let done = match self.done_rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Outcome::Failed(format!(
                "Worker {} exited without reporting a result",
                self.name
            ))),
        };

        if let Some(latest) = self.progress_rx.try_iter().last() {
            on_progress(&latest);
        }

        if done.is_some() {
            self.finished = true;
            self.join();
        }
        done
    }

    /// Block until the worker finishes, discarding progress
    pub fn wait(mut self) -> Outcome<T> {
        let outcome = self.done_rx.recv().unwrap_or_else(|_| {
            Outcome::Failed(format!(
                "Worker {} exited without reporting a result",
                self.name
            ))
        });
        self.finished = true;
        self.join();
        outcome
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Worker thread {} panicked after reporting", self.name);
        }
    }
}

/// Launch a job on its own thread with default options
pub fn start<J: Job>(job: J) -> Result<TaskHandle<J::Output>> {
    start_with(job, TaskOptions::default())
}

/// Launch a job on its own thread
pub fn start_with<J: Job>(job: J, options: TaskOptions) -> Result<TaskHandle<J::Output>> {
    let name = job.name();
    let (progress_tx, progress_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();
    let cancel = options.cancel.clone();
    let interval = options.progress_interval;

    info!("Starting worker {}", name);

    let thread = thread::Builder::new()
        .name(format!("stbpanel-{}", name))
        .spawn(move || {
            let span = info_span!("worker", job = name);
            let _guard = span.enter();

            let ctx = TaskContext::new(progress_tx, cancel, interval);
            let result = panic::catch_unwind(AssertUnwindSafe(|| job.run(&ctx)));
            let outcome = settle(result, ctx.is_cancelled());

            match &outcome {
                Outcome::Completed(_) => info!("Worker finished"),
                Outcome::Failed(message) => warn!("Worker failed: {}", message),
                Outcome::Cancelled => info!("Worker cancelled"),
            }

            // Drop the progress sender before completing so the foreground
            // never sees progress after the outcome.
            drop(ctx);
            let _ = done_tx.send(outcome);
        })
        .map_err(|e| Error::InitError(format!("Failed to spawn worker thread: {}", e)))?;

    Ok(TaskHandle {
        name,
        cancel: options.cancel,
        progress_rx,
        done_rx,
        thread: Some(thread),
        finished: false,
    })
}

/// Turn the raw job result into the single terminal outcome
fn settle<T>(result: std::thread::Result<Result<T>>, cancelled: bool) -> Outcome<T> {
    match result {
        _ if cancelled => Outcome::Cancelled,
        Ok(Ok(value)) => Outcome::Completed(value),
        Ok(Err(e)) if e.is_cancellation() => Outcome::Cancelled,
        Ok(Err(e)) => Outcome::Failed(e.to_string()),
        Err(payload) => Outcome::Failed(format!(
            "Unexpected internal error: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        items: usize,
    }

    impl Job for Counting {
        type Output = usize;

        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(self, ctx: &TaskContext) -> Result<usize> {
            let mut done = 0;
            for i in 0..self.items {
                ctx.checkpoint()?;
                ctx.begin_item(i + 1, self.items, &format!("item-{}", i + 1));
                ctx.transfer_done(10);
                done += 1;
            }
            Ok(done)
        }
    }

    struct Failing;

    impl Job for Failing {
        type Output = ();

        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(self, _ctx: &TaskContext) -> Result<()> {
            Err(Error::NotFoundError("nothing here".to_string()))
        }
    }

    struct Panicking;

    impl Job for Panicking {
        type Output = ();

        fn name(&self) -> &'static str {
            "panicking"
        }

        fn run(self, _ctx: &TaskContext) -> Result<()> {
            panic!("boom");
        }
    }

    struct WaitForCancel;

    impl Job for WaitForCancel {
        type Output = ();

        fn name(&self) -> &'static str {
            "wait-for-cancel"
        }

        fn run(self, ctx: &TaskContext) -> Result<()> {
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline {
                ctx.transfer(1, None)?;
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    #[test]
    fn test_external_interrupt_is_forwarded_once() {
        let interrupt = CancellationToken::new();
        let mut handle = start(WaitForCancel).unwrap();

        let trigger = interrupt.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });

        let mut forwarded = 0;
        let outcome = loop {
            if handle.cancel_if_set(&interrupt) {
                forwarded += 1;
            }
            if let Some(outcome) = handle.tick(|_| {}) {
                break outcome;
            }
            thread::sleep(Duration::from_millis(5));
        };

        assert!(outcome.is_cancelled());
        assert_eq!(forwarded, 1);
    }

    #[test]
    fn test_completed_outcome() {
        let handle = start(Counting { items: 3 }).unwrap();
        let outcome = handle.wait();
        assert_eq!(outcome.completed(), Some(3));
    }

    #[test]
    fn test_error_becomes_failed_message() {
        let outcome = start(Failing).unwrap().wait();
        match outcome {
            Outcome::Failed(message) => assert!(message.contains("nothing here")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_panic_is_caught() {
        let outcome = start(Panicking).unwrap().wait();
        match outcome {
            Outcome::Failed(message) => assert!(message.contains("boom")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_cancel_reports_cancelled() {
        let handle = start(WaitForCancel).unwrap();
        handle.cancel();
        assert!(handle.wait().is_cancelled());
    }

    #[test]
    fn test_cancelled_before_start_skips_work() {
        let options = TaskOptions::default();
        options.cancel.cancel();
        let outcome = start_with(Counting { items: 5 }, options).unwrap().wait();
        assert!(outcome.is_cancelled());
    }

    #[test]
    fn test_tick_delivers_outcome_once_after_progress() {
        let mut handle = start(Counting { items: 2 }).unwrap();
        let mut seen = Vec::new();
        let outcome = loop {
            if let Some(outcome) = handle.tick(|p| seen.push(p.clone())) {
                break outcome;
            }
            thread::sleep(Duration::from_millis(5));
        };

        assert_eq!(outcome.completed(), Some(2));
        assert!(handle.is_finished());
        assert!(handle.tick(|_| panic!("no progress after completion")).is_none());

        // The final snapshot delivered describes the last item.
        let last = seen.last().unwrap();
        assert_eq!(last.item.as_ref().unwrap().index, 2);
        assert_eq!(last.percent(), Some(100));
    }

    #[test]
    fn test_transfer_is_throttled() {
        let (tx, rx) = mpsc::channel();
        let ctx = TaskContext::new(tx, CancellationToken::new(), Duration::from_secs(60));
        for i in 0..100 {
            ctx.transfer(i, Some(100)).unwrap();
        }
        // Only the first call goes through within the interval.
        assert_eq!(rx.try_iter().count(), 1);
        ctx.transfer_done(100);
        assert_eq!(rx.try_iter().last().unwrap().bytes, 100);
    }

    #[test]
    fn test_progress_percent() {
        let unknown = Progress {
            item: None,
            bytes: 50,
            total: None,
        };
        assert_eq!(unknown.percent(), None);

        let half = Progress {
            item: None,
            bytes: 50,
            total: Some(200),
        };
        assert_eq!(half.percent(), Some(25));
    }
}
