//! The deferred execution queue every settlement goes through.
//!
//! Each thread owns one queue made of a FIFO of microtasks and a set of
//! timers on a virtual clock. Nothing runs until the host drives the queue
//! with [`turn`], [`run_until_stalled`], [`run_until_idle`], [`advance`] or
//! [`block_on`]. Tasks enqueued while the queue is draining run in the same
//! drain, after everything enqueued before them.
//!
//! # Examples
//!
//! ```
//! use promise_aplus::queue;
//! use std::{cell::RefCell, rc::Rc, time::Duration};
//!
//! let log = Rc::new(RefCell::new(vec![]));
//! let (a, b, c) = (log.clone(), log.clone(), log.clone());
//! queue::set_timeout(Duration::from_millis(10), move || a.borrow_mut().push("timer"));
//! queue::enqueue(move || b.borrow_mut().push("first"));
//! queue::enqueue(move || c.borrow_mut().push("second"));
//!
//! queue::run_until_idle();
//! assert_eq!(*log.borrow(), vec!["first", "second", "timer"]);
//! assert_eq!(queue::now(), Duration::from_millis(10));
//! ```
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tracing::trace;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

pub const DEFAULT_MAX_TASKS_PER_TURN: usize = 1024;

/// Per-thread queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Upper bound of microtasks a single [`turn`] drains before it yields.
    /// Zero is treated as one.
    pub max_tasks_per_turn: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tasks_per_turn: DEFAULT_MAX_TASKS_PER_TURN,
        }
    }
}

/// What a single [`turn`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Turn {
    pub tasks_run: usize,
    pub timer_fired: bool,
    pub clock_advanced: bool,
}

impl Turn {
    /// Nothing was runnable.
    pub fn is_idle(&self) -> bool {
        self.tasks_run == 0 && !self.timer_fired
    }
}

#[derive(Default)]
struct Scheduler {
    config: Config,
    tasks: VecDeque<Task>,
    // keyed by (due, registration sequence) so equal deadlines fire in order
    timers: BTreeMap<(Duration, u64), Task>,
    now: Duration,
    next_seq: u64,
    draining: bool,
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::default());
}

fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    SCHEDULER.with(|scheduler| f(&mut scheduler.borrow_mut()))
}

/// Marks the queue as draining for as long as it lives.
struct Draining;

impl Draining {
    fn enter() -> Option<Self> {
        with(|s| {
            if s.draining {
                None
            } else {
                s.draining = true;
                Some(Draining)
            }
        })
    }
}

impl Drop for Draining {
    fn drop(&mut self) {
        with(|s| s.draining = false);
    }
}

/// Defers `task` to a later turn, after everything already enqueued.
pub fn enqueue(task: impl FnOnce() + 'static) {
    with(|s| s.tasks.push_back(Box::new(task)));
}

/// Runs `task` once `delay` of virtual time has passed.
pub fn set_timeout(delay: Duration, task: impl FnOnce() + 'static) {
    with(|s| {
        let due = s.now.saturating_add(delay);
        let seq = s.next_seq;
        s.next_seq += 1;
        s.timers.insert((due, seq), Box::new(task));
    });
}

pub fn configure(config: Config) {
    with(|s| {
        s.config = Config {
            max_tasks_per_turn: config.max_tasks_per_turn.max(1),
        }
    });
}

pub fn config() -> Config {
    with(|s| s.config)
}

/// Current virtual time of this thread's queue.
pub fn now() -> Duration {
    with(|s| s.now)
}

pub fn pending_tasks() -> usize {
    with(|s| s.tasks.len())
}

pub fn pending_timers() -> usize {
    with(|s| s.timers.len())
}

pub fn has_pending_work() -> bool {
    with(|s| !s.tasks.is_empty() || !s.timers.is_empty())
}

/// Drops every queued task and timer and rewinds the clock.
///
/// Promises waiting on dropped work stay pending forever.
pub fn reset() {
    let (tasks, timers) = with(|s| {
        s.now = Duration::ZERO;
        s.next_seq = 0;
        (std::mem::take(&mut s.tasks), std::mem::take(&mut s.timers))
    });
    // dropped outside the borrow, task captures may own promises
    drop(tasks);
    drop(timers);
}

fn is_draining() -> bool {
    with(|s| s.draining)
}

fn pop_task() -> Option<Task> {
    with(|s| s.tasks.pop_front())
}

fn drain_tasks(limit: usize) -> usize {
    let mut ran = 0;
    while ran < limit {
        match pop_task() {
            Some(task) => {
                task();
                ran += 1;
            }
            None => break,
        }
    }
    ran
}

/// Pops the earliest timer, moving the clock to its deadline when allowed.
fn pop_timer(may_advance: bool) -> Option<(Task, bool)> {
    with(|s| {
        let (&(due, seq), _) = s.timers.iter().next()?;
        if due > s.now && !may_advance {
            return None;
        }
        let task = s.timers.remove(&(due, seq))?;
        let advanced = due > s.now;
        if advanced {
            trace!(from = ?s.now, to = ?due, "queue clock advanced");
            s.now = due;
        }
        Some((task, advanced))
    })
}

fn turn_inner(may_advance: bool) -> Turn {
    let Some(_draining) = Draining::enter() else {
        trace!("nested queue drain refused");
        return Turn::default();
    };
    let limit = config().max_tasks_per_turn;
    let mut turn = Turn {
        tasks_run: drain_tasks(limit),
        ..Turn::default()
    };
    if pending_tasks() == 0 {
        if let Some((timer, advanced)) = pop_timer(may_advance) {
            timer();
            turn.timer_fired = true;
            turn.clock_advanced = advanced;
        }
    }
    if !turn.is_idle() {
        trace!(tasks = turn.tasks_run, timer = turn.timer_fired, "queue turn");
    }
    turn
}

/// Runs one turn of the loop.
///
/// Drains up to [`Config::max_tasks_per_turn`] microtasks; when none are
/// left, fires the earliest timer, moving the clock forward if it is not due
/// yet. Calling `turn` from inside a running task does nothing.
pub fn turn() -> Turn {
    turn_inner(true)
}

/// Runs every task and every due timer without moving the clock.
/// Returns the number of tasks and timers run.
pub fn run_until_stalled() -> usize {
    let mut ran = 0;
    loop {
        let turn = turn_inner(false);
        if turn.is_idle() {
            return ran;
        }
        ran += turn.tasks_run + usize::from(turn.timer_fired);
    }
}

/// Runs turns until no task or timer is left.
/// Returns the number of tasks and timers run.
pub fn run_until_idle() -> usize {
    let mut ran = 0;
    loop {
        let turn = turn();
        if turn.is_idle() {
            return ran;
        }
        ran += turn.tasks_run + usize::from(turn.timer_fired);
    }
}

/// Moves the clock forward by `delay`, running whatever becomes due on the
/// way in deadline order. Returns the number of tasks and timers run.
///
/// Like [`turn`], calling `advance` from inside a running task does nothing
/// and leaves the clock where it is.
pub fn advance(delay: Duration) -> usize {
    if is_draining() {
        trace!("nested queue advance refused");
        return 0;
    }
    let target = now().saturating_add(delay);
    let mut ran = run_until_stalled();
    loop {
        let next_due = with(|s| s.timers.keys().next().map(|&(due, _)| due));
        match next_due {
            Some(due) if due <= target => {
                with(|s| {
                    if due > s.now {
                        s.now = due;
                    }
                });
                let pass = run_until_stalled();
                if pass == 0 {
                    break;
                }
                ran += pass;
            }
            _ => break,
        }
    }
    with(|s| {
        if target > s.now {
            s.now = target;
        }
    });
    ran
}

/// Drives the queue until `future` completes.
///
/// Returns `None` when the queue runs out of work while the future is still
/// pending, which is how a promise that never settles shows up here.
///
/// # Examples
///
/// ```
/// use promise_aplus::{queue, Promise};
///
/// let promise: Promise<&str, ()> = Promise::resolve("🍓");
/// assert_eq!(queue::block_on(promise), Some(Ok("🍓")));
///
/// let never = Promise::<(), ()>::deferred().promise;
/// assert_eq!(queue::block_on(never), None);
/// ```
pub fn block_on<F: Future>(future: F) -> Option<F::Output> {
    let mut future = pin!(future);
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return Some(output);
        }
        if turn().is_idle() {
            return None;
        }
    }
}
