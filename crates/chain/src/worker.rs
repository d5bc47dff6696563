//! Dedicated worker thread hosting one chain.
//!
//! Jobs run one at a time in FIFO order. A job that blocks on another job of
//! the same worker does not stall the queue: [`WorkerContext::pump_until`]
//! runs queued jobs inline on the blocked thread, so the call tree of a chain
//! unfolds as nested frames on one stack.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::class::ThreadRole;
use crate::error::panic_message;
use crate::signal::{Delivery, Dispatch, SignalWaiters};
use crate::spawn::spawn_named_thread;
use crate::{ChainError, ChainSpec, Result, TaskError, TaskFuture, TaskId, TaskOutcome, TaskPromise};

/// Upper bound on one idle sleep while pumping, so futures completed by
/// another thread are still noticed.
const PUMP_SLICE: Duration = Duration::from_millis(10);

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

thread_local! {
	/// Id of the worker hosted by this thread, if any.
	static HOSTED: Cell<Option<u64>> = const { Cell::new(None) };
	/// Jobs currently executing on this thread, innermost last.
	static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy)]
struct Frame {
	worker: u64,
	task: Option<TaskId>,
}

/// Pops the frame pushed for a job, even if the job unwinds.
struct FrameGuard;

impl Drop for FrameGuard {
	fn drop(&mut self) {
		FRAMES.with_borrow_mut(|frames| {
			frames.pop();
		});
	}
}

struct Job {
	task: Option<TaskId>,
	run: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct WorkerQueue {
	jobs: VecDeque<Job>,
	deliveries: VecDeque<Delivery>,
	closed: bool,
}

enum Next {
	Job(Job),
	Signals,
	Exit,
}

/// State shared between a chain, its worker thread, and signal sources.
pub(crate) struct WorkerShared {
	id: u64,
	name: String,
	queue: Mutex<WorkerQueue>,
	wake: Condvar,
	pub(crate) signals: SignalWaiters,
}

impl WorkerShared {
	fn push(&self, job: Job) {
		let mut queue = self.queue.lock();
		if queue.closed {
			tracing::warn!(chain = %self.name, task_id = ?job.task, "job submitted after worker closed; dropping");
			return;
		}
		queue.jobs.push_back(job);
		drop(queue);
		self.wake.notify_all();
	}

	/// Queues one signal delivery for dispatch on the worker thread.
	pub(crate) fn deliver(&self, delivery: Delivery) {
		let mut queue = self.queue.lock();
		queue.deliveries.push_back(delivery);
		let pending = queue.deliveries.len();
		drop(queue);
		tracing::trace!(chain = %self.name, pending, "signal.deliver");
		self.wake.notify_all();
	}

	fn close(&self) {
		self.queue.lock().closed = true;
		self.wake.notify_all();
	}

	fn is_current(&self) -> bool {
		HOSTED.get() == Some(self.id)
	}

	fn execute(&self, job: Job) {
		FRAMES.with_borrow_mut(|frames| {
			frames.push(Frame {
				worker: self.id,
				task: job.task,
			});
		});
		let _frame = FrameGuard;
		tracing::trace!(chain = %self.name, task_id = ?job.task, "worker.run");
		(job.run)();
	}

	fn take_deliveries(&self) -> VecDeque<Delivery> {
		std::mem::take(&mut self.queue.lock().deliveries)
	}

	/// Runs the predicates targeted by `deliveries`. Returns how many ran.
	///
	/// Deliveries for a predicate that is itself firing waiters further up the
	/// stack go back to the head of the queue, in order, for the next dispatch.
	fn dispatch(&self, deliveries: VecDeque<Delivery>) -> usize {
		let mut ran = 0;
		let mut busy = VecDeque::new();
		for delivery in deliveries {
			match self.signals.dispatch(&delivery) {
				Dispatch::Ran => ran += 1,
				Dispatch::Busy => busy.push_back(delivery),
				Dispatch::Gone => {}
			}
		}
		if !busy.is_empty() {
			tracing::trace!(chain = %self.name, requeued = busy.len(), "signal.requeue");
			let mut queue = self.queue.lock();
			busy.append(&mut queue.deliveries);
			queue.deliveries = busy;
		}
		ran
	}

	fn run_loop(&self) {
		HOSTED.set(Some(self.id));
		tracing::debug!(chain = %self.name, "worker.start");
		loop {
			let next = {
				let mut queue = self.queue.lock();
				loop {
					if let Some(job) = queue.jobs.pop_front() {
						break Next::Job(job);
					}
					if !queue.deliveries.is_empty() {
						break Next::Signals;
					}
					if queue.closed {
						break Next::Exit;
					}
					self.wake.wait(&mut queue);
				}
			};
			match next {
				Next::Job(job) => self.execute(job),
				Next::Signals => {
					let ran = self.dispatch(self.take_deliveries());
					tracing::trace!(chain = %self.name, ran, "worker.idle_signals");
				}
				Next::Exit => break,
			}
		}
		tracing::debug!(chain = %self.name, "worker.exit");
	}
}

/// Owning handle to one worker thread.
///
/// Dropping it closes the queue. The thread drains queued jobs before exiting.
pub(crate) struct WorkerContext {
	shared: Arc<WorkerShared>,
	thread: Option<JoinHandle<()>>,
	join_on_drop: bool,
}

impl WorkerContext {
	/// Starts the worker thread described by `spec`.
	pub fn spawn(spec: &ChainSpec) -> Result<Self> {
		let id = NEXT_WORKER.fetch_add(1, Ordering::Relaxed);
		let name = spec.name.clone().unwrap_or_else(|| format!("chain-{id}"));
		let shared = Arc::new(WorkerShared {
			id,
			name: name.clone(),
			queue: Mutex::new(WorkerQueue::default()),
			wake: Condvar::new(),
			signals: SignalWaiters::default(),
		});

		let thread = spawn_named_thread(ThreadRole::ChainWorker, name.clone(), spec.stack_size, {
			let shared = Arc::clone(&shared);
			move || shared.run_loop()
		})
		.map_err(|error| ChainError::Spawn { name, error })?;

		Ok(Self {
			shared,
			thread: Some(thread),
			join_on_drop: spec.join_on_drop,
		})
	}

	pub fn name(&self) -> &str {
		&self.shared.name
	}

	pub(crate) fn shared(&self) -> &Arc<WorkerShared> {
		&self.shared
	}

	/// Queues `body` and returns the future it will complete.
	///
	/// A panicking body completes the future with [`TaskError::Panicked`].
	#[cfg(test)]
	pub fn run(&self, task: Option<TaskId>, body: impl FnOnce() -> TaskOutcome + Send + 'static) -> TaskFuture {
		let (promise, future) = TaskPromise::new();
		self.run_with(promise, task, body);
		future
	}

	/// Queues `body` to complete a promise the caller already holds the future of.
	pub fn run_with(&self, promise: TaskPromise, task: Option<TaskId>, body: impl FnOnce() -> TaskOutcome + Send + 'static) {
		let chain = self.shared.name.clone();
		let run = Box::new(move || {
			let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
				Ok(outcome) => outcome,
				Err(payload) => {
					let message = panic_message(&*payload);
					tracing::warn!(chain = %chain, task_id = ?task, panic = %message, "chain task panicked");
					Err(TaskError::Panicked(message))
				}
			};
			promise.complete(outcome);
		});
		self.shared.push(Job { task, run });
	}

	/// Returns `true` when called on this worker's thread.
	pub fn is_current(&self) -> bool {
		self.shared.is_current()
	}

	/// Innermost task of this worker executing on the calling thread.
	pub fn current_task(&self) -> Option<TaskId> {
		FRAMES.with_borrow(|frames| frames.iter().rev().find(|f| f.worker == self.shared.id).and_then(|f| f.task))
	}

	/// Returns `true` if `task` is one of the frames on the calling thread's stack.
	pub fn is_executing(&self, task: TaskId) -> bool {
		FRAMES.with_borrow(|frames| frames.iter().any(|f| f.worker == self.shared.id && f.task == Some(task)))
	}

	/// Runs queued jobs inline until `future` completes or `deadline` passes.
	///
	/// Must only be called on the worker thread. Returns whether the future
	/// completed.
	pub fn pump_until(&self, future: &TaskFuture, deadline: Option<Instant>) -> bool {
		debug_assert!(self.is_current(), "pump_until called off the worker thread");
		loop {
			if future.is_completed() {
				return true;
			}
			if deadline.is_some_and(|d| Instant::now() >= d) {
				return false;
			}
			let job = {
				let mut queue = self.shared.queue.lock();
				let job = queue.jobs.pop_front();
				if job.is_none() {
					let slice = Instant::now() + PUMP_SLICE;
					let until = deadline.map_or(slice, |d| d.min(slice));
					self.shared.wake.wait_until(&mut queue, until);
				}
				job
			};
			if let Some(job) = job {
				self.shared.execute(job);
			}
		}
	}

	/// Dispatches every queued signal delivery. Returns how many predicates ran.
	///
	/// Off the worker thread this does nothing; the worker's idle loop
	/// dispatches instead. Called from inside a predicate, deliveries for that
	/// same predicate stay queued until a later dispatch.
	pub fn fire_signal_waiters(&self) -> usize {
		if !self.is_current() {
			tracing::debug!(chain = %self.shared.name, "signal.fire skipped off worker thread");
			return 0;
		}
		self.shared.dispatch(self.shared.take_deliveries())
	}

	/// Waits up to `timeout` for at least one delivery, then dispatches.
	pub fn fire_signal_waiters_for(&self, timeout: Duration) -> usize {
		if !self.is_current() {
			tracing::debug!(chain = %self.shared.name, "signal.fire skipped off worker thread");
			return 0;
		}
		let deadline = Instant::now().checked_add(timeout);
		let deliveries = {
			let mut queue = self.shared.queue.lock();
			while queue.deliveries.is_empty() {
				let timed_out = match deadline {
					Some(deadline) => self.shared.wake.wait_until(&mut queue, deadline).timed_out(),
					None => {
						self.shared.wake.wait(&mut queue);
						false
					}
				};
				if timed_out {
					break;
				}
			}
			std::mem::take(&mut queue.deliveries)
		};
		self.shared.dispatch(deliveries)
	}
}

impl Drop for WorkerContext {
	fn drop(&mut self) {
		self.shared.close();
		let Some(thread) = self.thread.take() else {
			return;
		};
		if self.is_current() || !self.join_on_drop {
			tracing::debug!(chain = %self.shared.name, "worker.detach");
			return;
		}
		if thread.join().is_err() {
			tracing::warn!(chain = %self.shared.name, "worker thread panicked");
		}
	}
}
