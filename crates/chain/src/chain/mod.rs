use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::id::IdClock;
use crate::registry::TaskRegistry;
use crate::signal::{Signal, SignalSource, WaiterId};
use crate::task::{IntoTaskOutcome, TaskBody};
use crate::worker::WorkerContext;
use crate::{ChainSpec, Result, TaskFuture, TaskId, TaskOutcome, TaskPromise};


static LIVE_CHAINS: AtomicUsize = AtomicUsize::new(0);

/// Number of chains currently alive in this process. Diagnostic only.
pub fn live_chains() -> usize {
	LIVE_CHAINS.load(Ordering::Relaxed)
}

/// Shared handle to a chain.
pub type ChainHandle = Arc<Chain>;

/// A dedicated worker thread plus the registry of tasks submitted to it.
///
/// Tasks run serially on the worker thread. A task may submit further tasks to
/// its own chain (capture a [`ChainHandle`] for that) and block on their ids;
/// such a wait keeps running queued tasks inline, so a parent can wait on its
/// children without deadlocking the worker.
///
/// Completion callbacks only hold a weak reference, so the chain is destroyed
/// as soon as its creator and every task closure holding a handle let go.
pub struct Chain {
	name: String,
	this: Weak<Chain>,
	ids: IdClock,
	futures: TaskRegistry,
	worker: WorkerContext,
}

/// Id and future of one submitted task.
///
/// The future carries the task's real outcome, including failures that the
/// chain's own bookkeeping treats as plain completion.
#[derive(Debug, Clone)]
pub struct TaskHandle {
	id: TaskId,
	future: TaskFuture,
}

impl TaskHandle {
	pub fn id(&self) -> TaskId {
		self.id
	}

	pub fn future(&self) -> &TaskFuture {
		&self.future
	}

	pub fn is_completed(&self) -> bool {
		self.future.is_completed()
	}

	pub fn outcome(&self) -> Option<TaskOutcome> {
		self.future.outcome()
	}
}

impl Chain {
	/// Creates a chain with default options and starts its worker thread.
	pub fn create() -> Result<ChainHandle> {
		Self::with_spec(ChainSpec::default())
	}

	/// Creates a chain from `spec` and starts its worker thread.
	pub fn with_spec(spec: ChainSpec) -> Result<ChainHandle> {
		let worker = WorkerContext::spawn(&spec)?;
		let chain = Arc::new_cyclic(|this| Chain {
			name: worker.name().to_owned(),
			this: this.clone(),
			ids: IdClock::new(),
			futures: TaskRegistry::default(),
			worker,
		});
		let live = LIVE_CHAINS.fetch_add(1, Ordering::Relaxed) + 1;
		tracing::debug!(chain = %chain.name, live, "chain.create");
		Ok(chain)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns a weak handle, e.g. to observe when the chain is gone.
	pub fn downgrade(&self) -> Weak<Chain> {
		self.this.clone()
	}

	/// Submits `body` and returns its id.
	pub fn add_task<F>(&self, body: F) -> TaskId
	where
		F: TaskBody<()>,
	{
		self.submit_with(body, ()).id
	}

	/// Submits `body` with bound arguments and returns its id.
	///
	/// ```
	/// let chain = taskchain::Chain::create().unwrap();
	/// let id = chain.add_task_with(|a: u32, b: u32| a + b == 5, (2, 3));
	/// assert!(chain.wait_for_task(id, None));
	/// ```
	pub fn add_task_with<F, Args>(&self, body: F, args: Args) -> TaskId
	where
		F: TaskBody<Args>,
		Args: Send + 'static,
	{
		self.submit_with(body, args).id
	}

	/// Submits `body` and returns a handle carrying its future.
	pub fn submit<F>(&self, body: F) -> TaskHandle
	where
		F: TaskBody<()>,
	{
		self.submit_with(body, ())
	}

	/// Submits `body` with bound arguments and returns a handle carrying its future.
	pub fn submit_with<F, Args>(&self, body: F, args: Args) -> TaskHandle
	where
		F: TaskBody<Args>,
		Args: Send + 'static,
	{
		let (promise, future) = TaskPromise::new();
		// The id becomes visible together with its entry, so it never reads as finished before it runs.
		let id = self.futures.register(&self.ids, future.clone());

		let this = self.this.clone();
		future.recover(|_| true).on_success(move |_| {
			if let Some(chain) = this.upgrade() {
				chain.forget(id, "completion");
			}
		});
		self.worker.run_with(promise, Some(id), move || body.call(args).into_outcome());

		tracing::trace!(chain = %self.name, task_id = %id, pending = self.futures.len(), "chain.add_task");
		TaskHandle { id, future }
	}

	/// Returns the future of a task that has not been cleaned up yet.
	pub fn task_future(&self, id: TaskId) -> Option<TaskFuture> {
		self.futures.get(id)
	}

	/// Blocks until task `id` finishes or `timeout` elapses.
	///
	/// `None` waits indefinitely. Unknown or already cleaned-up ids count as
	/// finished. On the chain's own worker thread the wait runs queued tasks
	/// inline while it blocks. Waiting there on a task that encloses the caller
	/// can never succeed.
	///
	/// The deadline is checked between inline tasks, so on the worker thread a
	/// timed-out wait may overrun `timeout` by the length of at most one queued
	/// task. Tasks queued behind `id` are never run by the wait.
	pub fn wait_for_task(&self, id: TaskId, timeout: Option<Duration>) -> bool {
		self.wait_until(id, timeout.and_then(|t| Instant::now().checked_add(t)))
	}

	/// Waits for every task registered at call time, sharing one deadline.
	///
	/// Called from a task, the calling task and the tasks enclosing it are
	/// skipped, since none of them can finish while this wait runs.
	pub fn wait_for_all(&self, timeout: Option<Duration>) -> bool {
		let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
		self.futures
			.ids()
			.into_iter()
			.filter(|id| !self.worker.is_executing(*id))
			.all(|id| self.wait_until(id, deadline))
	}

	/// Non-blocking variant of [`Self::wait_for_task`].
	pub fn touch_task(&self, id: TaskId) -> bool {
		let Some(future) = self.futures.get(id) else {
			return true;
		};
		if !future.is_completed() {
			return false;
		}
		self.forget(id, "touch");
		true
	}

	/// Number of submitted tasks not yet cleaned up.
	pub fn pending_tasks(&self) -> usize {
		self.futures.len()
	}

	/// Most recently issued task id.
	pub fn last_task_id(&self) -> Option<TaskId> {
		self.ids.last()
	}

	/// Returns `true` when called on this chain's worker thread.
	pub fn is_worker_thread(&self) -> bool {
		self.worker.is_current()
	}

	/// Innermost task of this chain executing on the calling thread.
	pub fn current_task(&self) -> Option<TaskId> {
		self.worker.current_task()
	}

	/// Registers `predicate` to run on this chain's worker when `source`
	/// emits `signal`.
	///
	/// Returning `true` ends the wait and removes the waiter; `false` keeps
	/// watching.
	pub fn add_signal_waiter<P>(&self, source: &SignalSource, signal: &str, predicate: P) -> WaiterId
	where
		P: FnMut(&Signal) -> bool + Send + 'static,
	{
		let shared = self.worker.shared();
		shared.signals.add(source, signal, Box::new(predicate), Arc::downgrade(shared))
	}

	/// Removes a waiter before it is satisfied.
	pub fn remove_signal_waiter(&self, id: WaiterId) -> bool {
		self.worker.shared().signals.remove(id)
	}

	/// Number of registered signal waiters.
	pub fn signal_waiters(&self) -> usize {
		self.worker.shared().signals.len()
	}

	/// Evaluates waiters for every signal delivered so far.
	///
	/// Call from a task body. Returns how many predicates ran.
	pub fn fire_signal_waiters(&self) -> usize {
		self.worker.fire_signal_waiters()
	}

	/// Like [`Self::fire_signal_waiters`], first waiting up to `timeout` for a
	/// delivery to arrive.
	pub fn fire_signal_waiters_for(&self, timeout: Duration) -> usize {
		self.worker.fire_signal_waiters_for(timeout)
	}

	fn wait_until(&self, id: TaskId, deadline: Option<Instant>) -> bool {
		let Some(future) = self.futures.get(id) else {
			return true;
		};

		let done = if self.worker.is_current() {
			if self.worker.is_executing(id) {
				tracing::warn!(chain = %self.name, task_id = %id, "waiting on an enclosing task; it cannot finish until this wait returns");
			}
			self.worker.pump_until(&future, deadline)
		} else {
			future.wait_until(deadline)
		};

		if done {
			self.forget(id, "wait");
		}
		done
	}

	fn forget(&self, id: TaskId, via: &'static str) {
		if self.futures.remove(id) {
			tracing::trace!(chain = %self.name, task_id = %id, via, "chain.task.cleanup");
		}
	}
}

impl Drop for Chain {
	fn drop(&mut self) {
		let live = LIVE_CHAINS.fetch_sub(1, Ordering::Relaxed) - 1;
		tracing::debug!(chain = %self.name, pending = self.futures.len(), live, "chain.drop");
	}
}
