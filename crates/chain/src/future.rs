//! Single-assignment completion primitive for task outcomes.
//!
//! A [`TaskPromise`] is the write side, a [`TaskFuture`] the cloneable read
//! side. Readers can block with an optional timeout, check completion without
//! blocking, chain callbacks, or `.await` the future from async code.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::TaskError;

/// Outcome of one task: its boolean result or the failure it raised.
pub type TaskOutcome = Result<bool, TaskError>;

type Callback = Box<dyn FnOnce(&TaskOutcome) + Send>;

#[derive(Default)]
struct Slot {
	outcome: Option<TaskOutcome>,
	callbacks: Vec<Callback>,
	wakers: Vec<Waker>,
}

#[derive(Default)]
struct Shared {
	slot: Mutex<Slot>,
	ready: Condvar,
}

impl Shared {
	/// Stores the outcome if none is set yet. Callbacks run outside the lock.
	fn settle(&self, outcome: TaskOutcome) -> bool {
		let (callbacks, wakers) = {
			let mut slot = self.slot.lock();
			if slot.outcome.is_some() {
				return false;
			}
			slot.outcome = Some(outcome.clone());
			(std::mem::take(&mut slot.callbacks), std::mem::take(&mut slot.wakers))
		};
		self.ready.notify_all();
		for waker in wakers {
			waker.wake();
		}
		for callback in callbacks {
			callback(&outcome);
		}
		true
	}
}

/// Write side of a task future.
///
/// Dropping a promise that was never completed settles it with
/// [`TaskError::Abandoned`], so waiters are never stranded.
pub struct TaskPromise {
	shared: Arc<Shared>,
}

impl TaskPromise {
	/// Creates a connected promise/future pair.
	pub fn new() -> (Self, TaskFuture) {
		let shared = Arc::new(Shared::default());
		let future = TaskFuture {
			shared: Arc::clone(&shared),
		};
		(Self { shared }, future)
	}

	/// Completes the future. Returns `false` if it was already completed.
	pub fn complete(self, outcome: TaskOutcome) -> bool {
		self.shared.settle(outcome)
	}
}

impl Drop for TaskPromise {
	fn drop(&mut self) {
		self.shared.settle(Err(TaskError::Abandoned));
	}
}

impl fmt::Debug for TaskPromise {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskPromise").finish_non_exhaustive()
	}
}

/// Read side of a task's completion.
#[derive(Clone)]
pub struct TaskFuture {
	shared: Arc<Shared>,
}

impl TaskFuture {
	/// Creates an already-completed future.
	pub fn ready(outcome: TaskOutcome) -> Self {
		let (promise, future) = TaskPromise::new();
		promise.complete(outcome);
		future
	}

	/// Returns `true` once an outcome has been stored.
	pub fn is_completed(&self) -> bool {
		self.shared.slot.lock().outcome.is_some()
	}

	/// Returns a copy of the outcome if completed.
	pub fn outcome(&self) -> Option<TaskOutcome> {
		self.shared.slot.lock().outcome.clone()
	}

	/// Blocks until completion or until `timeout` elapses.
	///
	/// `None` waits indefinitely. Returns whether the future completed.
	pub fn wait(&self, timeout: Option<Duration>) -> bool {
		self.wait_until(timeout.and_then(|t| Instant::now().checked_add(t)))
	}

	pub(crate) fn wait_until(&self, deadline: Option<Instant>) -> bool {
		let mut slot = self.shared.slot.lock();
		while slot.outcome.is_none() {
			match deadline {
				None => self.shared.ready.wait(&mut slot),
				Some(deadline) => {
					if self.shared.ready.wait_until(&mut slot, deadline).timed_out() {
						return slot.outcome.is_some();
					}
				}
			}
		}
		true
	}

	/// Registers a callback for the outcome.
	///
	/// Runs immediately on the calling thread if already completed, otherwise
	/// on the completing thread.
	pub fn on_complete(&self, f: impl FnOnce(&TaskOutcome) + Send + 'static) {
		let mut slot = self.shared.slot.lock();
		if let Some(outcome) = slot.outcome.clone() {
			drop(slot);
			f(&outcome);
			return;
		}
		slot.callbacks.push(Box::new(f));
	}

	/// Registers a callback that only runs on a successful outcome.
	pub fn on_success(&self, f: impl FnOnce(bool) + Send + 'static) {
		self.on_complete(move |outcome| {
			if let Ok(value) = outcome {
				f(*value);
			}
		});
	}

	/// Returns a future that maps failures through `f` and passes successes through.
	///
	/// The original future keeps its failure.
	pub fn recover(&self, f: impl FnOnce(&TaskError) -> bool + Send + 'static) -> TaskFuture {
		let (promise, recovered) = TaskPromise::new();
		self.on_complete(move |outcome| {
			let value = match outcome {
				Ok(value) => *value,
				Err(err) => f(err),
			};
			promise.complete(Ok(value));
		});
		recovered
	}
}

impl std::future::Future for TaskFuture {
	type Output = TaskOutcome;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let mut slot = self.shared.slot.lock();
		if let Some(outcome) = &slot.outcome {
			return Poll::Ready(outcome.clone());
		}
		if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
			slot.wakers.push(cx.waker().clone());
		}
		Poll::Pending
	}
}

impl fmt::Debug for TaskFuture {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskFuture").field("outcome", &self.outcome()).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn wait_times_out_until_completed() {
		let (promise, future) = TaskPromise::new();
		let start = Instant::now();
		assert!(!future.wait(Some(Duration::from_millis(20))));
		assert!(start.elapsed() >= Duration::from_millis(20));
		assert!(!future.is_completed());

		assert!(promise.complete(Ok(true)));
		assert!(future.wait(Some(Duration::from_millis(20))));
		assert!(future.wait(None));
		assert_eq!(future.outcome(), Some(Ok(true)));
	}

	#[test]
	fn wait_wakes_on_completion_from_other_thread() {
		let (promise, future) = TaskPromise::new();
		let completer = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(10));
			promise.complete(Ok(false));
		});
		assert!(future.wait(None));
		assert_eq!(future.outcome(), Some(Ok(false)));
		completer.join().unwrap();
	}

	#[test]
	fn dropped_promise_abandons() {
		let (promise, future) = TaskPromise::new();
		drop(promise);
		assert_eq!(future.outcome(), Some(Err(TaskError::Abandoned)));
	}

	#[test]
	fn callbacks_before_and_after_completion_both_run() {
		let (promise, future) = TaskPromise::new();
		let runs = Arc::new(AtomicUsize::new(0));

		let r = Arc::clone(&runs);
		future.on_complete(move |_| {
			r.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(runs.load(Ordering::SeqCst), 0);

		promise.complete(Ok(true));
		assert_eq!(runs.load(Ordering::SeqCst), 1);

		let r = Arc::clone(&runs);
		future.on_complete(move |_| {
			r.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(runs.load(Ordering::SeqCst), 2, "late callback should run immediately");
	}

	#[test]
	fn on_success_skips_failures() {
		let ran = Arc::new(AtomicBool::new(false));
		let r = Arc::clone(&ran);
		TaskFuture::ready(Err(TaskError::Failed("nope".into()))).on_success(move |_| r.store(true, Ordering::SeqCst));
		assert!(!ran.load(Ordering::SeqCst));
	}

	#[test]
	fn recover_maps_failure_and_keeps_original() {
		let original = TaskFuture::ready(Err(TaskError::Panicked("boom".into())));
		let recovered = original.recover(|err| matches!(err, TaskError::Panicked(_)));
		assert_eq!(recovered.outcome(), Some(Ok(true)));
		assert_eq!(original.outcome(), Some(Err(TaskError::Panicked("boom".into()))));

		let passthrough = TaskFuture::ready(Ok(false)).recover(|_| true);
		assert_eq!(passthrough.outcome(), Some(Ok(false)));
	}

	#[tokio::test]
	async fn can_be_awaited() {
		let (promise, future) = TaskPromise::new();
		let completer = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(5));
			promise.complete(Ok(true));
		});
		assert_eq!(future.await, Ok(true));
		completer.join().unwrap();
	}
}
