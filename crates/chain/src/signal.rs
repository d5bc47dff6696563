//! External events that a running task can wait on.
//!
//! A [`SignalSource`] may emit from any thread. Each emission is queued as a
//! delivery on every worker with a matching waiter, and the waiter's predicate
//! is evaluated on that worker's thread when deliveries are pumped.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::class::ThreadRole;
use crate::error::panic_message;
use crate::spawn::spawn_named_thread;
use crate::worker::WorkerShared;

/// Identifier of one registered signal waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterId(u64);

/// One emitted event: a name plus an optional payload.
#[derive(Clone)]
pub struct Signal {
	name: Arc<str>,
	payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Signal {
	/// Creates a signal without payload.
	pub fn new(name: impl AsRef<str>) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			payload: None,
		}
	}

	/// Creates a signal carrying `payload`.
	pub fn with_payload<T: Any + Send + Sync>(name: impl AsRef<str>, payload: T) -> Self {
		Self {
			name: Arc::from(name.as_ref()),
			payload: Some(Arc::new(payload)),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the payload if present and of type `T`.
	pub fn payload<T: Any>(&self) -> Option<&T> {
		self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
	}
}

impl fmt::Debug for Signal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("name", &self.name)
			.field("has_payload", &self.payload.is_some())
			.finish()
	}
}

struct Subscriber {
	signal: Arc<str>,
	waiter: WaiterId,
	sink: Weak<WorkerShared>,
}

struct SourceInner {
	name: String,
	subscribers: Mutex<Vec<Subscriber>>,
}

/// Cloneable emitter of named signals.
#[derive(Clone)]
pub struct SignalSource {
	inner: Arc<SourceInner>,
}

impl SignalSource {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			inner: Arc::new(SourceInner {
				name: name.into(),
				subscribers: Mutex::new(Vec::new()),
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Number of live waiters subscribed to this source.
	pub fn subscriber_count(&self) -> usize {
		self.inner.subscribers.lock().iter().filter(|s| s.sink.strong_count() > 0).count()
	}

	/// Queues `signal` on every subscribed worker. Returns the number of
	/// deliveries queued.
	pub fn emit(&self, signal: Signal) -> usize {
		let sinks: Vec<_> = {
			let mut subscribers = self.inner.subscribers.lock();
			subscribers.retain(|s| s.sink.strong_count() > 0);
			subscribers
				.iter()
				.filter(|s| *s.signal == *signal.name)
				.filter_map(|s| s.sink.upgrade().map(|sink| (s.waiter, sink)))
				.collect()
		};
		tracing::trace!(source = %self.inner.name, signal = signal.name(), receivers = sinks.len(), "signal.emit");
		for (waiter, sink) in &sinks {
			sink.deliver(Delivery {
				waiter: *waiter,
				signal: signal.clone(),
			});
		}
		sinks.len()
	}

	/// Emits `signal` from a background thread once `delay` has elapsed.
	///
	/// This is a single-shot timer; the handle yields the number of deliveries.
	pub fn emit_after(&self, delay: Duration, signal: Signal) -> std::io::Result<JoinHandle<usize>> {
		let source = self.clone();
		spawn_named_thread(ThreadRole::SignalTimer, format!("timer-{}", self.inner.name), None, move || {
			std::thread::sleep(delay);
			source.emit(signal)
		})
	}

	fn subscribe(&self, signal: Arc<str>, waiter: WaiterId, sink: Weak<WorkerShared>) {
		self.inner.subscribers.lock().push(Subscriber { signal, waiter, sink });
	}

	fn unsubscribe(inner: &SourceInner, waiter: WaiterId) {
		inner.subscribers.lock().retain(|s| s.waiter != waiter);
	}
}

impl fmt::Debug for SignalSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SignalSource").field("name", &self.inner.name).finish_non_exhaustive()
	}
}

/// One queued emission destined for one waiter.
pub(crate) struct Delivery {
	waiter: WaiterId,
	signal: Signal,
}

type Predicate = Box<dyn FnMut(&Signal) -> bool + Send>;

/// Result of handing one delivery to its waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
	/// The predicate ran.
	Ran,
	/// The predicate is already running further up the stack.
	Busy,
	/// The waiter was satisfied or removed.
	Gone,
}

struct Waiter {
	source: Weak<SourceInner>,
	/// `None` while the predicate is being evaluated.
	predicate: Option<Predicate>,
}

/// Waiters registered on one worker.
#[derive(Default)]
pub(crate) struct SignalWaiters {
	next: AtomicU64,
	waiters: Mutex<FxHashMap<WaiterId, Waiter>>,
}

impl SignalWaiters {
	/// Registers `predicate` for `signal` on `source`, delivering to `sink`.
	pub fn add(&self, source: &SignalSource, signal: &str, predicate: Predicate, sink: Weak<WorkerShared>) -> WaiterId {
		let id = WaiterId(self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1));
		self.waiters.lock().insert(
			id,
			Waiter {
				source: Arc::downgrade(&source.inner),
				predicate: Some(predicate),
			},
		);
		source.subscribe(Arc::from(signal), id, sink);
		tracing::trace!(source = %source.inner.name, signal, waiter = id.0, "signal.add_waiter");
		id
	}

	/// Deregisters a waiter. Returns `false` if it was already gone.
	pub fn remove(&self, id: WaiterId) -> bool {
		let Some(waiter) = self.waiters.lock().remove(&id) else {
			return false;
		};
		if let Some(source) = waiter.source.upgrade() {
			SignalSource::unsubscribe(&source, id);
		}
		true
	}

	pub fn len(&self) -> usize {
		self.waiters.lock().len()
	}

	/// Evaluates the predicate targeted by `delivery`.
	///
	/// A predicate returning `true` (or panicking) deregisters its waiter. A
	/// delivery reaching a predicate that is already running is reported as
	/// [`Dispatch::Busy`] and left to the caller to keep.
	pub fn dispatch(&self, delivery: &Delivery) -> Dispatch {
		let predicate = match self.waiters.lock().get_mut(&delivery.waiter) {
			None => return Dispatch::Gone,
			Some(waiter) => waiter.predicate.take(),
		};
		let Some(mut predicate) = predicate else {
			return Dispatch::Busy;
		};

		let satisfied = match panic::catch_unwind(AssertUnwindSafe(|| predicate(&delivery.signal))) {
			Ok(satisfied) => satisfied,
			Err(payload) => {
				tracing::warn!(waiter = delivery.waiter.0, panic = %panic_message(&*payload), "signal predicate panicked; removing waiter");
				true
			}
		};
		tracing::trace!(waiter = delivery.waiter.0, signal = delivery.signal.name(), satisfied, "signal.dispatch");

		if satisfied {
			self.remove(delivery.waiter);
		} else if let Some(waiter) = self.waiters.lock().get_mut(&delivery.waiter) {
			waiter.predicate = Some(predicate);
		}
		Dispatch::Ran
	}
}
