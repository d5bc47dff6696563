use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::id::IdClock;
use crate::{TaskFuture, TaskId};

/// Per-chain map from task id to that task's completion future.
///
/// Every operation holds the lock only for the map operation itself. Callers
/// clone the future out before waiting on it.
#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
	futures: Mutex<FxHashMap<TaskId, TaskFuture>>,
}

impl TaskRegistry {
	/// Issues the next id from `ids` and registers `future` under it in one
	/// critical section.
	pub fn register(&self, ids: &IdClock, future: TaskFuture) -> TaskId {
		let mut futures = self.futures.lock();
		let id = ids.next();
		futures.insert(id, future);
		id
	}

	/// Registers an id issued elsewhere.
	#[cfg(test)]
	pub fn insert(&self, id: TaskId, future: TaskFuture) {
		let previous = self.futures.lock().insert(id, future);
		debug_assert!(previous.is_none(), "task id {id} registered twice");
	}

	/// Returns the future registered under `id`, if still present.
	pub fn get(&self, id: TaskId) -> Option<TaskFuture> {
		self.futures.lock().get(&id).cloned()
	}

	/// Removes `id`. Returns `false` if it was already gone.
	pub fn remove(&self, id: TaskId) -> bool {
		self.futures.lock().remove(&id).is_some()
	}

	/// Returns the number of registered tasks.
	pub fn len(&self) -> usize {
		self.futures.lock().len()
	}

	/// Returns registered ids in ascending order.
	pub fn ids(&self) -> Vec<TaskId> {
		let mut ids: Vec<_> = self.futures.lock().keys().copied().collect();
		ids.sort_unstable();
		ids
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use pretty_assertions::assert_eq;

	use super::*;

	fn done() -> TaskFuture {
		TaskFuture::ready(Ok(true))
	}

	#[test]
	fn insert_get_remove() {
		let registry = TaskRegistry::default();
		registry.insert(TaskId::from_raw(2), done());
		registry.insert(TaskId::from_raw(1), done());

		assert_eq!(registry.ids(), vec![TaskId::from_raw(1), TaskId::from_raw(2)]);
		assert!(registry.get(TaskId::from_raw(1)).is_some());
		assert!(registry.get(TaskId::from_raw(3)).is_none());

		assert!(registry.remove(TaskId::from_raw(1)));
		assert!(!registry.remove(TaskId::from_raw(1)), "second removal is a no-op");
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn register_issues_increasing_ids() {
		let registry = TaskRegistry::default();
		let ids = IdClock::new();
		let first = registry.register(&ids, done());
		let second = registry.register(&ids, done());
		assert_eq!((first, second), (TaskId::from_raw(1), TaskId::from_raw(2)));
		assert_eq!(registry.ids(), vec![first, second]);
	}

	#[test]
	fn racing_removals_remove_each_id_once() {
		let registry = Arc::new(TaskRegistry::default());
		for raw in 1..=500 {
			registry.insert(TaskId::from_raw(raw), done());
		}

		let removed = Arc::new(AtomicUsize::new(0));
		let threads: Vec<_> = (0..4)
			.map(|_| {
				let registry = Arc::clone(&registry);
				let removed = Arc::clone(&removed);
				std::thread::spawn(move || {
					for raw in 1..=500 {
						if registry.remove(TaskId::from_raw(raw)) {
							removed.fetch_add(1, Ordering::SeqCst);
						}
					}
				})
			})
			.collect();
		for thread in threads {
			thread.join().unwrap();
		}

		assert_eq!(removed.load(Ordering::SeqCst), 500);
		assert_eq!(registry.len(), 0);
	}
}
