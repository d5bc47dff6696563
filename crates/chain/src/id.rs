use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Identifier of one task submitted to a chain.
///
/// Issued in strictly increasing order starting at 1. Never zero, never reused
/// within a chain's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(i64);

impl TaskId {
	/// Wraps a raw id. Useful for callers that persist ids as integers.
	pub const fn from_raw(raw: i64) -> Self {
		Self(raw)
	}

	/// Returns the raw id.
	pub const fn get(self) -> i64 {
		self.0
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Monotonic task id clock for one chain.
#[derive(Debug, Default)]
pub(crate) struct IdClock {
	last: AtomicI64,
}

impl IdClock {
	/// Creates a clock whose first issued id is 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next id.
	pub fn next(&self) -> TaskId {
		TaskId(self.last.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
	}

	/// Returns the most recently issued id, if any.
	pub fn last(&self) -> Option<TaskId> {
		match self.last.load(Ordering::Acquire) {
			0 => None,
			raw => Some(TaskId(raw)),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;

	#[test]
	fn first_id_is_one() {
		let clock = IdClock::new();
		assert_eq!(clock.last(), None);
		assert_eq!(clock.next(), TaskId::from_raw(1));
		assert_eq!(clock.next(), TaskId::from_raw(2));
		assert_eq!(clock.last(), Some(TaskId::from_raw(2)));
	}

	#[test]
	fn concurrent_ids_are_unique() {
		let clock = Arc::new(IdClock::new());
		let threads: Vec<_> = (0..4)
			.map(|_| {
				let clock = Arc::clone(&clock);
				std::thread::spawn(move || (0..250).map(|_| clock.next().get()).collect::<Vec<_>>())
			})
			.collect();

		let mut all: Vec<i64> = threads.into_iter().flat_map(|t| t.join().unwrap()).collect();
		all.sort_unstable();
		assert_eq!(all, (1..=1000).collect::<Vec<_>>());
	}

	#[test]
	fn display_is_prefixed() {
		assert_eq!(TaskId::from_raw(7).to_string(), "#7");
	}
}
