//! Common utilities for chain integration tests.

use std::time::{Duration, Instant};

/// Installs a log subscriber once per test binary.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Polls `cond` until it holds or five seconds pass.
pub fn eventually(cond: impl Fn() -> bool) -> bool {
	let deadline = Instant::now() + Duration::from_secs(5);
	while Instant::now() < deadline {
		if cond() {
			return true;
		}
		std::thread::sleep(Duration::from_millis(2));
	}
	cond()
}
