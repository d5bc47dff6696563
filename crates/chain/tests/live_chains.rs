//! The process-wide live-chain counter.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use taskchain::{Chain, live_chains};

use common::{eventually, init_tracing};

#[test]
#[serial]
fn counter_tracks_create_and_drop() {
	init_tracing();
	let before = live_chains();
	let a = Chain::create().unwrap();
	let b = Chain::create().unwrap();
	assert_eq!(live_chains(), before + 2);

	drop(a);
	assert_eq!(live_chains(), before + 1);
	drop(b);
	assert_eq!(live_chains(), before);
}

#[test]
#[serial]
fn running_task_keeps_chain_alive() {
	init_tracing();
	let before = live_chains();
	let chain = Chain::create().unwrap();
	let handle = Arc::clone(&chain);
	chain.add_task(move || {
		std::thread::sleep(Duration::from_millis(30));
		assert!(!handle.name().is_empty());
	});
	drop(chain);

	assert_eq!(live_chains(), before + 1, "task closure still holds the chain");
	assert!(eventually(|| live_chains() == before));
}
