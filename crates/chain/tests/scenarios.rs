//! End-to-end scenarios: task trees and signal waits on one chain.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use taskchain::{Chain, Signal, SignalSource};

use common::{eventually, init_tracing};

const LONG: Option<Duration> = Some(Duration::from_secs(10));

#[test]
fn root_finishes_after_both_children() {
	init_tracing();
	let chain = Chain::create().unwrap();
	let stamps: Arc<Mutex<Vec<(&'static str, Instant)>>> = Arc::default();

	let handle = Arc::clone(&chain);
	let s = Arc::clone(&stamps);
	let root = chain.add_task(move || {
		let child = |label: &'static str| {
			let s = Arc::clone(&s);
			move || {
				std::thread::sleep(Duration::from_millis(30));
				s.lock().push((label, Instant::now()));
			}
		};
		let a = handle.add_task(child("a"));
		let b = handle.add_task(child("b"));
		let done = handle.wait_for_task(a, None) && handle.wait_for_task(b, None);
		s.lock().push(("root", Instant::now()));
		done
	});

	assert!(chain.wait_for_task(root, LONG));
	let stamps = stamps.lock();
	let at = |label| stamps.iter().find(|(l, _)| *l == label).map(|(_, t)| *t).unwrap();
	assert!(at("root") > at("a"));
	assert!(at("root") > at("b"));
	assert_eq!(chain.pending_tasks(), 0);
}

#[test]
fn root_polls_children_with_short_timeouts() {
	init_tracing();
	let chain = Chain::create().unwrap();
	let handle = Arc::clone(&chain);
	let polls = Arc::new(Mutex::new(0_u32));

	let p = Arc::clone(&polls);
	let root = chain.add_task(move || {
		let child = handle.add_task(|| std::thread::sleep(Duration::from_millis(30)));
		while !handle.wait_for_task(child, Some(Duration::from_millis(5))) {
			*p.lock() += 1;
		}
		true
	});

	assert!(chain.wait_for_task(root, LONG));
	// The first poll runs the queued child inline and sees it finish.
	assert_eq!(*polls.lock(), 0);
}

#[test]
fn task_observes_timer_signal() {
	init_tracing();
	let chain = Chain::create().unwrap();
	let timer = SignalSource::new("timer");
	let result = Arc::new(AtomicBool::new(false));

	let handle = Arc::clone(&chain);
	let r = Arc::clone(&result);
	let task = chain.add_task(move || {
		let fired = Arc::new(AtomicBool::new(false));
		let f = Arc::clone(&fired);
		handle.add_signal_waiter(&timer, "timeout", move |_| {
			f.store(true, Ordering::SeqCst);
			true
		});
		let _timer = timer.emit_after(Duration::from_millis(20), Signal::new("timeout"))?;

		let deadline = Instant::now() + Duration::from_secs(5);
		while !fired.load(Ordering::SeqCst) && Instant::now() < deadline {
			handle.fire_signal_waiters_for(Duration::from_millis(50));
		}
		r.store(fired.load(Ordering::SeqCst), Ordering::SeqCst);
		Ok::<(), std::io::Error>(())
	});

	assert!(chain.wait_for_task(task, LONG));
	assert!(result.load(Ordering::SeqCst));
	assert_eq!(chain.signal_waiters(), 0);

	let weak = chain.downgrade();
	drop(chain);
	assert!(eventually(|| weak.upgrade().is_none()));
}
