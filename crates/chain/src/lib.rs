//! Thread-hosted task chains.
//!
//! A [`Chain`] owns one dedicated worker thread. Tasks submitted to it run
//! there one at a time, may submit further tasks to the same chain, and may
//! block on the ids of those tasks. Running tasks can also wait for external
//! events through [`SignalSource`]s.
//!
//! ```
//! use std::sync::Arc;
//!
//! use taskchain::Chain;
//!
//! let chain = Chain::create().unwrap();
//! let handle = Arc::clone(&chain);
//! let root = chain.add_task(move || {
//! 	let child = handle.add_task(|| std::thread::sleep(std::time::Duration::from_millis(5)));
//! 	handle.wait_for_task(child, None)
//! });
//! assert!(chain.wait_for_task(root, None));
//! ```

/// Chain lifecycle, task submission, and waiting.
mod chain;
/// Thread roles for observability.
mod class;
/// Error types.
mod error;
/// Completion futures.
mod future;
/// Task identifiers.
mod id;
/// Per-chain id to future map.
mod registry;
/// Signal sources and waiters.
mod signal;
/// Thread spawning helpers.
mod spawn;
/// Chain construction options.
mod spec;
/// Task bodies and bound arguments.
mod task;
/// Dedicated worker thread.
mod worker;

pub use chain::{Chain, ChainHandle, TaskHandle, live_chains};
pub use error::{ChainError, Result, TaskError};
pub use future::{TaskFuture, TaskOutcome, TaskPromise};
pub use id::TaskId;
pub use signal::{Signal, SignalSource, WaiterId};
pub use spec::ChainSpec;
pub use task::{IntoTaskOutcome, TaskBody};
