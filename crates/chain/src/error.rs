//! Error types for chains and the tasks they run.

use std::any::Any;

use thiserror::Error;

/// Failure of one task body.
///
/// Stored in the task's own future. The chain's registry cleanup treats any
/// outcome as "finished", so a failure never blocks [`crate::Chain::wait_for_task`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
	/// The body panicked; carries the panic message when it was a string.
	#[error("task panicked: {0}")]
	Panicked(String),

	/// The body returned an `Err`.
	#[error("task failed: {0}")]
	Failed(String),

	/// The promise was dropped without ever being completed.
	#[error("task was abandoned before completing")]
	Abandoned,
}

/// Errors that can occur when creating a chain.
#[derive(Debug, Error)]
pub enum ChainError {
	/// The dedicated worker thread could not be spawned.
	#[error("failed to spawn worker thread for chain {name}: {error}")]
	Spawn {
		/// Name the worker thread would have had.
		name: String,
		/// The underlying I/O error.
		#[source]
		error: std::io::Error,
	},
}

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_owned()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_owned()
	}
}
