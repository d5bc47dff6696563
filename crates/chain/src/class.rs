/// Roles of the threads this crate spawns, used for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ThreadRole {
	/// The dedicated thread executing one chain's tasks.
	ChainWorker,
	/// A short-lived thread emitting a delayed signal.
	SignalTimer,
}

impl ThreadRole {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::ChainWorker => "chain_worker",
			Self::SignalTimer => "signal_timer",
		}
	}
}
