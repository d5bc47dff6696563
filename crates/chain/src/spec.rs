/// Construction options for one chain.
///
/// ```
/// let spec = taskchain::ChainSpec::new().name("indexer").stack_size(4 << 20);
/// let chain = taskchain::Chain::with_spec(spec).unwrap();
/// assert_eq!(chain.name(), "indexer");
/// ```
#[derive(Debug, Clone)]
pub struct ChainSpec {
	pub(crate) name: Option<String>,
	pub(crate) stack_size: Option<usize>,
	pub(crate) join_on_drop: bool,
}

impl ChainSpec {
	/// Creates a spec with default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the worker thread name. Defaults to `chain-<n>`.
	#[must_use]
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Sets the worker thread stack size in bytes.
	///
	/// # Panics
	///
	/// Panics if `bytes` is zero.
	#[must_use]
	pub fn stack_size(mut self, bytes: usize) -> Self {
		assert!(bytes > 0, "stack size must be > 0");
		self.stack_size = Some(bytes);
		self
	}

	/// Whether dropping the chain off its worker thread joins that thread.
	///
	/// A chain dropped on its own worker thread never joins, regardless.
	#[must_use]
	pub fn join_on_drop(mut self, join: bool) -> Self {
		self.join_on_drop = join;
		self
	}
}

impl Default for ChainSpec {
	fn default() -> Self {
		Self {
			name: None,
			stack_size: None,
			join_on_drop: true,
		}
	}
}
