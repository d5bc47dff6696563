use crate::class::ThreadRole;

/// Spawns a dedicated named OS thread tagged with its role.
pub(crate) fn spawn_named_thread<F, R>(role: ThreadRole, name: impl Into<String>, stack_size: Option<usize>, f: F) -> std::io::Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(thread_role = role.as_str(), thread = %name, "thread.spawn");
	let mut builder = std::thread::Builder::new().name(name);
	if let Some(size) = stack_size {
		builder = builder.stack_size(size);
	}
	builder.spawn(f)
}
