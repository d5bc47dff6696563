//! Task bodies and their bound arguments.

use std::fmt::Display;

use crate::{TaskError, TaskOutcome};

/// Conversion from a task body's return value into a [`TaskOutcome`].
pub trait IntoTaskOutcome {
	fn into_outcome(self) -> TaskOutcome;
}

impl IntoTaskOutcome for () {
	fn into_outcome(self) -> TaskOutcome {
		Ok(true)
	}
}

impl IntoTaskOutcome for bool {
	fn into_outcome(self) -> TaskOutcome {
		Ok(self)
	}
}

impl<E: Display> IntoTaskOutcome for Result<(), E> {
	fn into_outcome(self) -> TaskOutcome {
		self.map(|()| true).map_err(|e| TaskError::Failed(e.to_string()))
	}
}

impl<E: Display> IntoTaskOutcome for Result<bool, E> {
	fn into_outcome(self) -> TaskOutcome {
		self.map_err(|e| TaskError::Failed(e.to_string()))
	}
}

/// A callable that can run as a task once its arguments are applied.
///
/// Implemented for every `FnOnce` of up to six arguments. `Args` is the tuple
/// of bound values, captured by value at submission time.
pub trait TaskBody<Args>: Send + 'static {
	type Output: IntoTaskOutcome;

	fn call(self, args: Args) -> Self::Output;
}

macro_rules! impl_task_body {
	($($arg:ident),*) => {
		impl<Func, Out, $($arg,)*> TaskBody<($($arg,)*)> for Func
		where
			Func: FnOnce($($arg),*) -> Out + Send + 'static,
			Out: IntoTaskOutcome,
		{
			type Output = Out;

			#[allow(non_snake_case)]
			fn call(self, ($($arg,)*): ($($arg,)*)) -> Out {
				self($($arg),*)
			}
		}
	};
}

impl_task_body!();
impl_task_body!(A);
impl_task_body!(A, B);
impl_task_body!(A, B, C);
impl_task_body!(A, B, C, D);
impl_task_body!(A, B, C, D, E);
impl_task_body!(A, B, C, D, E, F);
