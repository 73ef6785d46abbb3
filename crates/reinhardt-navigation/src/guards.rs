//! Guard and resolver return values.
//!
//! Guards and resolvers may answer synchronously, with a future, or with a
//! stream. All three are normalised to "the first value wins": later stream
//! items are ignored, and a stream that ends without any item yields `None`,
//! which the router turns into a cancellation rather than an error.

use futures::future::BoxFuture;
use futures::stream::{BoxStream, FuturesOrdered};
use futures::{FutureExt, Stream, StreamExt};
use std::future::Future;

use crate::url_tree::UrlTree;

/// A value that may be available now or later.
pub enum MaybeAsync<T> {
	/// Available immediately.
	Ready(Result<T, anyhow::Error>),
	/// Available once the future completes.
	Future(BoxFuture<'static, Result<T, anyhow::Error>>),
	/// The first item of the stream is used.
	Stream(BoxStream<'static, Result<T, anyhow::Error>>),
}

impl<T> MaybeAsync<T> {
	/// Wraps an immediate value.
	pub fn ready(value: T) -> Self {
		Self::Ready(Ok(value))
	}

	/// Wraps an immediate failure.
	pub fn error(error: anyhow::Error) -> Self {
		Self::Ready(Err(error))
	}

	/// Wraps a future.
	pub fn future<F>(future: F) -> Self
	where
		F: Future<Output = Result<T, anyhow::Error>> + Send + 'static,
	{
		Self::Future(future.boxed())
	}

	/// Wraps a stream.
	pub fn stream<S>(stream: S) -> Self
	where
		S: Stream<Item = Result<T, anyhow::Error>> + Send + 'static,
	{
		Self::Stream(stream.boxed())
	}

	/// A stream that completes without emitting.
	pub fn empty() -> Self
	where
		T: Send + 'static,
	{
		Self::Stream(futures::stream::empty().boxed())
	}
}

impl<T> From<T> for MaybeAsync<T> {
	fn from(value: T) -> Self {
		Self::ready(value)
	}
}

impl<T> std::fmt::Debug for MaybeAsync<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Ready(result) => f
				.debug_tuple("Ready")
				.field(&if result.is_ok() { "ok" } else { "error" })
				.finish(),
			Self::Future(_) => f.write_str("Future(..)"),
			Self::Stream(_) => f.write_str("Stream(..)"),
		}
	}
}

/// Waits for the first value.
///
/// Returns `Ok(None)` when a stream ends without emitting.
pub async fn first_value<T>(value: MaybeAsync<T>) -> Result<Option<T>, anyhow::Error> {
	match value {
		MaybeAsync::Ready(result) => result.map(Some),
		MaybeAsync::Future(future) => future.await.map(Some),
		MaybeAsync::Stream(mut stream) => match stream.next().await {
			Some(result) => result.map(Some),
			None => Ok(None),
		},
	}
}

/// The answer of a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardResult {
	/// Let the navigation proceed.
	Allow,
	/// Cancel the navigation.
	Deny,
	/// Cancel the navigation and navigate to this tree instead.
	Redirect(UrlTree),
}

impl GuardResult {
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}

impl From<bool> for GuardResult {
	fn from(allow: bool) -> Self {
		if allow { Self::Allow } else { Self::Deny }
	}
}

impl From<UrlTree> for GuardResult {
	fn from(tree: UrlTree) -> Self {
		Self::Redirect(tree)
	}
}

impl From<bool> for MaybeAsync<GuardResult> {
	fn from(allow: bool) -> Self {
		Self::ready(allow.into())
	}
}

impl From<UrlTree> for MaybeAsync<GuardResult> {
	fn from(tree: UrlTree) -> Self {
		Self::ready(tree.into())
	}
}

/// The answer of a resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
	/// Data stored under the resolver's key.
	Data(serde_json::Value),
	/// Cancel the navigation and navigate to this tree instead.
	Redirect(UrlTree),
}

impl From<serde_json::Value> for ResolvedValue {
	fn from(value: serde_json::Value) -> Self {
		Self::Data(value)
	}
}

impl From<serde_json::Value> for MaybeAsync<ResolvedValue> {
	fn from(value: serde_json::Value) -> Self {
		Self::ready(value.into())
	}
}

pub(crate) type PendingGuard = BoxFuture<'static, Result<Option<GuardResult>, anyhow::Error>>;

/// Starts a guard and normalises its answer.
pub(crate) fn pending(value: MaybeAsync<GuardResult>) -> PendingGuard {
	first_value(value).boxed()
}

/// Runs guards concurrently and picks the answer by declaration order.
///
/// The first guard (in order) that does not allow decides the outcome. A
/// later guard that answers early cannot pre-empt an earlier guard that is
/// still pending. Returns `Ok(None)` if the deciding guard emitted nothing.
pub(crate) async fn prioritized_guard_value(
	guards: Vec<PendingGuard>,
) -> Result<Option<GuardResult>, anyhow::Error> {
	let mut ordered: FuturesOrdered<PendingGuard> = guards.into_iter().collect();
	while let Some(result) = ordered.next().await {
		match result? {
			Some(GuardResult::Allow) => continue,
			Some(other) => return Ok(Some(other)),
			None => return Ok(None),
		}
	}
	Ok(Some(GuardResult::Allow))
}
