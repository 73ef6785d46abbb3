//! Error types for navigation.

use std::sync::Arc;

use crate::events::NavigationCancellationCode;
use crate::url_tree::UrlTree;

/// A URL string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed URI '{url}': {message}")]
pub struct MalformedUriError {
	/// The offending input.
	pub url: String,
	/// What went wrong.
	pub message: String,
}

impl MalformedUriError {
	/// Creates a new error.
	pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			message: message.into(),
		}
	}
}

/// Errors surfaced by the router.
///
/// The error is cheap to clone so it can travel inside
/// [`Event::NavigationError`](crate::events::Event::NavigationError).
/// Failures raised by user callbacks are kept as [`anyhow::Error`].
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
	#[error("Cannot match any routes. URL Segment: '{0}'")]
	NoMatch(String),

	#[error("Detected a redirect loop while navigating to '{0}'")]
	CyclicRedirect(String),

	#[error("Cannot redirect to '{redirect_to}'. Cannot find '{param}'.")]
	MissingRedirectParam {
		/// The redirect target as configured.
		redirect_to: String,
		/// The positional parameter that could not be found.
		param: String,
	},

	#[error("Only absolute redirects can have named outlets. redirectTo: '{0}'")]
	NamedOutletsRedirect(String),

	#[error("Two segments cannot have the same outlet name: '{0}'")]
	DuplicateOutlet(String),

	#[error(transparent)]
	MalformedUri(#[from] MalformedUriError),

	#[error("Invalid configuration of route '{path}': {reason}")]
	InvalidConfig {
		/// Full path of the offending route.
		path: String,
		/// What is wrong with it.
		reason: String,
	},

	#[error("Invalid navigation commands: {0}")]
	InvalidCommands(String),

	#[error("Guard failed: {0}")]
	Guard(Arc<anyhow::Error>),

	#[error("Resolver for '{key}' failed: {error}")]
	Resolver {
		/// Key of the resolver in the route's `resolve` map.
		key: String,
		/// The failure.
		error: Arc<anyhow::Error>,
	},

	#[error("Failed to load route: {0}")]
	Load(Arc<anyhow::Error>),

	#[error("Activation failed: {0}")]
	Activation(Arc<anyhow::Error>),

	#[error("{0}")]
	Other(Arc<anyhow::Error>),

	#[error("The router has been disposed")]
	Disposed,
}

impl RouterError {
	/// Wraps a guard failure.
	pub fn guard(error: anyhow::Error) -> Self {
		Self::Guard(Arc::new(error))
	}

	/// Wraps a resolver failure.
	pub fn resolver(key: impl Into<String>, error: anyhow::Error) -> Self {
		Self::Resolver {
			key: key.into(),
			error: Arc::new(error),
		}
	}

	/// Wraps a loader failure.
	pub fn load(error: anyhow::Error) -> Self {
		Self::Load(Arc::new(error))
	}

	/// Wraps an activation failure.
	pub fn activation(error: anyhow::Error) -> Self {
		Self::Activation(Arc::new(error))
	}

	/// Wraps an arbitrary failure, typically one produced by a custom error handler.
	pub fn other(error: anyhow::Error) -> Self {
		Self::Other(Arc::new(error))
	}
}

/// Result type used throughout the crate.
pub type RouterResult<T> = Result<T, RouterError>;

/// Why a navigation stopped before completing.
#[derive(Debug, Clone)]
pub(crate) enum Interruption {
	/// Stopped without an error, optionally redirecting elsewhere.
	Canceling {
		code: NavigationCancellationCode,
		reason: String,
		redirect: Option<UrlTree>,
	},
	/// Failed.
	Error(RouterError),
}

impl Interruption {
	pub(crate) fn cancel(code: NavigationCancellationCode, reason: impl Into<String>) -> Self {
		Self::Canceling {
			code,
			reason: reason.into(),
			redirect: None,
		}
	}

	/// A cancellation that schedules a navigation to `tree`.
	pub(crate) fn redirect(tree: UrlTree) -> Self {
		let reason = format!("Redirecting to \"{tree}\"");
		Self::Canceling {
			code: NavigationCancellationCode::Redirect,
			reason,
			redirect: Some(tree),
		}
	}
}

impl From<RouterError> for Interruption {
	fn from(error: RouterError) -> Self {
		Self::Error(error)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_malformed_uri_is_transparent() {
		let err: RouterError = MalformedUriError::new("/%", "invalid percent-encoding").into();
		assert_eq!(err.to_string(), "Malformed URI '/%': invalid percent-encoding");
	}

	#[rstest]
	fn test_callback_errors_keep_their_message() {
		let err = RouterError::resolver("user", anyhow::anyhow!("backend down"));
		assert_eq!(err.to_string(), "Resolver for 'user' failed: backend down");
		let cloned = err.clone();
		assert!(matches!(cloned, RouterError::Resolver { ref key, .. } if key == "user"));
	}
}
