//! Hybrid-app URL handling.
//!
//! A [`UrlHandlingStrategy`] lets the router own only part of the URL. The
//! router navigates to `extract(url)`, ignores URLs it should not process,
//! and writes `merge(new_part, raw_url)` back to the browser.

use crate::url_tree::UrlTree;

pub trait UrlHandlingStrategy: Send + Sync {
	/// Whether the router should process `url` at all.
	fn should_process_url(&self, _url: &UrlTree) -> bool {
		true
	}

	/// The part of `url` the router navigates to.
	fn extract(&self, url: &UrlTree) -> UrlTree {
		url.clone()
	}

	/// Combines the router's part with the rest of the raw URL.
	fn merge(&self, new_url_part: &UrlTree, _raw_url: &UrlTree) -> UrlTree {
		new_url_part.clone()
	}
}

/// Processes every URL in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUrlHandlingStrategy;

impl UrlHandlingStrategy for DefaultUrlHandlingStrategy {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::url_serializer::{DefaultUrlSerializer, UrlSerializer};
	use rstest::rstest;

	#[rstest]
	fn test_default_is_identity() {
		let raw = DefaultUrlSerializer.parse("/a/b?x=1").unwrap();
		let other = DefaultUrlSerializer.parse("/c").unwrap();
		let strategy = DefaultUrlHandlingStrategy;
		assert!(strategy.should_process_url(&raw));
		assert_eq!(strategy.extract(&raw), raw);
		assert_eq!(strategy.merge(&other, &raw), other);
	}
}
