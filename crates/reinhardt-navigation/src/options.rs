//! Router configuration.
//!
//! [`RouterOptions`] carries the plain, serialisable settings. Function-valued
//! settings and collaborators are supplied through
//! [`RouterBuilder`](crate::router::RouterBuilder).

use serde::{Deserialize, Serialize};

/// What to do when navigating to the URL that is already displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnSameUrlNavigation {
	/// Emit start and end events but skip recognition, guards and resolvers.
	#[default]
	Ignore,
	/// Run the whole pipeline again.
	Reload,
}

/// How params, data and resolved data flow from parent to child routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamsInheritanceStrategy {
	/// Only path-less and component-less parents pass their values down.
	#[default]
	EmptyOnly,
	/// Every child inherits from its parent.
	Always,
}

/// When the browser URL is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UrlUpdateStrategy {
	/// After guards and resolvers succeed, right before activation.
	#[default]
	Deferred,
	/// As soon as the target URL has been recognized.
	Eager,
}

/// How browser history is restored when a navigation is cancelled or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanceledNavigationResolution {
	/// Replace the current history entry with the last committed URL.
	#[default]
	Replace,
	/// Track page ids in history state and move back by the exact delta.
	Computed,
}

/// Serialisable router settings.
///
/// ```
/// use reinhardt_navigation::options::{RouterOptions, UrlUpdateStrategy};
///
/// let options: RouterOptions = serde_json::from_str(r#"{"urlUpdateStrategy": "eager"}"#).unwrap();
/// assert_eq!(options.url_update_strategy, UrlUpdateStrategy::Eager);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouterOptions {
	pub on_same_url_navigation: OnSameUrlNavigation,
	pub params_inheritance_strategy: ParamsInheritanceStrategy,
	pub url_update_strategy: UrlUpdateStrategy,
	pub canceled_navigation_resolution: CanceledNavigationResolution,
	/// Capacity of the event broadcast channel.
	pub events_capacity: usize,
}

impl Default for RouterOptions {
	fn default() -> Self {
		Self {
			on_same_url_navigation: OnSameUrlNavigation::default(),
			params_inheritance_strategy: ParamsInheritanceStrategy::default(),
			url_update_strategy: UrlUpdateStrategy::default(),
			canceled_navigation_resolution: CanceledNavigationResolution::default(),
			events_capacity: 256,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_defaults_from_empty_object() {
		let options: RouterOptions = serde_json::from_str("{}").unwrap();
		assert_eq!(options, RouterOptions::default());
		assert_eq!(options.events_capacity, 256);
	}

	#[rstest]
	fn test_camel_case_keys() {
		let options: RouterOptions = serde_json::from_str(
			r#"{
				"onSameUrlNavigation": "reload",
				"paramsInheritanceStrategy": "always",
				"canceledNavigationResolution": "computed",
				"eventsCapacity": 8
			}"#,
		)
		.unwrap();
		assert_eq!(options.on_same_url_navigation, OnSameUrlNavigation::Reload);
		assert_eq!(options.params_inheritance_strategy, ParamsInheritanceStrategy::Always);
		assert_eq!(options.canceled_navigation_resolution, CanceledNavigationResolution::Computed);
		assert_eq!(options.url_update_strategy, UrlUpdateStrategy::Deferred);
		assert_eq!(options.events_capacity, 8);
	}

	#[rstest]
	fn test_unknown_variant_is_rejected() {
		let result = serde_json::from_str::<RouterOptions>(r#"{"urlUpdateStrategy": "lazy"}"#);
		assert!(result.is_err());
	}
}
