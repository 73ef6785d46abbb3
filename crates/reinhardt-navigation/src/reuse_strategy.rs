//! Route reuse policy.
//!
//! A [`RouteReuseStrategy`] decides, per node, whether a live route survives
//! a navigation, and whether a subtree that is left gets cached (detached)
//! instead of destroyed so it can be re-attached later.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::outlet::{ComponentRef, OutletContext};
use crate::router_state::{ActivatedRoute, ActivatedRouteSnapshot, TreeNode};

/// A detached subtree: its component, its live routes and the outlet
/// contexts that were nested in it.
#[derive(Clone)]
pub struct DetachedRouteHandle {
	pub(crate) component: Option<ComponentRef>,
	pub(crate) route: TreeNode<Arc<ActivatedRoute>>,
	pub(crate) contexts: IndexMap<String, Arc<OutletContext>>,
}

impl DetachedRouteHandle {
	/// The live route at the top of the detached subtree.
	pub fn route(&self) -> &Arc<ActivatedRoute> {
		&self.route.value
	}

	pub fn component(&self) -> Option<&ComponentRef> {
		self.component.as_ref()
	}
}

impl std::fmt::Debug for DetachedRouteHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DetachedRouteHandle")
			.field("route", &self.route.value)
			.field("has_component", &self.component.is_some())
			.field("contexts", &self.contexts.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Policy for reusing, detaching and re-attaching routes.
///
/// Every method has a default that matches [`DefaultRouteReuseStrategy`].
pub trait RouteReuseStrategy: Send + Sync {
	/// Whether the subtree of `route` should be stored when it is left.
	fn should_detach(&self, _route: &ActivatedRouteSnapshot) -> bool {
		false
	}

	/// Stores a detached subtree. `None` clears the stored entry.
	fn store(&self, _route: &ActivatedRouteSnapshot, _handle: Option<DetachedRouteHandle>) {}

	/// Whether a stored subtree should be re-attached for `route`.
	fn should_attach(&self, _route: &ActivatedRouteSnapshot) -> bool {
		false
	}

	/// The stored subtree for `route`.
	fn retrieve(&self, _route: &ActivatedRouteSnapshot) -> Option<DetachedRouteHandle> {
		None
	}

	/// Whether the live route for `curr` can keep serving `future`.
	fn should_reuse_route(&self, future: &ActivatedRouteSnapshot, curr: &ActivatedRouteSnapshot) -> bool {
		future.same_config(curr)
	}
}

/// Reuses a route only when it was matched by the same config, and never
/// detaches.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRouteReuseStrategy;

impl RouteReuseStrategy for DefaultRouteReuseStrategy {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{Data, Route};
	use crate::url_tree::{Params, QueryParams};
	use rstest::rstest;

	fn snapshot(route: &Arc<Route>) -> ActivatedRouteSnapshot {
		ActivatedRouteSnapshot::new(
			Vec::new(),
			Params::new(),
			QueryParams::new(),
			None,
			Data::new(),
			"primary",
			None,
			Some(route.clone()),
		)
	}

	#[rstest]
	fn test_default_reuses_same_config_only() {
		let a = Arc::new(Route::new("a").component("A"));
		let b = Arc::new(Route::new("a").component("A"));
		let strategy = DefaultRouteReuseStrategy;
		assert!(strategy.should_reuse_route(&snapshot(&a), &snapshot(&a)));
		assert!(!strategy.should_reuse_route(&snapshot(&a), &snapshot(&b)));
		assert!(!strategy.should_detach(&snapshot(&a)));
		assert!(strategy.retrieve(&snapshot(&a)).is_none());
	}
}
