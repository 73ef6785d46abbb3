//! Applying a committed [`RouterState`] to the registered outlets.
//!
//! Routes that are left are deactivated (or detached and stored when the
//! reuse strategy asks for it) before anything is activated. Every live
//! route of the new state is then advanced so its observers see the new
//! values, and outlets are told what to display from the root down.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::broadcast;

use crate::error::{RouterError, RouterResult};
use crate::events::Event;
use crate::outlet::ChildrenOutletContexts;
use crate::reuse_strategy::{DetachedRouteHandle, RouteReuseStrategy};
use crate::router_state::{ActivatedRoute, RouterState, TreeNode};

type LiveNode = TreeNode<Arc<ActivatedRoute>>;

pub(crate) struct ActivateRoutes<'a> {
	strategy: &'a dyn RouteReuseStrategy,
	future: &'a RouterState,
	curr: &'a RouterState,
	events: &'a broadcast::Sender<Event>,
}

impl<'a> ActivateRoutes<'a> {
	pub(crate) fn new(
		strategy: &'a dyn RouteReuseStrategy,
		future: &'a RouterState,
		curr: &'a RouterState,
		events: &'a broadcast::Sender<Event>,
	) -> Self {
		Self {
			strategy,
			future,
			curr,
			events,
		}
	}

	pub(crate) fn activate(&self, contexts: &ChildrenOutletContexts) -> RouterResult<()> {
		let future_root = self.future.root_node();
		let curr_root = self.curr.root_node();
		self.deactivate_child_routes(future_root, Some(curr_root), contexts);
		future_root.value.advance();
		self.activate_child_routes(future_root, Some(curr_root), contexts)
	}

	fn deactivate_child_routes(&self, future: &LiveNode, curr: Option<&LiveNode>, contexts: &ChildrenOutletContexts) {
		let mut previous: IndexMap<String, &LiveNode> = curr.map(TreeNode::children_by_outlet).unwrap_or_default();
		for child in &future.children {
			let outlet = child.value.outlet();
			self.deactivate_routes(child, previous.get(outlet).copied(), contexts);
			previous.shift_remove(outlet);
		}
		for node in previous.values() {
			self.deactivate_route_and_its_children(node, contexts);
		}
	}

	fn deactivate_routes(&self, future: &LiveNode, curr: Option<&LiveNode>, parent_contexts: &ChildrenOutletContexts) {
		match curr {
			Some(curr) if Arc::ptr_eq(&future.value, &curr.value) => {
				if future.value.component().is_some() {
					if let Some(context) = parent_contexts.get_context(future.value.outlet()) {
						self.deactivate_child_routes(future, Some(curr), context.children());
					}
				} else {
					self.deactivate_child_routes(future, Some(curr), parent_contexts);
				}
			}
			Some(curr) => self.deactivate_route_and_its_children(curr, parent_contexts),
			None => {}
		}
	}

	fn deactivate_route_and_its_children(&self, route: &LiveNode, parent_contexts: &ChildrenOutletContexts) {
		if route.value.component().is_some() && self.strategy.should_detach(&route.value.snapshot()) {
			self.detach_and_store_route_subtree(route, parent_contexts);
		} else {
			self.deactivate_route_and_outlet(route, parent_contexts);
		}
	}

	fn detach_and_store_route_subtree(&self, route: &LiveNode, parent_contexts: &ChildrenOutletContexts) {
		let context = parent_contexts.get_context(route.value.outlet());
		let contexts = match &context {
			Some(context) if route.value.component().is_some() => context.children(),
			_ => parent_contexts,
		};
		for child in &route.children {
			self.deactivate_route_and_its_children(child, contexts);
		}

		if let Some(context) = &context
			&& let Some(outlet) = context.outlet()
		{
			let component = outlet.detach();
			let contexts = context.children().on_outlet_deactivated();
			tracing::debug!(route = route.value.id(), "detaching route subtree");
			self.strategy.store(
				&route.value.snapshot(),
				Some(DetachedRouteHandle {
					component,
					route: route.clone(),
					contexts,
				}),
			);
		}
	}

	fn deactivate_route_and_outlet(&self, route: &LiveNode, parent_contexts: &ChildrenOutletContexts) {
		let context = parent_contexts.get_context(route.value.outlet());
		let contexts = match &context {
			Some(context) if route.value.component().is_some() => context.children(),
			_ => parent_contexts,
		};
		for child in &route.children {
			self.deactivate_route_and_its_children(child, contexts);
		}

		if let Some(context) = context {
			if let Some(outlet) = context.outlet() {
				outlet.deactivate();
				context.children().on_outlet_deactivated();
			}
			context.set_attach_ref(None);
			context.set_route(None);
		}
	}

	fn activate_child_routes(
		&self,
		future: &LiveNode,
		curr: Option<&LiveNode>,
		contexts: &ChildrenOutletContexts,
	) -> RouterResult<()> {
		let previous: IndexMap<String, &LiveNode> = curr.map(TreeNode::children_by_outlet).unwrap_or_default();
		for child in &future.children {
			self.activate_routes(child, previous.get(child.value.outlet()).copied(), contexts)?;
			let _ = self.events.send(Event::ActivationEnd {
				snapshot: child.value.snapshot(),
			});
		}
		if !future.children.is_empty() {
			let _ = self.events.send(Event::ChildActivationEnd {
				snapshot: future.value.snapshot(),
			});
		}
		Ok(())
	}

	fn activate_routes(
		&self,
		future: &LiveNode,
		curr: Option<&LiveNode>,
		parent_contexts: &ChildrenOutletContexts,
	) -> RouterResult<()> {
		let route = &future.value;
		route.advance();

		if let Some(curr) = curr.filter(|c| Arc::ptr_eq(&c.value, route)) {
			return if route.component().is_some() {
				let context = parent_contexts.get_or_create_context(route.outlet());
				self.activate_child_routes(future, Some(curr), context.children())
			} else {
				self.activate_child_routes(future, Some(curr), parent_contexts)
			};
		}

		if route.component().is_none() {
			return self.activate_child_routes(future, None, parent_contexts);
		}

		let context = parent_contexts.get_or_create_context(route.outlet());
		let snapshot = route.snapshot();
		let stored = if self.strategy.should_attach(&snapshot) {
			self.strategy.retrieve(&snapshot)
		} else {
			None
		};

		match stored {
			Some(stored) => {
				self.strategy.store(&snapshot, None);
				context.children().on_outlet_re_attached(stored.contexts);
				context.set_attach_ref(stored.component.clone());
				context.set_route(Some(stored.route.value.clone()));
				if let Some(outlet) = context.outlet() {
					match stored.component {
						Some(component) => outlet.attach(component, stored.route.value.clone()),
						None => outlet
							.activate_with(stored.route.value.clone())
							.map_err(RouterError::activation)?,
					}
				}
				stored.route.value.advance();
			}
			None => {
				context.set_attach_ref(None);
				context.set_route(Some(route.clone()));
				if let Some(outlet) = context.outlet() {
					outlet.activate_with(route.clone()).map_err(RouterError::activation)?;
				}
			}
		}
		self.activate_child_routes(future, None, context.children())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{ComponentId, Data, Route};
	use crate::create_router_state::create_router_state;
	use crate::outlet::{ComponentRef, RouterOutlet};
	use crate::reuse_strategy::DefaultRouteReuseStrategy;
	use crate::router_state::{ActivatedRouteSnapshot, RouterStateSnapshot, create_empty_state, root_snapshot};
	use crate::url_tree::{Params, QueryParams, UrlSegment, UrlTree};
	use parking_lot::Mutex;
	use rstest::{fixture, rstest};

	#[derive(Default)]
	struct Recorder {
		log: Mutex<Vec<String>>,
		active: Mutex<Option<String>>,
		fail: bool,
	}

	impl RouterOutlet for Recorder {
		fn is_activated(&self) -> bool {
			self.active.lock().is_some()
		}
		fn component(&self) -> Option<ComponentRef> {
			self.active.lock().clone().map(|c| Arc::new(c) as ComponentRef)
		}
		fn activate_with(&self, route: Arc<ActivatedRoute>) -> anyhow::Result<()> {
			if self.fail {
				anyhow::bail!("cannot render");
			}
			let name = route.component().map(|c| c.to_string()).unwrap_or_default();
			self.log.lock().push(format!("activate {name}"));
			*self.active.lock() = Some(name);
			Ok(())
		}
		fn deactivate(&self) {
			let previous = self.active.lock().take();
			self.log.lock().push(format!("deactivate {}", previous.unwrap_or_default()));
		}
		fn detach(&self) -> Option<ComponentRef> {
			let component = self.component();
			let previous = self.active.lock().take();
			self.log.lock().push(format!("detach {}", previous.unwrap_or_default()));
			component
		}
		fn attach(&self, component: ComponentRef, _route: Arc<ActivatedRoute>) {
			let name = component.downcast_ref::<String>().cloned().unwrap_or_default();
			self.log.lock().push(format!("attach {name}"));
			*self.active.lock() = Some(name);
		}
	}

	#[fixture]
	fn outlet() -> Arc<Recorder> {
		Arc::new(Recorder::default())
	}

	fn state(route: &Arc<Route>) -> Arc<RouterStateSnapshot> {
		let snapshot = ActivatedRouteSnapshot::new(
			vec![UrlSegment::path(route.path_or_empty())],
			Params::new(),
			QueryParams::new(),
			None,
			Data::new(),
			"primary",
			route.component_id(),
			Some(route.clone()),
		);
		let root = root_snapshot(&UrlTree::root_url(), Some(ComponentId::from("App")));
		Arc::new(RouterStateSnapshot::new("", TreeNode::new(root, vec![TreeNode::new(snapshot, Vec::new())])))
	}

	fn navigate(
		strategy: &dyn RouteReuseStrategy,
		curr: &Arc<RouterState>,
		route: &Arc<Route>,
		contexts: &ChildrenOutletContexts,
	) -> (RouterResult<Arc<RouterState>>, Vec<Event>) {
		let (tx, mut rx) = broadcast::channel(16);
		let future = create_router_state(strategy, state(route), curr);
		let result = ActivateRoutes::new(strategy, &future, curr, &tx).activate(contexts).map(|_| future);
		let mut events = Vec::new();
		while let Ok(event) = rx.try_recv() {
			events.push(event);
		}
		(result, events)
	}

	#[rstest]
	fn test_switching_routes_deactivates_then_activates(outlet: Arc<Recorder>) {
		let contexts = ChildrenOutletContexts::new();
		contexts.on_child_outlet_created("primary", outlet.clone());
		let strategy = DefaultRouteReuseStrategy;
		let a = Arc::new(Route::new("a").component("A"));
		let b = Arc::new(Route::new("b").component("B"));

		let (first, events) = navigate(&strategy, &create_empty_state(None), &a, &contexts);
		let first = first.unwrap();
		let kinds: Vec<&str> = events.iter().map(Event::kind).collect();
		assert_eq!(kinds, vec!["ActivationEnd", "ChildActivationEnd"]);

		navigate(&strategy, &first, &b, &contexts).0.unwrap();
		assert_eq!(*outlet.log.lock(), vec!["activate A", "deactivate A", "activate B"]);
		let context = contexts.get_context("primary").unwrap();
		assert_eq!(context.route().and_then(|r| r.component().cloned()), Some(ComponentId::from("B")));
	}

	#[rstest]
	fn test_reused_route_is_not_reactivated(outlet: Arc<Recorder>) {
		let contexts = ChildrenOutletContexts::new();
		contexts.on_child_outlet_created("primary", outlet.clone());
		let strategy = DefaultRouteReuseStrategy;
		let a = Arc::new(Route::new("a").component("A"));

		let first = navigate(&strategy, &create_empty_state(None), &a, &contexts).0.unwrap();
		navigate(&strategy, &first, &a, &contexts).0.unwrap();
		assert_eq!(*outlet.log.lock(), vec!["activate A"]);
	}

	#[rstest]
	fn test_outlet_failure_is_an_activation_error() {
		let contexts = ChildrenOutletContexts::new();
		contexts.on_child_outlet_created(
			"primary",
			Arc::new(Recorder {
				fail: true,
				..Default::default()
			}),
		);
		let a = Arc::new(Route::new("a").component("A"));
		let (result, _) = navigate(&DefaultRouteReuseStrategy, &create_empty_state(None), &a, &contexts);
		assert_eq!(result.unwrap_err().to_string(), "Activation failed: cannot render");
	}

	#[derive(Default)]
	struct KeepEverything {
		stored: Mutex<IndexMap<String, DetachedRouteHandle>>,
	}

	impl RouteReuseStrategy for KeepEverything {
		fn should_detach(&self, _route: &ActivatedRouteSnapshot) -> bool {
			true
		}
		fn store(&self, route: &ActivatedRouteSnapshot, handle: Option<DetachedRouteHandle>) {
			match handle {
				Some(handle) => self.stored.lock().insert(route.route_path().to_string(), handle),
				None => self.stored.lock().shift_remove(route.route_path()),
			};
		}
		fn should_attach(&self, route: &ActivatedRouteSnapshot) -> bool {
			self.stored.lock().contains_key(route.route_path())
		}
		fn retrieve(&self, route: &ActivatedRouteSnapshot) -> Option<DetachedRouteHandle> {
			self.stored.lock().get(route.route_path()).cloned()
		}
	}

	#[rstest]
	fn test_detached_component_is_reattached(outlet: Arc<Recorder>) {
		let contexts = ChildrenOutletContexts::new();
		contexts.on_child_outlet_created("primary", outlet.clone());
		let strategy = KeepEverything::default();
		let a = Arc::new(Route::new("a").component("A"));
		let b = Arc::new(Route::new("b").component("B"));

		let s1 = navigate(&strategy, &create_empty_state(None), &a, &contexts).0.unwrap();
		let s2 = navigate(&strategy, &s1, &b, &contexts).0.unwrap();
		assert!(strategy.stored.lock().contains_key("a"));
		navigate(&strategy, &s2, &a, &contexts).0.unwrap();

		assert_eq!(
			*outlet.log.lock(),
			vec!["activate A", "detach A", "activate B", "detach B", "attach A"]
		);
		assert!(!strategy.stored.lock().contains_key("a"));
		assert!(strategy.stored.lock().contains_key("b"));
	}
}
