//! Outlets and their contexts.
//!
//! The router does not render anything itself. Hosts register a
//! [`RouterOutlet`] per outlet name in a [`ChildrenOutletContexts`] tree, and
//! the activation step tells each outlet what to show.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

use crate::router_state::ActivatedRoute;

/// An instantiated component as seen by the router.
pub type ComponentRef = Arc<dyn Any + Send + Sync>;

/// A placeholder that displays the component of an activated route.
pub trait RouterOutlet: Send + Sync {
	/// Whether a component is currently displayed.
	fn is_activated(&self) -> bool;

	/// The displayed component, passed to `canDeactivate` guards.
	fn component(&self) -> Option<ComponentRef>;

	/// Displays the component of `route`.
	fn activate_with(&self, route: Arc<ActivatedRoute>) -> anyhow::Result<()>;

	/// Destroys the displayed component.
	fn deactivate(&self);

	/// Removes the displayed component without destroying it.
	fn detach(&self) -> Option<ComponentRef>;

	/// Displays a previously detached component again.
	fn attach(&self, component: ComponentRef, route: Arc<ActivatedRoute>);
}

#[derive(Default)]
struct OutletContextInner {
	outlet: Option<Arc<dyn RouterOutlet>>,
	route: Option<Arc<ActivatedRoute>>,
	attach_ref: Option<ComponentRef>,
}

/// What the router knows about one outlet.
#[derive(Default)]
pub struct OutletContext {
	inner: Mutex<OutletContextInner>,
	children: ChildrenOutletContexts,
}

impl std::fmt::Debug for OutletContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.lock();
		f.debug_struct("OutletContext")
			.field("has_outlet", &inner.outlet.is_some())
			.field("route", &inner.route.as_ref().map(|r| r.id()))
			.field("children", &self.children)
			.finish()
	}
}

impl OutletContext {
	pub fn outlet(&self) -> Option<Arc<dyn RouterOutlet>> {
		self.inner.lock().outlet.clone()
	}

	pub(crate) fn set_outlet(&self, outlet: Option<Arc<dyn RouterOutlet>>) {
		self.inner.lock().outlet = outlet;
	}

	/// The route displayed by the outlet.
	pub fn route(&self) -> Option<Arc<ActivatedRoute>> {
		self.inner.lock().route.clone()
	}

	pub(crate) fn set_route(&self, route: Option<Arc<ActivatedRoute>>) {
		self.inner.lock().route = route;
	}

	pub(crate) fn attach_ref(&self) -> Option<ComponentRef> {
		self.inner.lock().attach_ref.clone()
	}

	pub(crate) fn set_attach_ref(&self, component: Option<ComponentRef>) {
		self.inner.lock().attach_ref = component;
	}

	/// Contexts of the outlets nested in this one.
	pub fn children(&self) -> &ChildrenOutletContexts {
		&self.children
	}

	/// The component displayed by the outlet, if it is activated.
	pub(crate) fn active_component(&self) -> Option<ComponentRef> {
		self.outlet()
			.filter(|outlet| outlet.is_activated())
			.and_then(|outlet| outlet.component())
	}
}

/// Outlet contexts keyed by outlet name.
#[derive(Debug, Default)]
pub struct ChildrenOutletContexts {
	contexts: Mutex<IndexMap<String, Arc<OutletContext>>>,
}

impl ChildrenOutletContexts {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers an outlet, creating its context if needed.
	///
	/// An outlet registered after its route was activated shows that route
	/// right away, re-attaching a stored component when there is one.
	pub fn on_child_outlet_created(&self, name: &str, outlet: Arc<dyn RouterOutlet>) {
		let context = self.get_or_create_context(name);
		context.set_outlet(Some(outlet.clone()));
		if outlet.is_activated() {
			return;
		}
		match (context.attach_ref(), context.route()) {
			(Some(component), Some(route)) => outlet.attach(component, route),
			(None, Some(route)) => {
				if let Err(error) = outlet.activate_with(route) {
					tracing::warn!(outlet = name, %error, "late outlet activation failed");
				}
			}
			_ => {}
		}
	}

	/// Unregisters an outlet. The context and its children survive so a
	/// re-created outlet can be activated with the same route.
	pub fn on_child_outlet_destroyed(&self, name: &str) {
		if let Some(context) = self.get_context(name) {
			context.set_outlet(None);
			context.set_attach_ref(None);
		}
	}

	/// Removes and returns every context, called when the parent deactivates.
	pub(crate) fn on_outlet_deactivated(&self) -> IndexMap<String, Arc<OutletContext>> {
		std::mem::take(&mut *self.contexts.lock())
	}

	/// Puts back contexts removed by [`Self::on_outlet_deactivated`].
	pub(crate) fn on_outlet_re_attached(&self, contexts: IndexMap<String, Arc<OutletContext>>) {
		*self.contexts.lock() = contexts;
	}

	pub fn get_or_create_context(&self, name: &str) -> Arc<OutletContext> {
		self.contexts
			.lock()
			.entry(name.to_string())
			.or_insert_with(|| Arc::new(OutletContext::default()))
			.clone()
	}

	pub fn get_context(&self, name: &str) -> Option<Arc<OutletContext>> {
		self.contexts.lock().get(name).cloned()
	}

	pub fn names(&self) -> Vec<String> {
		self.contexts.lock().keys().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::sync::atomic::{AtomicBool, Ordering};

	#[derive(Default)]
	struct Probe {
		active: AtomicBool,
	}

	impl RouterOutlet for Probe {
		fn is_activated(&self) -> bool {
			self.active.load(Ordering::SeqCst)
		}
		fn component(&self) -> Option<ComponentRef> {
			self.is_activated().then(|| Arc::new("probe") as ComponentRef)
		}
		fn activate_with(&self, _route: Arc<ActivatedRoute>) -> anyhow::Result<()> {
			self.active.store(true, Ordering::SeqCst);
			Ok(())
		}
		fn deactivate(&self) {
			self.active.store(false, Ordering::SeqCst);
		}
		fn detach(&self) -> Option<ComponentRef> {
			let component = self.component();
			self.deactivate();
			component
		}
		fn attach(&self, _component: ComponentRef, _route: Arc<ActivatedRoute>) {
			self.active.store(true, Ordering::SeqCst);
		}
	}

	#[rstest]
	fn test_outlet_registration() {
		let contexts = ChildrenOutletContexts::new();
		contexts.on_child_outlet_created("primary", Arc::new(Probe::default()));
		let context = contexts.get_context("primary").unwrap();
		assert!(context.outlet().is_some());
		assert!(context.active_component().is_none());

		contexts.on_child_outlet_destroyed("primary");
		assert!(contexts.get_context("primary").unwrap().outlet().is_none());
	}

	#[rstest]
	fn test_late_outlet_shows_active_route() {
		let contexts = ChildrenOutletContexts::new();
		let route = crate::router_state::create_empty_state(None).root().clone();
		contexts.get_or_create_context("primary").set_route(Some(route));

		let probe = Arc::new(Probe::default());
		contexts.on_child_outlet_created("primary", probe.clone());
		assert!(probe.is_activated());
	}

	#[rstest]
	fn test_deactivate_and_reattach_contexts() {
		let contexts = ChildrenOutletContexts::new();
		contexts.get_or_create_context("primary");
		contexts.get_or_create_context("aux");

		let taken = contexts.on_outlet_deactivated();
		assert_eq!(taken.len(), 2);
		assert!(contexts.names().is_empty());

		contexts.on_outlet_re_attached(taken);
		assert_eq!(contexts.names(), vec!["primary".to_string(), "aux".to_string()]);
	}
}
