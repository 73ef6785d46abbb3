//! Snapshot and live router state.
//!
//! [`RouterStateSnapshot`] is the immutable result of recognising a URL: a
//! tree of [`ActivatedRouteSnapshot`]s. [`RouterState`] is the live mirror of
//! the last committed snapshot, built from [`ActivatedRoute`]s that outlets
//! observe. Live routes point back at their owning state weakly; the router
//! is the only owner of the current state.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

use crate::config::{ComponentId, Data, Route};
use crate::options::ParamsInheritanceStrategy;
use crate::url_tree::{PRIMARY_OUTLET, Params, QueryParams, UrlSegment, UrlTree};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
	NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Values that live in a specific outlet.
pub trait OutletBound {
	fn outlet_name(&self) -> &str;
}

/// A node of a router tree.
#[derive(Debug, Clone)]
pub struct TreeNode<T> {
	pub value: T,
	pub children: Vec<TreeNode<T>>,
}

impl<T> TreeNode<T> {
	pub fn new(value: T, children: Vec<TreeNode<T>>) -> Self {
		Self { value, children }
	}

	/// Values in pre-order.
	pub fn flatten(&self) -> Vec<&T> {
		let mut out = vec![&self.value];
		for child in &self.children {
			out.extend(child.flatten());
		}
		out
	}

	/// Finds the first node (pre-order) whose value satisfies `pred`.
	pub fn find(&self, pred: &impl Fn(&T) -> bool) -> Option<&TreeNode<T>> {
		if pred(&self.value) {
			return Some(self);
		}
		self.children.iter().find_map(|child| child.find(pred))
	}

	pub fn find_mut(&mut self, pred: &impl Fn(&T) -> bool) -> Option<&mut TreeNode<T>> {
		if pred(&self.value) {
			return Some(self);
		}
		self.children.iter_mut().find_map(|child| child.find_mut(pred))
	}

	/// Values from the root down to the first node satisfying `pred`.
	pub fn path_to(&self, pred: &impl Fn(&T) -> bool) -> Option<Vec<&T>> {
		if pred(&self.value) {
			return Some(vec![&self.value]);
		}
		self.children.iter().find_map(|child| {
			child.path_to(pred).map(|mut path| {
				path.insert(0, &self.value);
				path
			})
		})
	}
}

impl<T: OutletBound> TreeNode<T> {
	/// Children keyed by outlet name.
	pub fn children_by_outlet(&self) -> IndexMap<String, &TreeNode<T>> {
		self.children
			.iter()
			.map(|child| (child.value.outlet_name().to_string(), child))
			.collect()
	}
}

/// The result of matching one route against part of a URL.
#[derive(Debug, Clone)]
pub struct ActivatedRouteSnapshot {
	pub(crate) id: u64,
	/// The URL segments matched by this route.
	pub url: Vec<UrlSegment>,
	/// Path and matrix parameters, possibly inherited.
	pub params: Params,
	pub query_params: QueryParams,
	pub fragment: Option<String>,
	/// Static and resolved data, possibly inherited.
	pub data: Data,
	pub outlet: String,
	pub component: Option<ComponentId>,
	pub(crate) route_config: Option<Arc<Route>>,
	pub(crate) resolved_data: Data,
}

impl ActivatedRouteSnapshot {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		url: Vec<UrlSegment>,
		params: Params,
		query_params: QueryParams,
		fragment: Option<String>,
		data: Data,
		outlet: impl Into<String>,
		component: Option<ComponentId>,
		route_config: Option<Arc<Route>>,
	) -> Self {
		Self {
			id: next_id(),
			url,
			params,
			query_params,
			fragment,
			data,
			outlet: outlet.into(),
			component,
			route_config,
			resolved_data: Data::new(),
		}
	}

	/// Identifier unique to this snapshot.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// The route this snapshot was matched against. `None` for the root.
	pub fn route_config(&self) -> Option<&Arc<Route>> {
		self.route_config.as_ref()
	}

	/// The configured path of the matched route, empty for the root.
	pub fn route_path(&self) -> &str {
		self.route_config.as_deref().map(Route::path_or_empty).unwrap_or_default()
	}

	/// Whether both snapshots were matched against the same route object.
	pub fn same_config(&self, other: &ActivatedRouteSnapshot) -> bool {
		match (&self.route_config, &other.route_config) {
			(Some(a), Some(b)) => Arc::ptr_eq(a, b),
			(None, None) => true,
			_ => false,
		}
	}

	pub fn param(&self, name: &str) -> Option<&str> {
		self.params.get(name).map(String::as_str)
	}

	/// Whether the matched route has a component, loaded or not.
	pub(crate) fn has_component_or_loader(&self) -> bool {
		self.component.is_some()
			|| self
				.route_config
				.as_ref()
				.is_some_and(|route| route.component_loader().is_some())
	}
}

impl OutletBound for ActivatedRouteSnapshot {
	fn outlet_name(&self) -> &str {
		&self.outlet
	}
}

/// The tree of snapshots produced for one navigation attempt.
#[derive(Debug, Clone)]
pub struct RouterStateSnapshot {
	/// The serialized URL after redirects.
	pub url: String,
	pub root: TreeNode<ActivatedRouteSnapshot>,
}

impl RouterStateSnapshot {
	pub fn new(url: impl Into<String>, root: TreeNode<ActivatedRouteSnapshot>) -> Self {
		Self {
			url: url.into(),
			root,
		}
	}

	pub fn root_route(&self) -> &ActivatedRouteSnapshot {
		&self.root.value
	}

	pub fn node(&self, id: u64) -> Option<&TreeNode<ActivatedRouteSnapshot>> {
		self.root.find(&|s: &ActivatedRouteSnapshot| s.id == id)
	}

	pub(crate) fn node_mut(&mut self, id: u64) -> Option<&mut TreeNode<ActivatedRouteSnapshot>> {
		self.root.find_mut(&|s: &ActivatedRouteSnapshot| s.id == id)
	}

	pub fn route(&self, id: u64) -> Option<&ActivatedRouteSnapshot> {
		self.node(id).map(|node| &node.value)
	}

	/// Snapshots from the root down to `id`, inclusive.
	pub fn path_from_root(&self, id: u64) -> Vec<&ActivatedRouteSnapshot> {
		self.root
			.path_to(&|s: &ActivatedRouteSnapshot| s.id == id)
			.unwrap_or_default()
	}

	pub fn parent(&self, id: u64) -> Option<&ActivatedRouteSnapshot> {
		let path = self.path_from_root(id);
		path.len().checked_sub(2).map(|idx| path[idx])
	}

	pub fn children(&self, id: u64) -> Vec<&ActivatedRouteSnapshot> {
		self.node(id)
			.map(|node| node.children.iter().map(|c| &c.value).collect())
			.unwrap_or_default()
	}

	/// The primary child of `id`, if any.
	pub fn first_child(&self, id: u64) -> Option<&ActivatedRouteSnapshot> {
		self.node(id)?
			.children
			.iter()
			.map(|c| &c.value)
			.find(|c| c.outlet == PRIMARY_OUTLET)
	}

	/// The deepest route reached by following primary children.
	pub fn leaf(&self) -> &ActivatedRouteSnapshot {
		let mut node = &self.root;
		while let Some(next) = node.children.iter().find(|c| c.value.outlet == PRIMARY_OUTLET) {
			node = next;
		}
		&node.value
	}
}

/// Params, data and resolve values visible to a route.
pub(crate) struct Inherited {
	pub params: Params,
	pub data: Data,
	pub resolve: Data,
}

pub(crate) fn get_inherited(
	route: &ActivatedRouteSnapshot,
	parent: Option<&ActivatedRouteSnapshot>,
	strategy: ParamsInheritanceStrategy,
) -> Inherited {
	let config = route.route_config.as_deref();
	let inherit = parent.filter(|parent| {
		strategy == ParamsInheritanceStrategy::Always
			|| config.is_some_and(|c| c.path() == Some(""))
			|| !parent.has_component_or_loader()
	});

	match inherit {
		Some(parent) => {
			let mut params = parent.params.clone();
			params.extend(route.params.clone());
			let mut data = parent.data.clone();
			data.extend(route.data.clone());
			let mut resolve = route.data.clone();
			resolve.extend(parent.data.clone());
			if let Some(config) = config {
				resolve.extend(config.static_data().clone());
			}
			resolve.extend(route.resolved_data.clone());
			Inherited {
				params,
				data,
				resolve,
			}
		}
		None => {
			let mut resolve = route.data.clone();
			resolve.extend(route.resolved_data.clone());
			Inherited {
				params: route.params.clone(),
				data: route.data.clone(),
				resolve,
			}
		}
	}
}

/// Applies inheritance top-down over a freshly recognised tree.
pub(crate) fn inherit_params_and_data(
	node: &mut TreeNode<ActivatedRouteSnapshot>,
	parent: Option<&ActivatedRouteSnapshot>,
	strategy: ParamsInheritanceStrategy,
) {
	let inherited = get_inherited(&node.value, parent, strategy);
	node.value.params = inherited.params;
	node.value.data = inherited.data;
	let TreeNode { value, children } = node;
	for child in children {
		inherit_params_and_data(child, Some(value), strategy);
	}
}

/// A live route that outlets observe.
///
/// Each observable value is published through a [`watch`] channel and only
/// re-published when it changes.
pub struct ActivatedRoute {
	id: u64,
	outlet: String,
	component: Option<ComponentId>,
	route_config: Option<Arc<Route>>,
	snapshot: RwLock<Option<ActivatedRouteSnapshot>>,
	future_snapshot: RwLock<ActivatedRouteSnapshot>,
	url: watch::Sender<Vec<UrlSegment>>,
	params: watch::Sender<Params>,
	query_params: watch::Sender<QueryParams>,
	fragment: watch::Sender<Option<String>>,
	data: watch::Sender<Data>,
	owner: RwLock<Weak<RouterState>>,
}

impl std::fmt::Debug for ActivatedRoute {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ActivatedRoute")
			.field("id", &self.id)
			.field("outlet", &self.outlet)
			.field("component", &self.component)
			.field("path", &self.future_snapshot.read().route_path())
			.finish()
	}
}

impl ActivatedRoute {
	/// Creates a live route whose values start at `snapshot`. The route
	/// becomes current once advanced.
	pub(crate) fn from_snapshot(snapshot: ActivatedRouteSnapshot) -> Arc<Self> {
		Arc::new(Self {
			id: next_id(),
			outlet: snapshot.outlet.clone(),
			component: snapshot.component.clone(),
			route_config: snapshot.route_config.clone(),
			url: watch::Sender::new(snapshot.url.clone()),
			params: watch::Sender::new(snapshot.params.clone()),
			query_params: watch::Sender::new(snapshot.query_params.clone()),
			fragment: watch::Sender::new(snapshot.fragment.clone()),
			data: watch::Sender::new(snapshot.data.clone()),
			snapshot: RwLock::new(None),
			future_snapshot: RwLock::new(snapshot),
			owner: RwLock::new(Weak::new()),
		})
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn outlet(&self) -> &str {
		&self.outlet
	}

	pub fn component(&self) -> Option<&ComponentId> {
		self.component.as_ref()
	}

	pub fn route_config(&self) -> Option<&Arc<Route>> {
		self.route_config.as_ref()
	}

	/// The snapshot currently displayed, or the pending one before the first
	/// activation.
	pub fn snapshot(&self) -> ActivatedRouteSnapshot {
		match self.snapshot.read().as_ref() {
			Some(snapshot) => snapshot.clone(),
			None => self.future_snapshot.read().clone(),
		}
	}

	pub fn future_snapshot(&self) -> ActivatedRouteSnapshot {
		self.future_snapshot.read().clone()
	}

	pub(crate) fn set_future_snapshot(&self, snapshot: ActivatedRouteSnapshot) {
		*self.future_snapshot.write() = snapshot;
	}

	pub fn url(&self) -> watch::Receiver<Vec<UrlSegment>> {
		self.url.subscribe()
	}

	pub fn params(&self) -> watch::Receiver<Params> {
		self.params.subscribe()
	}

	pub fn query_params(&self) -> watch::Receiver<QueryParams> {
		self.query_params.subscribe()
	}

	pub fn fragment(&self) -> watch::Receiver<Option<String>> {
		self.fragment.subscribe()
	}

	pub fn data(&self) -> watch::Receiver<Data> {
		self.data.subscribe()
	}

	/// Makes the future snapshot current and publishes what changed.
	pub(crate) fn advance(&self) {
		let next = self.future_snapshot.read().clone();
		let previous = self.snapshot.write().replace(next.clone());
		match previous {
			Some(_) => {
				publish_if_changed(&self.query_params, next.query_params);
				publish_if_changed(&self.fragment, next.fragment);
				publish_if_changed(&self.params, next.params);
				publish_if_changed(&self.url, next.url);
				publish_if_changed(&self.data, next.data);
			}
			None => {
				self.data.send_replace(next.data);
			}
		}
	}

	pub(crate) fn set_owner(&self, owner: Weak<RouterState>) {
		*self.owner.write() = owner;
	}

	/// The state this route belongs to, while it is still alive.
	pub fn router_state(&self) -> Option<Arc<RouterState>> {
		self.owner.read().upgrade()
	}

	pub fn parent(&self) -> Option<Arc<ActivatedRoute>> {
		self.router_state()?.parent(self.id)
	}

	pub fn children(&self) -> Vec<Arc<ActivatedRoute>> {
		self.router_state()
			.map(|state| state.children(self.id))
			.unwrap_or_default()
	}

	pub fn first_child(&self) -> Option<Arc<ActivatedRoute>> {
		self.children().into_iter().find(|c| c.outlet == PRIMARY_OUTLET)
	}

	/// Routes from the root down to this one.
	pub fn path_from_root(&self) -> Vec<Arc<ActivatedRoute>> {
		self.router_state()
			.map(|state| state.path_from_root(self.id))
			.unwrap_or_default()
	}
}

fn publish_if_changed<T: PartialEq>(sender: &watch::Sender<T>, value: T) {
	sender.send_if_modified(|current| {
		if *current == value {
			false
		} else {
			*current = value;
			true
		}
	});
}

impl OutletBound for Arc<ActivatedRoute> {
	fn outlet_name(&self) -> &str {
		&self.outlet
	}
}

/// The live state of the router.
#[derive(Debug)]
pub struct RouterState {
	root: TreeNode<Arc<ActivatedRoute>>,
	snapshot: Arc<RouterStateSnapshot>,
}

impl RouterState {
	/// Wraps a tree and points every route at the new state.
	pub(crate) fn new_arc(root: TreeNode<Arc<ActivatedRoute>>, snapshot: Arc<RouterStateSnapshot>) -> Arc<Self> {
		let state = Arc::new(Self { root, snapshot });
		let weak = Arc::downgrade(&state);
		for route in state.root.flatten() {
			route.set_owner(weak.clone());
		}
		state
	}

	pub fn root(&self) -> &Arc<ActivatedRoute> {
		&self.root.value
	}

	pub fn root_node(&self) -> &TreeNode<Arc<ActivatedRoute>> {
		&self.root
	}

	pub fn snapshot(&self) -> &Arc<RouterStateSnapshot> {
		&self.snapshot
	}

	pub fn route(&self, id: u64) -> Option<Arc<ActivatedRoute>> {
		self.root
			.find(&|r: &Arc<ActivatedRoute>| r.id == id)
			.map(|node| node.value.clone())
	}

	pub fn parent(&self, id: u64) -> Option<Arc<ActivatedRoute>> {
		let path = self.path_from_root(id);
		path.len().checked_sub(2).map(|idx| path[idx].clone())
	}

	pub fn children(&self, id: u64) -> Vec<Arc<ActivatedRoute>> {
		self.root
			.find(&|r: &Arc<ActivatedRoute>| r.id == id)
			.map(|node| node.children.iter().map(|c| c.value.clone()).collect())
			.unwrap_or_default()
	}

	pub fn path_from_root(&self, id: u64) -> Vec<Arc<ActivatedRoute>> {
		self.root
			.path_to(&|r: &Arc<ActivatedRoute>| r.id == id)
			.map(|path| path.into_iter().cloned().collect())
			.unwrap_or_default()
	}

	/// The live route whose current snapshot has the given snapshot id.
	pub fn route_for_snapshot(&self, snapshot_id: u64) -> Option<Arc<ActivatedRoute>> {
		self.root
			.find(&|r: &Arc<ActivatedRoute>| r.snapshot().id == snapshot_id)
			.map(|node| node.value.clone())
	}
}

/// The root snapshot of a URL, with nothing matched below it.
pub(crate) fn root_snapshot(url: &UrlTree, root_component: Option<ComponentId>) -> ActivatedRouteSnapshot {
	ActivatedRouteSnapshot::new(
		Vec::new(),
		Params::new(),
		url.query_params.clone(),
		url.fragment.clone(),
		Data::new(),
		PRIMARY_OUTLET,
		root_component,
		None,
	)
}

/// A state with only a root route, used before the first navigation.
pub(crate) fn create_empty_snapshot(url: &UrlTree, root_component: Option<ComponentId>) -> RouterStateSnapshot {
	RouterStateSnapshot::new(String::new(), TreeNode::new(root_snapshot(url, root_component), Vec::new()))
}

pub(crate) fn create_empty_state(root_component: Option<ComponentId>) -> Arc<RouterState> {
	let snapshot = Arc::new(create_empty_snapshot(&UrlTree::root_url(), root_component));
	let root = ActivatedRoute::from_snapshot(snapshot.root.value.clone());
	root.advance();
	RouterState::new_arc(TreeNode::new(root, Vec::new()), snapshot)
}
