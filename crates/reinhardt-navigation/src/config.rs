//! Route configuration.
//!
//! A configuration is a tree of [`Route`]s built with a fluent API:
//!
//! ```
//! use reinhardt_navigation::config::{PathMatch, Route};
//!
//! let routes = vec![
//! 	Route::new("").redirect_to("home").path_match(PathMatch::Full),
//! 	Route::new("home").component("HomePage"),
//! 	Route::new("team/:id")
//! 		.component("TeamPage")
//! 		.children(vec![Route::new("user/:name").component("UserPage")]),
//! 	Route::new("**").component("NotFound"),
//! ];
//! assert!(reinhardt_navigation::config::validate_config(&routes, "").is_ok());
//! ```
//!
//! Routes are shared as `Arc<Route>` once handed to the router; identity
//! (`Arc::ptr_eq`) is what the reuse strategy and the guard engine compare.

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::error::{RouterError, RouterResult};
use crate::guards::{GuardResult, MaybeAsync, ResolvedValue};
use crate::outlet::ComponentRef;
use crate::router_state::{ActivatedRouteSnapshot, RouterStateSnapshot};
use crate::url_tree::{PRIMARY_OUTLET, UrlSegment, UrlSegmentGroup};

/// Static or resolved data attached to a route.
pub type Data = IndexMap<String, serde_json::Value>;

/// A list of shared routes.
pub type Routes = Vec<Arc<Route>>;

/// Opaque identifier of the component a route renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentId(Arc<str>);

impl ComponentId {
	/// Creates an identifier.
	pub fn new(name: impl AsRef<str>) -> Self {
		Self(Arc::from(name.as_ref()))
	}

	/// The placeholder rendered by component-less routes on named outlets so
	/// that their children have an outlet to render into.
	pub fn empty_outlet() -> Self {
		Self::new("__empty_outlet__")
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for ComponentId {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

impl From<String> for ComponentId {
	fn from(name: String) -> Self {
		Self::new(name)
	}
}

impl fmt::Display for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// How a route's path is matched against the remaining URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMatch {
	/// The path must be a prefix of the remaining URL.
	#[default]
	Prefix,
	/// The path must consume the whole remaining URL.
	Full,
}

/// Result of a custom [`UrlMatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlMatchResult {
	/// Segments consumed by the route.
	pub consumed: Vec<UrlSegment>,
	/// Named positional parameters.
	pub pos_params: IndexMap<String, UrlSegment>,
}

/// Custom matcher replacing the path syntax.
pub type UrlMatcher =
	Arc<dyn Fn(&[UrlSegment], &UrlSegmentGroup, &Route) -> Option<UrlMatchResult> + Send + Sync>;

/// Guard run before a route is activated.
pub type CanActivateFn =
	Arc<dyn Fn(&ActivatedRouteSnapshot, &RouterStateSnapshot) -> MaybeAsync<GuardResult> + Send + Sync>;

/// Guard run before any child of a route is activated. Receives the child.
pub type CanActivateChildFn = CanActivateFn;

/// Guard run before a route is left.
///
/// Receives the component rendered by the route (if the outlet exposes
/// one), the route, the current state and the target state.
pub type CanDeactivateFn = Arc<
	dyn Fn(
			Option<&ComponentRef>,
			&ActivatedRouteSnapshot,
			&RouterStateSnapshot,
			&RouterStateSnapshot,
		) -> MaybeAsync<GuardResult>
		+ Send
		+ Sync,
>;

/// Guard run during recognition. A rejection skips to the next route.
pub type CanMatchFn = Arc<dyn Fn(&Route, &[UrlSegment]) -> MaybeAsync<GuardResult> + Send + Sync>;

/// Guard run before lazy children are fetched.
pub type CanLoadFn = CanMatchFn;

/// Data resolver.
pub type ResolveFn =
	Arc<dyn Fn(&ActivatedRouteSnapshot, &RouterStateSnapshot) -> MaybeAsync<ResolvedValue> + Send + Sync>;

/// Something that exposes further routes once loaded.
pub trait RouteModule: Send + Sync {
	/// The routes of the module.
	fn routes(&self) -> Vec<Route>;
}

/// What a lazy children loader produces.
pub enum LoadedChildren {
	Routes(Vec<Route>),
	Module(Arc<dyn RouteModule>),
}

impl From<Vec<Route>> for LoadedChildren {
	fn from(routes: Vec<Route>) -> Self {
		Self::Routes(routes)
	}
}

impl LoadedChildren {
	pub(crate) fn into_routes(self) -> Vec<Route> {
		match self {
			Self::Routes(routes) => routes,
			Self::Module(module) => module.routes(),
		}
	}
}

/// Lazy children loader.
pub type LoadChildrenFn =
	Arc<dyn Fn() -> BoxFuture<'static, Result<LoadedChildren, anyhow::Error>> + Send + Sync>;

/// Lazy component loader.
pub type LoadComponentFn =
	Arc<dyn Fn() -> BoxFuture<'static, Result<ComponentId, anyhow::Error>> + Send + Sync>;

/// When guards and resolvers run again for a route that stays active.
#[derive(Clone, Default)]
pub enum RunGuardsAndResolvers {
	/// When path or matrix params of the route or its ancestors change.
	#[default]
	ParamsChange,
	/// When the path segments change.
	PathParamsChange,
	/// When the path segments or the query params change.
	PathParamsOrQueryParamsChange,
	/// When params or query params change.
	ParamsOrQueryParamsChange,
	/// On every navigation.
	Always,
	/// Custom predicate receiving the current and the future snapshot.
	Custom(Arc<dyn Fn(&ActivatedRouteSnapshot, &ActivatedRouteSnapshot) -> bool + Send + Sync>),
}

impl fmt::Debug for RunGuardsAndResolvers {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ParamsChange => f.write_str("ParamsChange"),
			Self::PathParamsChange => f.write_str("PathParamsChange"),
			Self::PathParamsOrQueryParamsChange => f.write_str("PathParamsOrQueryParamsChange"),
			Self::ParamsOrQueryParamsChange => f.write_str("ParamsOrQueryParamsChange"),
			Self::Always => f.write_str("Always"),
			Self::Custom(_) => f.write_str("Custom(..)"),
		}
	}
}

/// A single route definition.
pub struct Route {
	path: Option<String>,
	path_match: Option<PathMatch>,
	matcher: Option<UrlMatcher>,
	component: Option<ComponentId>,
	load_component: Option<LoadComponentFn>,
	redirect_to: Option<String>,
	outlet: Option<String>,
	can_activate: Vec<CanActivateFn>,
	can_activate_child: Vec<CanActivateChildFn>,
	can_deactivate: Vec<CanDeactivateFn>,
	can_load: Vec<CanLoadFn>,
	can_match: Vec<CanMatchFn>,
	data: Data,
	resolve: IndexMap<String, ResolveFn>,
	children: Option<Routes>,
	load_children: Option<LoadChildrenFn>,
	run_guards_and_resolvers: RunGuardsAndResolvers,
	loaded_routes: RwLock<Option<Arc<Routes>>>,
	loaded_component: RwLock<Option<ComponentId>>,
}

impl fmt::Debug for Route {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Route")
			.field("path", &self.path)
			.field("path_match", &self.path_match)
			.field("has_matcher", &self.matcher.is_some())
			.field("component", &self.component)
			.field("redirect_to", &self.redirect_to)
			.field("outlet", &self.outlet)
			.field("data", &self.data)
			.field("resolve", &self.resolve.keys().collect::<Vec<_>>())
			.field("children", &self.children)
			.field("lazy", &self.load_children.is_some())
			.field("guards", &self.guard_count())
			.finish()
	}
}

impl Route {
	/// Creates a route matching `path`.
	///
	/// Paths are `/`-separated. A part starting with `:` captures a
	/// positional parameter, `**` matches everything, and `""` matches
	/// without consuming anything.
	pub fn new(path: impl Into<String>) -> Self {
		let mut route = Self::empty();
		route.path = Some(path.into());
		route
	}

	/// Creates a route matched by a custom matcher instead of a path.
	pub fn with_matcher<M>(matcher: M) -> Self
	where
		M: Fn(&[UrlSegment], &UrlSegmentGroup, &Route) -> Option<UrlMatchResult> + Send + Sync + 'static,
	{
		let mut route = Self::empty();
		route.matcher = Some(Arc::new(matcher));
		route
	}

	fn empty() -> Self {
		Self {
			path: None,
			path_match: None,
			matcher: None,
			component: None,
			load_component: None,
			redirect_to: None,
			outlet: None,
			can_activate: Vec::new(),
			can_activate_child: Vec::new(),
			can_deactivate: Vec::new(),
			can_load: Vec::new(),
			can_match: Vec::new(),
			data: Data::new(),
			resolve: IndexMap::new(),
			children: None,
			load_children: None,
			run_guards_and_resolvers: RunGuardsAndResolvers::default(),
			loaded_routes: RwLock::new(None),
			loaded_component: RwLock::new(None),
		}
	}

	/// Sets the path matching strategy.
	pub fn path_match(mut self, path_match: PathMatch) -> Self {
		self.path_match = Some(path_match);
		self
	}

	/// Sets the component rendered by this route.
	pub fn component(mut self, component: impl Into<ComponentId>) -> Self {
		self.component = Some(component.into());
		self
	}

	/// Sets a lazy component loader.
	pub fn load_component<F, Fut>(mut self, loader: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = Result<ComponentId, anyhow::Error>> + Send + 'static,
	{
		self.load_component = Some(Arc::new(move || loader().boxed()));
		self
	}

	/// Redirects to another URL. Targets starting with `/` are absolute.
	pub fn redirect_to(mut self, target: impl Into<String>) -> Self {
		self.redirect_to = Some(target.into());
		self
	}

	/// Renders into a named outlet.
	pub fn outlet(mut self, outlet: impl Into<String>) -> Self {
		self.outlet = Some(outlet.into());
		self
	}

	/// Sets the child routes.
	pub fn children(mut self, children: Vec<Route>) -> Self {
		self.children = Some(children.into_iter().map(Arc::new).collect());
		self
	}

	/// Sets a lazy children loader.
	pub fn load_children<F, Fut, R>(mut self, loader: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = Result<R, anyhow::Error>> + Send + 'static,
		R: Into<LoadedChildren>,
	{
		self.load_children = Some(Arc::new(move || {
			let fut = loader();
			async move { fut.await.map(Into::into) }.boxed()
		}));
		self
	}

	/// Adds a `canActivate` guard.
	pub fn can_activate<G>(mut self, guard: G) -> Self
	where
		G: Fn(&ActivatedRouteSnapshot, &RouterStateSnapshot) -> MaybeAsync<GuardResult> + Send + Sync + 'static,
	{
		self.can_activate.push(Arc::new(guard));
		self
	}

	/// Adds a `canActivateChild` guard.
	pub fn can_activate_child<G>(mut self, guard: G) -> Self
	where
		G: Fn(&ActivatedRouteSnapshot, &RouterStateSnapshot) -> MaybeAsync<GuardResult> + Send + Sync + 'static,
	{
		self.can_activate_child.push(Arc::new(guard));
		self
	}

	/// Adds a `canDeactivate` guard.
	pub fn can_deactivate<G>(mut self, guard: G) -> Self
	where
		G: Fn(
				Option<&ComponentRef>,
				&ActivatedRouteSnapshot,
				&RouterStateSnapshot,
				&RouterStateSnapshot,
			) -> MaybeAsync<GuardResult>
			+ Send
			+ Sync
			+ 'static,
	{
		self.can_deactivate.push(Arc::new(guard));
		self
	}

	/// Adds a `canLoad` guard.
	pub fn can_load<G>(mut self, guard: G) -> Self
	where
		G: Fn(&Route, &[UrlSegment]) -> MaybeAsync<GuardResult> + Send + Sync + 'static,
	{
		self.can_load.push(Arc::new(guard));
		self
	}

	/// Adds a `canMatch` guard.
	pub fn can_match<G>(mut self, guard: G) -> Self
	where
		G: Fn(&Route, &[UrlSegment]) -> MaybeAsync<GuardResult> + Send + Sync + 'static,
	{
		self.can_match.push(Arc::new(guard));
		self
	}

	/// Adds a static data entry.
	pub fn data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.data.insert(key.into(), value);
		self
	}

	/// Adds a resolver whose output is stored in the route data under `key`.
	pub fn resolve<R>(mut self, key: impl Into<String>, resolver: R) -> Self
	where
		R: Fn(&ActivatedRouteSnapshot, &RouterStateSnapshot) -> MaybeAsync<ResolvedValue> + Send + Sync + 'static,
	{
		self.resolve.insert(key.into(), Arc::new(resolver));
		self
	}

	/// Controls when guards and resolvers run again while the route stays active.
	pub fn run_guards_and_resolvers(mut self, mode: RunGuardsAndResolvers) -> Self {
		self.run_guards_and_resolvers = mode;
		self
	}

	/// The configured path, `None` for matcher routes.
	pub fn path(&self) -> Option<&str> {
		self.path.as_deref()
	}

	pub(crate) fn path_or_empty(&self) -> &str {
		self.path.as_deref().unwrap_or_default()
	}

	pub fn path_match_strategy(&self) -> PathMatch {
		self.path_match.unwrap_or_default()
	}

	pub(crate) fn matcher_fn(&self) -> Option<&UrlMatcher> {
		self.matcher.as_ref()
	}

	/// The outlet this route renders into.
	pub fn outlet_name(&self) -> &str {
		self.outlet.as_deref().unwrap_or(PRIMARY_OUTLET)
	}

	pub fn redirect_target(&self) -> Option<&str> {
		self.redirect_to.as_deref()
	}

	/// The component to render: the configured one, the lazily loaded one,
	/// or the empty-outlet placeholder for component-less named outlet routes.
	pub fn component_id(&self) -> Option<ComponentId> {
		if let Some(component) = &self.component {
			return Some(component.clone());
		}
		if let Some(loaded) = self.loaded_component.read().as_ref() {
			return Some(loaded.clone());
		}
		let has_children = self.children.is_some() || self.load_children.is_some();
		if self.load_component.is_none() && has_children && self.outlet_name() != PRIMARY_OUTLET {
			return Some(ComponentId::empty_outlet());
		}
		None
	}

	pub fn static_data(&self) -> &Data {
		&self.data
	}

	pub(crate) fn resolvers(&self) -> &IndexMap<String, ResolveFn> {
		&self.resolve
	}

	/// Eagerly declared children.
	pub fn child_routes(&self) -> Option<&Routes> {
		self.children.as_ref()
	}

	pub(crate) fn children_loader(&self) -> Option<&LoadChildrenFn> {
		self.load_children.as_ref()
	}

	pub(crate) fn component_loader(&self) -> Option<&LoadComponentFn> {
		self.load_component.as_ref()
	}

	/// Lazily loaded children, once fetched.
	pub fn loaded_routes(&self) -> Option<Arc<Routes>> {
		self.loaded_routes.read().clone()
	}

	pub(crate) fn set_loaded_routes(&self, routes: Arc<Routes>) {
		*self.loaded_routes.write() = Some(routes);
	}

	pub fn loaded_component(&self) -> Option<ComponentId> {
		self.loaded_component.read().clone()
	}

	pub(crate) fn set_loaded_component(&self, component: ComponentId) {
		*self.loaded_component.write() = Some(component);
	}

	pub(crate) fn can_activate_guards(&self) -> &[CanActivateFn] {
		&self.can_activate
	}

	pub(crate) fn can_activate_child_guards(&self) -> &[CanActivateChildFn] {
		&self.can_activate_child
	}

	pub(crate) fn can_deactivate_guards(&self) -> &[CanDeactivateFn] {
		&self.can_deactivate
	}

	pub(crate) fn can_load_guards(&self) -> &[CanLoadFn] {
		&self.can_load
	}

	pub(crate) fn can_match_guards(&self) -> &[CanMatchFn] {
		&self.can_match
	}

	pub(crate) fn run_guards_and_resolvers_mode(&self) -> &RunGuardsAndResolvers {
		&self.run_guards_and_resolvers
	}

	fn guard_count(&self) -> usize {
		self.can_activate.len()
			+ self.can_activate_child.len()
			+ self.can_deactivate.len()
			+ self.can_load.len()
			+ self.can_match.len()
	}
}

/// Joins a parent path and a route path for error messages.
pub(crate) fn full_path(parent_path: &str, route: &Route) -> String {
	let path = route.path_or_empty();
	match (parent_path.is_empty(), path.is_empty()) {
		(true, true) => String::new(),
		(false, true) => format!("{parent_path}/"),
		(true, false) => path.to_string(),
		(false, false) => format!("{parent_path}/{path}"),
	}
}

/// Validates a configuration, recursing into eager children.
///
/// # Errors
///
/// Returns [`RouterError::InvalidConfig`] for the first invalid route.
pub fn validate_config<R: AsRef<Route>>(routes: &[R], parent_path: &str) -> RouterResult<()> {
	for route in routes {
		validate_node(route.as_ref(), parent_path)?;
	}
	Ok(())
}

impl AsRef<Route> for Route {
	fn as_ref(&self) -> &Route {
		self
	}
}

fn validate_node(route: &Route, parent_path: &str) -> RouterResult<()> {
	let path = full_path(parent_path, route);
	let invalid = |reason: &str| {
		Err(RouterError::InvalidConfig {
			path: path.clone(),
			reason: reason.to_string(),
		})
	};

	let has_component = route.component.is_some() || route.load_component.is_some();
	let has_children = route.children.is_some() || route.load_children.is_some();

	if !has_component && !has_children && route.outlet_name() != PRIMARY_OUTLET {
		return invalid("a componentless route without children or loadChildren cannot have a named outlet set");
	}
	if route.redirect_to.is_some() && route.children.is_some() {
		return invalid("redirectTo and children cannot be used together");
	}
	if route.redirect_to.is_some() && route.load_children.is_some() {
		return invalid("redirectTo and loadChildren cannot be used together");
	}
	if route.children.is_some() && route.load_children.is_some() {
		return invalid("children and loadChildren cannot be used together");
	}
	if route.redirect_to.is_some() && has_component {
		return invalid("redirectTo and component/loadComponent cannot be used together");
	}
	if route.component.is_some() && route.load_component.is_some() {
		return invalid("component and loadComponent cannot be used together");
	}
	if route.redirect_to.is_some() && !route.can_activate.is_empty() {
		return invalid("redirectTo and canActivate cannot be used together");
	}
	if route.path.is_some() && route.matcher.is_some() {
		return invalid("path and matcher cannot be used together");
	}
	if route.redirect_to.is_none() && !has_component && !has_children {
		return invalid("one of the following must be provided: component, loadComponent, redirectTo, children or loadChildren");
	}
	if route.path.is_none() && route.matcher.is_none() {
		return invalid("routes must have either a path or a matcher specified");
	}
	if let Some(p) = &route.path {
		if p.starts_with('/') {
			return invalid("path cannot start with a slash");
		}
		if p == "**" && has_children {
			return invalid("a wildcard route cannot have children");
		}
		if p.is_empty() && route.redirect_to.is_some() && route.path_match.is_none() {
			return invalid(
				"please provide 'pathMatch'. The default value of 'pathMatch' is 'prefix', but often the intent is to use 'full'",
			);
		}
	}
	if let Some(children) = &route.children {
		validate_config(children, &path)?;
	}
	Ok(())
}
