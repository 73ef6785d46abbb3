//! The router service.
//!
//! [`Router`] owns the route configuration, the current URL and
//! [`RouterState`], and the event stream. Navigations are scheduled from any
//! task and processed one at a time by a driver task spawned on the current
//! tokio runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{ComponentId, Route, Routes, validate_config};
use crate::config_loader::{DefaultRouteLoader, RouteLoader, RouterConfigLoader};
use crate::create_url_tree::{Command, create_url_tree_from_segment_group, create_url_tree_from_snapshot};
use crate::error::{MalformedUriError, RouterError, RouterResult};
use crate::events::{Event, NavigationTrigger};
use crate::location::{HistoryState, Location, MemoryLocation, PopStateEvent};
use crate::options::{CanceledNavigationResolution, RouterOptions};
use crate::outlet::ChildrenOutletContexts;
use crate::reuse_strategy::{DefaultRouteReuseStrategy, RouteReuseStrategy};
use crate::router_state::{RouterState, create_empty_state};
use crate::transition::{
	Navigation, NavigationExtras, NavigationTransition, QueryParamsHandling, Responder, ScheduledNavigation, drive,
};
use crate::url_handling::{DefaultUrlHandlingStrategy, UrlHandlingStrategy};
use crate::url_serializer::{DefaultUrlSerializer, UrlSerializer};
use crate::url_tree::{IsActiveMatchOptions, QueryParams, UrlTree, contains_tree};

/// Turns a navigation error into the navigation's result.
pub type ErrorHandler = Arc<dyn Fn(RouterError) -> RouterResult<bool> + Send + Sync>;

/// Produces the tree to use for a URL that failed to parse.
pub type MalformedUriHandler = Arc<dyn Fn(&MalformedUriError, &dyn UrlSerializer, &str) -> UrlTree + Send + Sync>;

/// The eventual result of a scheduled navigation.
///
/// Resolves to `Ok(true)` when the navigation completed, `Ok(false)` when it
/// was cancelled, and to the error handler's result when it failed.
/// Dropping it does not cancel the navigation.
#[derive(Debug)]
pub struct PendingNavigation {
	rx: oneshot::Receiver<RouterResult<bool>>,
}

impl PendingNavigation {
	fn channel() -> (Responder, Self) {
		let (tx, rx) = oneshot::channel();
		(tx, Self { rx })
	}

	fn ready(result: RouterResult<bool>) -> Self {
		let (tx, pending) = Self::channel();
		let _ = tx.send(result);
		pending
	}
}

impl Future for PendingNavigation {
	type Output = RouterResult<bool>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.rx
			.poll_unpin(cx)
			.map(|result| result.unwrap_or(Err(RouterError::Disposed)))
	}
}

/// What the last scheduled navigation looked like, for duplicate detection.
pub(crate) struct LastTransition {
	id: u64,
	source: NavigationTrigger,
	raw_url: String,
	url_after_redirects: Option<String>,
}

/// A location change seen by the listener.
pub(crate) struct LocationChange {
	source: NavigationTrigger,
	url: String,
	navigation_id: u64,
}

/// Mutable router state. Never held across an await.
pub(crate) struct RouterFields {
	pub current_url_tree: UrlTree,
	pub raw_url_tree: UrlTree,
	pub browser_url_tree: UrlTree,
	pub router_state: Arc<RouterState>,
	pub navigated: bool,
	pub last_successful_id: Option<u64>,
	pub current_page_id: i64,
	pub current_navigation: Option<Navigation>,
	pub last_successful_navigation: Option<Navigation>,
	pub last_transition: Option<LastTransition>,
	pub last_location_change: Option<LocationChange>,
}

pub(crate) struct RouterInner {
	pub(crate) options: RouterOptions,
	pub(crate) location: Arc<dyn Location>,
	pub(crate) serializer: Arc<dyn UrlSerializer>,
	pub(crate) url_handling: Arc<dyn UrlHandlingStrategy>,
	pub(crate) reuse_strategy: Arc<dyn RouteReuseStrategy>,
	pub(crate) config_loader: RouterConfigLoader,
	pub(crate) error_handler: ErrorHandler,
	pub(crate) malformed_uri_handler: MalformedUriHandler,
	pub(crate) root_component: Option<ComponentId>,
	pub(crate) root_contexts: Arc<ChildrenOutletContexts>,
	pub(crate) events: broadcast::Sender<Event>,
	pub(crate) state: Mutex<RouterFields>,
	navigation_id: AtomicU64,
	config: RwLock<Arc<Routes>>,
	scheduler: Mutex<Option<mpsc::UnboundedSender<ScheduledNavigation>>>,
	listener: Mutex<Option<JoinHandle<()>>>,
	disposed: AtomicBool,
}

impl RouterInner {
	pub(crate) fn emit(&self, event: Event) {
		// No subscribers is fine.
		let _ = self.events.send(event);
	}

	pub(crate) fn serialize(&self, tree: &UrlTree) -> String {
		self.serializer.serialize(tree)
	}

	pub(crate) fn config(&self) -> Arc<Routes> {
		self.config.read().clone()
	}

	pub(crate) fn latest_navigation_id(&self) -> u64 {
		self.navigation_id.load(Ordering::SeqCst)
	}

	fn parse_url(&self, url: &str) -> UrlTree {
		match self.serializer.parse(url) {
			Ok(tree) => tree,
			Err(error) => {
				tracing::warn!(%url, %error, "malformed URL");
				(self.malformed_uri_handler)(&error, self.serializer.as_ref(), url)
			}
		}
	}

	pub(crate) fn begin_navigation(&self, t: &NavigationTransition) {
		let mut state = self.state.lock();
		let previous_navigation = state.last_successful_navigation.clone().map(|mut previous| {
			previous.previous_navigation = None;
			Box::new(previous)
		});
		state.current_navigation = Some(Navigation {
			id: t.id,
			initial_url: t.raw_url.clone(),
			extracted_url: t.extracted_url.clone(),
			final_url: None,
			trigger: t.source,
			extras: t.extras.clone(),
			previous_navigation,
		});
	}

	pub(crate) fn record_final_url(&self, id: u64, url_after_redirects: &UrlTree) {
		let serialized = self.serialize(url_after_redirects);
		let mut state = self.state.lock();
		if let Some(navigation) = state.current_navigation.as_mut().filter(|n| n.id == id) {
			navigation.final_url = Some(url_after_redirects.clone());
		}
		if let Some(last) = state.last_transition.as_mut().filter(|l| l.id == id) {
			last.url_after_redirects = Some(serialized);
		}
	}

	pub(crate) fn clear_current_navigation(&self, id: u64) {
		let mut state = self.state.lock();
		if state.current_navigation.as_ref().is_some_and(|n| n.id == id) {
			state.current_navigation = None;
		}
	}

	/// A browser-triggered navigation that repeats the imperative navigation
	/// just scheduled.
	fn is_duplicate(&self, state: &RouterFields, raw_url: &str, source: NavigationTrigger) -> bool {
		let Some(last) = state.last_transition.as_ref() else {
			return false;
		};
		if !source.is_browser_triggered() || last.source.is_browser_triggered() {
			return false;
		}
		let succeeded = state.last_successful_id == Some(last.id);
		let last_url = if succeeded || state.current_navigation.is_some() {
			Some(&last.raw_url)
		} else {
			last.url_after_redirects.as_ref()
		};
		last_url.is_some_and(|url| url == raw_url)
	}

	/// Assigns the next id and hands the navigation to the driver.
	pub(crate) fn schedule_navigation(
		&self,
		raw_url: UrlTree,
		source: NavigationTrigger,
		restored_state: Option<HistoryState>,
		extras: NavigationExtras,
		responder: Option<Responder>,
	) -> PendingNavigation {
		let (responder, pending) = match responder {
			Some(responder) => (responder, None),
			None => {
				let (tx, pending) = PendingNavigation::channel();
				(tx, Some(pending))
			}
		};
		let pending = pending.unwrap_or_else(|| PendingNavigation::ready(Ok(false)));

		if self.disposed.load(Ordering::SeqCst) {
			let _ = responder.send(Ok(false));
			return pending;
		}

		let serialized = self.serialize(&raw_url);
		let mut state = self.state.lock();
		if self.is_duplicate(&state, &serialized, source) {
			tracing::debug!(url = %serialized, "duplicate browser navigation ignored");
			let _ = responder.send(Ok(true));
			return pending;
		}

		let id = self.navigation_id.fetch_add(1, Ordering::SeqCst) + 1;
		let mut restored_state = restored_state;
		let target_page_id = match self.options.canceled_navigation_resolution {
			CanceledNavigationResolution::Computed => {
				if state.current_page_id == 0 {
					restored_state = self.location.get_state();
				}
				let browser_page_id = self.location.get_state().and_then(|s| s.router_page_id).unwrap_or(0);
				match restored_state.as_ref().and_then(|s| s.router_page_id) {
					Some(page_id) => page_id,
					None if extras.replace_url || extras.skip_location_change => browser_page_id,
					None => browser_page_id + 1,
				}
			}
			CanceledNavigationResolution::Replace => 0,
		};

		let transition = NavigationTransition {
			id,
			target_page_id,
			source,
			restored_state,
			extracted_url: self.url_handling.extract(&raw_url),
			raw_url,
			url_after_redirects: None,
			current_url_tree: state.current_url_tree.clone(),
			current_snapshot: state.router_state.snapshot().clone(),
			current_router_state: state.router_state.clone(),
			target_snapshot: None,
			guards: Default::default(),
			extras,
			committed: false,
		};
		state.last_transition = Some(LastTransition {
			id,
			source,
			raw_url: serialized,
			url_after_redirects: None,
		});
		drop(state);

		let scheduled = ScheduledNavigation { transition, responder };
		match self.scheduler.lock().as_ref() {
			Some(scheduler) => {
				if let Err(mpsc::error::SendError(scheduled)) = scheduler.send(scheduled) {
					let _ = scheduled.responder.send(Ok(false));
				}
			}
			None => {
				let _ = scheduled.responder.send(Ok(false));
			}
		}
		pending
	}

	/// Whether a location change should start a navigation. A popstate and
	/// a hashchange for the same URL fired together count once.
	fn should_schedule(previous: Option<&LocationChange>, current: &LocationChange) -> bool {
		let Some(previous) = previous else {
			return true;
		};
		let same_destination = previous.url == current.url;
		let same_time = previous.navigation_id == current.navigation_id;
		if !same_time || !same_destination {
			return true;
		}
		!matches!(
			(previous.source, current.source),
			(NavigationTrigger::PopState, NavigationTrigger::HashChange)
				| (NavigationTrigger::HashChange, NavigationTrigger::PopState)
		)
	}

	fn on_location_change(&self, event: PopStateEvent) {
		let tree = self.parse_url(&event.url);
		let change = LocationChange {
			source: event.trigger,
			url: self.serialize(&tree),
			navigation_id: self.latest_navigation_id(),
		};
		let schedule = {
			let mut state = self.state.lock();
			let schedule = Self::should_schedule(state.last_location_change.as_ref(), &change);
			state.last_location_change = Some(change);
			schedule
		};
		if !schedule {
			return;
		}

		let restored_state = event.state.filter(|s| s.navigation_id.is_some());
		let extras = NavigationExtras {
			replace_url: true,
			state: restored_state
				.as_ref()
				.map(|s| s.extra.clone())
				.filter(|extra| !extra.is_empty()),
			..NavigationExtras::default()
		};
		tracing::debug!(url = %event.url, trigger = ?event.trigger, "location changed");
		let _ = self.schedule_navigation(tree, event.trigger, restored_state, extras, None);
	}
}

/// The router.
///
/// Cloning is cheap; clones share the same state.
///
/// ```no_run
/// use reinhardt_navigation::{NavigationExtras, Route, Router};
///
/// # async fn demo() -> Result<(), reinhardt_navigation::RouterError> {
/// let router = Router::builder(vec![
/// 	Route::new("").component("Home"),
/// 	Route::new("user/:id").component("User"),
/// ])
/// .build()?;
/// assert!(router.navigate_by_url("/user/7", NavigationExtras::default()).await?);
/// assert_eq!(router.url(), "/user/7");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Router {
	inner: Arc<RouterInner>,
}

impl std::fmt::Debug for Router {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Router")
			.field("url", &self.url())
			.field("navigated", &self.navigated())
			.field("options", &self.inner.options)
			.finish()
	}
}

impl Router {
	pub fn builder(routes: Vec<Route>) -> RouterBuilder {
		RouterBuilder::new(routes)
	}

	/// Navigates to `url`, resolved against the raw current URL by the
	/// URL handling strategy.
	pub fn navigate_by_url(&self, url: &str, extras: NavigationExtras) -> PendingNavigation {
		let tree = self.inner.parse_url(url);
		self.navigate_by_url_tree(tree, extras)
	}

	pub fn navigate_by_url_tree(&self, tree: UrlTree, extras: NavigationExtras) -> PendingNavigation {
		let raw = self.inner.state.lock().raw_url_tree.clone();
		let merged = self.inner.url_handling.merge(&tree, &raw);
		self.inner
			.schedule_navigation(merged, NavigationTrigger::Imperative, None, extras, None)
	}

	/// Navigates by applying `commands` relative to `extras.relative_to`.
	pub fn navigate(&self, commands: &[Command], extras: NavigationExtras) -> PendingNavigation {
		match self.create_url_tree(commands, &extras) {
			Ok(tree) => self.navigate_by_url_tree(tree, extras),
			Err(error) => PendingNavigation::ready(Err(error)),
		}
	}

	/// Builds a URL tree from commands without navigating.
	///
	/// # Errors
	///
	/// Returns [`RouterError::InvalidCommands`] for malformed commands.
	pub fn create_url_tree(&self, commands: &[Command], extras: &NavigationExtras) -> RouterResult<UrlTree> {
		let (current_url_tree, router_state) = {
			let state = self.inner.state.lock();
			(state.current_url_tree.clone(), state.router_state.clone())
		};
		let fragment = if extras.preserve_fragment {
			current_url_tree.fragment.clone()
		} else {
			extras.fragment.clone()
		};
		let query_params = match extras.query_params_handling {
			QueryParamsHandling::Merge => {
				let mut merged = current_url_tree.query_params.clone();
				merged.extend(extras.query_params.clone().unwrap_or_default());
				merged
			}
			QueryParamsHandling::Preserve => current_url_tree.query_params.clone(),
			QueryParamsHandling::Replace => extras.query_params.clone().unwrap_or_default(),
		};
		let query_params: QueryParams = query_params
			.into_iter()
			.filter_map(|(key, value)| value.normalized().map(|value| (key, value)))
			.collect();

		let snapshot = router_state.snapshot();
		let relative_to = extras
			.relative_to
			.as_ref()
			.map(|route| route.snapshot())
			.unwrap_or_else(|| snapshot.root_route().clone());
		if snapshot.node(relative_to.id()).is_some() {
			return create_url_tree_from_snapshot(snapshot, &relative_to, commands, query_params, fragment);
		}

		// The route is no longer part of the state: only absolute commands
		// still make sense.
		let absolute = matches!(commands.first(), Some(Command::Path(path)) if path.starts_with('/'));
		let commands = if absolute { commands } else { &[] };
		create_url_tree_from_segment_group(&current_url_tree.root, &[], commands, query_params, fragment)
	}

	/// The current URL.
	pub fn url(&self) -> String {
		let state = self.inner.state.lock();
		self.inner.serialize(&state.current_url_tree)
	}

	pub fn current_url_tree(&self) -> UrlTree {
		self.inner.state.lock().current_url_tree.clone()
	}

	/// The full URL including the parts the URL handling strategy leaves
	/// to others.
	pub fn raw_url_tree(&self) -> UrlTree {
		self.inner.state.lock().raw_url_tree.clone()
	}

	/// Parses `url`, falling back to the malformed URI handler.
	pub fn parse_url(&self, url: &str) -> UrlTree {
		self.inner.parse_url(url)
	}

	pub fn serialize_url(&self, tree: &UrlTree) -> String {
		self.inner.serialize(tree)
	}

	/// Whether `url` is active under `options`.
	pub fn is_active(&self, url: &str, options: IsActiveMatchOptions) -> bool {
		let tree = self.inner.parse_url(url);
		self.is_active_tree(&tree, options)
	}

	pub fn is_active_tree(&self, tree: &UrlTree, options: IsActiveMatchOptions) -> bool {
		contains_tree(&self.inner.state.lock().current_url_tree, tree, options)
	}

	/// Replaces the route configuration. The current state is kept until
	/// the next navigation.
	///
	/// # Errors
	///
	/// Returns [`RouterError::InvalidConfig`] if the configuration is invalid.
	pub fn reset_config(&self, routes: Vec<Route>) -> RouterResult<()> {
		validate_config(&routes, "")?;
		*self.inner.config.write() = Arc::new(routes.into_iter().map(Arc::new).collect());
		Ok(())
	}

	pub fn config(&self) -> Arc<Routes> {
		self.inner.config()
	}

	pub fn current_navigation(&self) -> Option<Navigation> {
		self.inner.state.lock().current_navigation.clone()
	}

	pub fn last_successful_navigation(&self) -> Option<Navigation> {
		self.inner.state.lock().last_successful_navigation.clone()
	}

	/// Whether at least one navigation has happened.
	pub fn navigated(&self) -> bool {
		self.inner.state.lock().navigated
	}

	pub fn router_state(&self) -> Arc<RouterState> {
		self.inner.state.lock().router_state.clone()
	}

	/// Subscribes to router events.
	pub fn events(&self) -> broadcast::Receiver<Event> {
		self.inner.events.subscribe()
	}

	pub fn root_contexts(&self) -> &Arc<ChildrenOutletContexts> {
		&self.inner.root_contexts
	}

	pub fn options(&self) -> &RouterOptions {
		&self.inner.options
	}

	/// Starts listening to the location and navigates to its current URL.
	///
	/// Only the first call navigates; it returns `None` afterwards or once
	/// any navigation has been scheduled.
	pub fn initial_navigation(&self) -> Option<PendingNavigation> {
		self.set_up_location_change_listener();
		if self.inner.latest_navigation_id() != 0 {
			return None;
		}
		let path = self.inner.location.path(true);
		Some(self.navigate_by_url(&path, NavigationExtras::replace_url()))
	}

	/// Schedules a navigation for every popstate and hashchange the
	/// location reports. Calling it again has no effect.
	pub fn set_up_location_change_listener(&self) {
		let mut listener = self.inner.listener.lock();
		if listener.is_some() || self.is_disposed() {
			return;
		}
		let mut changes = self.inner.location.subscribe();
		let router = Arc::downgrade(&self.inner);
		*listener = Some(tokio::spawn(async move {
			loop {
				match changes.recv().await {
					Ok(event) => {
						let Some(router) = router.upgrade() else {
							break;
						};
						router.on_location_change(event);
					}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "location listener lagged");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		}));
	}

	/// Publishes a [`Event::Scroll`] for the last successful navigation.
	pub fn publish_scroll(&self, position: Option<(f64, f64)>, anchor: Option<String>) {
		let navigation_id = self.inner.state.lock().last_successful_id.unwrap_or(0);
		self.inner.emit(Event::Scroll {
			navigation_id,
			position,
			anchor,
		});
	}

	/// Stops listening to the location and rejects further navigations.
	/// A navigation already running is allowed to finish.
	pub fn dispose(&self) {
		if self.inner.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(listener) = self.inner.listener.lock().take() {
			listener.abort();
		}
		self.inner.scheduler.lock().take();
		tracing::debug!("router disposed");
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.load(Ordering::SeqCst)
	}
}

/// Builds a [`Router`].
pub struct RouterBuilder {
	routes: Vec<Route>,
	options: RouterOptions,
	location: Option<Arc<dyn Location>>,
	serializer: Arc<dyn UrlSerializer>,
	url_handling: Arc<dyn UrlHandlingStrategy>,
	reuse_strategy: Arc<dyn RouteReuseStrategy>,
	route_loader: Arc<dyn RouteLoader>,
	error_handler: ErrorHandler,
	malformed_uri_handler: MalformedUriHandler,
	root_component: Option<ComponentId>,
	root_contexts: Option<Arc<ChildrenOutletContexts>>,
}

impl std::fmt::Debug for RouterBuilder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RouterBuilder")
			.field("routes", &self.routes.len())
			.field("options", &self.options)
			.field("root_component", &self.root_component)
			.finish()
	}
}

fn rethrow(error: RouterError) -> RouterResult<bool> {
	Err(error)
}

fn default_malformed_uri_handler(_error: &MalformedUriError, serializer: &dyn UrlSerializer, _url: &str) -> UrlTree {
	serializer.parse("/").unwrap_or_else(|_| UrlTree::root_url())
}

impl RouterBuilder {
	fn new(routes: Vec<Route>) -> Self {
		Self {
			routes,
			options: RouterOptions::default(),
			location: None,
			serializer: Arc::new(DefaultUrlSerializer),
			url_handling: Arc::new(DefaultUrlHandlingStrategy),
			reuse_strategy: Arc::new(DefaultRouteReuseStrategy),
			route_loader: Arc::new(DefaultRouteLoader),
			error_handler: Arc::new(rethrow),
			malformed_uri_handler: Arc::new(default_malformed_uri_handler),
			root_component: None,
			root_contexts: None,
		}
	}

	pub fn options(mut self, options: RouterOptions) -> Self {
		self.options = options;
		self
	}

	/// Defaults to a [`MemoryLocation`] at `/`.
	pub fn location(mut self, location: Arc<dyn Location>) -> Self {
		self.location = Some(location);
		self
	}

	pub fn serializer(mut self, serializer: Arc<dyn UrlSerializer>) -> Self {
		self.serializer = serializer;
		self
	}

	pub fn url_handling_strategy(mut self, strategy: Arc<dyn UrlHandlingStrategy>) -> Self {
		self.url_handling = strategy;
		self
	}

	pub fn reuse_strategy(mut self, strategy: Arc<dyn RouteReuseStrategy>) -> Self {
		self.reuse_strategy = strategy;
		self
	}

	pub fn route_loader(mut self, loader: Arc<dyn RouteLoader>) -> Self {
		self.route_loader = loader;
		self
	}

	/// Handles navigation errors. The default returns the error to the
	/// caller.
	pub fn error_handler<F>(mut self, handler: F) -> Self
	where
		F: Fn(RouterError) -> RouterResult<bool> + Send + Sync + 'static,
	{
		self.error_handler = Arc::new(handler);
		self
	}

	/// Handles URLs that fail to parse. The default navigates to `/`.
	pub fn malformed_uri_handler<F>(mut self, handler: F) -> Self
	where
		F: Fn(&MalformedUriError, &dyn UrlSerializer, &str) -> UrlTree + Send + Sync + 'static,
	{
		self.malformed_uri_handler = Arc::new(handler);
		self
	}

	pub fn root_component(mut self, component: impl Into<ComponentId>) -> Self {
		self.root_component = Some(component.into());
		self
	}

	/// Shares outlet contexts created elsewhere.
	pub fn root_contexts(mut self, contexts: Arc<ChildrenOutletContexts>) -> Self {
		self.root_contexts = Some(contexts);
		self
	}

	/// Validates the configuration and starts the navigation driver.
	///
	/// # Errors
	///
	/// Returns [`RouterError::InvalidConfig`] if the configuration is invalid.
	///
	/// # Panics
	///
	/// Panics when called outside a tokio runtime.
	pub fn build(self) -> RouterResult<Router> {
		validate_config(&self.routes, "")?;
		let (events, _) = broadcast::channel(self.options.events_capacity.max(1));
		let (tx, rx) = mpsc::unbounded_channel();
		let router_state = create_empty_state(self.root_component.clone());
		let url = UrlTree::root_url();

		let inner = Arc::new(RouterInner {
			config_loader: RouterConfigLoader::new(self.route_loader, events.clone()),
			options: self.options,
			location: self
				.location
				.unwrap_or_else(|| Arc::new(MemoryLocation::new("/"))),
			serializer: self.serializer,
			url_handling: self.url_handling,
			reuse_strategy: self.reuse_strategy,
			error_handler: self.error_handler,
			malformed_uri_handler: self.malformed_uri_handler,
			root_component: self.root_component,
			root_contexts: self.root_contexts.unwrap_or_default(),
			events,
			state: Mutex::new(RouterFields {
				current_url_tree: url.clone(),
				raw_url_tree: url.clone(),
				browser_url_tree: url,
				router_state,
				navigated: false,
				last_successful_id: None,
				current_page_id: 0,
				current_navigation: None,
				last_successful_navigation: None,
				last_transition: None,
				last_location_change: None,
			}),
			navigation_id: AtomicU64::new(0),
			config: RwLock::new(Arc::new(self.routes.into_iter().map(Arc::new).collect())),
			scheduler: Mutex::new(Some(tx)),
			listener: Mutex::new(None),
			disposed: AtomicBool::new(false),
		});
		tokio::spawn(drive(Arc::downgrade(&inner), rx));
		tracing::debug!(routes = inner.config().len(), "router created");
		Ok(Router { inner })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::url_tree::QueryValue;
	use rstest::rstest;

	fn change(source: NavigationTrigger, url: &str, navigation_id: u64) -> LocationChange {
		LocationChange {
			source,
			url: url.to_string(),
			navigation_id,
		}
	}

	#[rstest]
	#[case(NavigationTrigger::PopState, NavigationTrigger::HashChange, "/a", 1, false)]
	#[case(NavigationTrigger::HashChange, NavigationTrigger::PopState, "/a", 1, false)]
	#[case(NavigationTrigger::PopState, NavigationTrigger::PopState, "/a", 1, true)]
	#[case(NavigationTrigger::PopState, NavigationTrigger::HashChange, "/b", 1, true)]
	#[case(NavigationTrigger::PopState, NavigationTrigger::HashChange, "/a", 2, true)]
	fn test_popstate_and_hashchange_pair_schedules_once(
		#[case] first: NavigationTrigger,
		#[case] second: NavigationTrigger,
		#[case] url: &str,
		#[case] navigation_id: u64,
		#[case] expected: bool,
	) {
		let previous = change(first, "/a", 1);
		let current = change(second, url, navigation_id);
		assert_eq!(RouterInner::should_schedule(Some(&previous), &current), expected);
		assert!(RouterInner::should_schedule(None, &current));
	}

	#[rstest]
	#[tokio::test]
	async fn test_create_url_tree_query_params_handling() {
		let router = Router::builder(vec![Route::new("**").component("Any")]).build().unwrap();
		assert!(router.navigate_by_url("/a?x=1&y=2#top", NavigationExtras::default()).await.unwrap());

		let params = QueryParams::from([
			("y".to_string(), QueryValue::Single("3".to_string())),
			("x".to_string(), QueryValue::Multiple(Vec::new())),
		]);
		let merge = NavigationExtras {
			query_params: Some(params.clone()),
			query_params_handling: QueryParamsHandling::Merge,
			preserve_fragment: true,
			..NavigationExtras::default()
		};
		let tree = router.create_url_tree(&[Command::from("/b")], &merge).unwrap();
		assert_eq!(router.serialize_url(&tree), "/b?y=3#top");

		let preserve = NavigationExtras {
			query_params: Some(params),
			query_params_handling: QueryParamsHandling::Preserve,
			..NavigationExtras::default()
		};
		let tree = router.create_url_tree(&[Command::from("/b")], &preserve).unwrap();
		assert_eq!(router.serialize_url(&tree), "/b?x=1&y=2");
	}

	#[rstest]
	#[tokio::test]
	async fn test_malformed_url_falls_back_to_root() {
		let router = Router::builder(vec![Route::new("").component("Home")]).build().unwrap();
		assert_eq!(router.serialize_url(&router.parse_url("/%E0%A4%A")), "/");
	}

	#[rstest]
	#[tokio::test]
	async fn test_browser_repeat_of_imperative_navigation_resolves_true() {
		let router = Router::builder(vec![Route::new("a").component("A")]).build().unwrap();
		assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());
		let mut events = router.events();

		let repeat = router.inner.schedule_navigation(
			router.parse_url("/a"),
			NavigationTrigger::PopState,
			None,
			NavigationExtras::replace_url(),
			None,
		);
		assert!(repeat.await.unwrap());
		assert_eq!(router.inner.latest_navigation_id(), 1);
		assert!(events.try_recv().is_err());

		// A different URL from the browser is not a repeat.
		let other = router.inner.schedule_navigation(
			router.parse_url("/a?x=1"),
			NavigationTrigger::PopState,
			None,
			NavigationExtras::replace_url(),
			None,
		);
		assert!(other.await.unwrap());
		assert_eq!(router.inner.latest_navigation_id(), 2);
	}

	#[rstest]
	#[tokio::test]
	async fn test_disposed_router_rejects_navigations() {
		let router = Router::builder(vec![Route::new("a").component("A")]).build().unwrap();
		router.dispose();
		assert!(router.is_disposed());
		assert!(!router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());
		assert_eq!(router.url(), "/");
	}
}
