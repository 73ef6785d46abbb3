//! Lazy loading of child routes and components.
//!
//! Loads are memoised on the [`Route`] node, and concurrent requests for the
//! same route share one in-flight future.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::{ComponentId, LoadedChildren, Route, Routes, validate_config};
use crate::error::{RouterError, RouterResult};
use crate::events::Event;

/// Fetches lazily declared children and components.
///
/// The default implementation calls the loaders declared on the route.
pub trait RouteLoader: Send + Sync {
	fn load_children(&self, route: &Route) -> BoxFuture<'static, anyhow::Result<LoadedChildren>> {
		match route.children_loader() {
			Some(loader) => loader(),
			None => {
				let path = route.path_or_empty().to_string();
				async move { Err(anyhow::anyhow!("route '{path}' has no children loader")) }.boxed()
			}
		}
	}

	fn load_component(&self, route: &Route) -> BoxFuture<'static, anyhow::Result<ComponentId>> {
		match route.component_loader() {
			Some(loader) => loader(),
			None => {
				let path = route.path_or_empty().to_string();
				async move { Err(anyhow::anyhow!("route '{path}' has no component loader")) }.boxed()
			}
		}
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRouteLoader;

impl RouteLoader for DefaultRouteLoader {}

type InFlight<T> = Shared<BoxFuture<'static, RouterResult<T>>>;

fn key(route: &Arc<Route>) -> usize {
	Arc::as_ptr(route) as usize
}

pub(crate) struct RouterConfigLoader {
	loader: Arc<dyn RouteLoader>,
	events: broadcast::Sender<Event>,
	children: Mutex<HashMap<usize, InFlight<Arc<Routes>>>>,
	components: Mutex<HashMap<usize, InFlight<ComponentId>>>,
}

impl RouterConfigLoader {
	pub(crate) fn new(loader: Arc<dyn RouteLoader>, events: broadcast::Sender<Event>) -> Self {
		Self {
			loader,
			events,
			children: Mutex::new(HashMap::new()),
			components: Mutex::new(HashMap::new()),
		}
	}

	/// Loads, validates and memoises the lazy children of `route`.
	pub(crate) async fn load_children(&self, route: &Arc<Route>) -> RouterResult<Arc<Routes>> {
		if let Some(loaded) = route.loaded_routes() {
			return Ok(loaded);
		}
		let key = key(route);
		let in_flight = self
			.children
			.lock()
			.entry(key)
			.or_insert_with(|| {
				tracing::debug!(path = route.path_or_empty(), "loading children");
				let _ = self.events.send(Event::RouteConfigLoadStart { route: route.clone() });
				let load = self.loader.load_children(route);
				let route = route.clone();
				let events = self.events.clone();
				async move {
					let loaded = load.await.map_err(RouterError::load)?;
					let routes: Routes = loaded.into_routes().into_iter().map(Arc::new).collect();
					validate_config(&routes, route.path_or_empty())?;
					let routes = Arc::new(routes);
					route.set_loaded_routes(routes.clone());
					let _ = events.send(Event::RouteConfigLoadEnd { route });
					Ok(routes)
				}
				.boxed()
				.shared()
			})
			.clone();
		let result = in_flight.await;
		self.children.lock().remove(&key);
		result
	}

	/// Loads and memoises the lazy component of `route`.
	pub(crate) async fn load_component(&self, route: &Arc<Route>) -> RouterResult<ComponentId> {
		if let Some(loaded) = route.loaded_component() {
			return Ok(loaded);
		}
		let key = key(route);
		let in_flight = self
			.components
			.lock()
			.entry(key)
			.or_insert_with(|| {
				tracing::debug!(path = route.path_or_empty(), "loading component");
				let _ = self.events.send(Event::RouteConfigLoadStart { route: route.clone() });
				let load = self.loader.load_component(route);
				let route = route.clone();
				let events = self.events.clone();
				async move {
					let component = load.await.map_err(RouterError::load)?;
					route.set_loaded_component(component.clone());
					let _ = events.send(Event::RouteConfigLoadEnd { route });
					Ok(component)
				}
				.boxed()
				.shared()
			})
			.clone();
		let result = in_flight.await;
		self.components.lock().remove(&key);
		result
	}
}
