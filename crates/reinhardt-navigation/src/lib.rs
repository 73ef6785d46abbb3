//! Client-side navigation for Reinhardt.
//!
//! The router maps URLs to a tree of routes, runs guards and resolvers, and
//! activates components in outlets:
//!
//! - [`url_tree`] and [`url_serializer`]: the parsed form of a URL and its
//!   canonical text form
//! - [`config`]: route definitions
//! - [`router_state`]: the recognised tree of routes, as snapshots and as
//!   live [`ActivatedRoute`]s
//! - [`router`]: the [`Router`] service that schedules and runs navigations
//! - [`outlet`], [`location`], [`reuse_strategy`], [`url_handling`] and
//!   [`config_loader`]: the seams a host application plugs into
//!
//! ## Example
//!
//! ```no_run
//! use reinhardt_navigation::{Event, NavigationExtras, Route, Router};
//!
//! # async fn demo() -> Result<(), reinhardt_navigation::RouterError> {
//! let router = Router::builder(vec![
//! 	Route::new("").component("Home"),
//! 	Route::new("team/:id").component("Team").children(vec![
//! 		Route::new("user/:name").component("User"),
//! 	]),
//! 	Route::new("**").redirect_to("/"),
//! ])
//! .root_component("App")
//! .build()?;
//!
//! let mut events = router.events();
//! router.navigate_by_url("/team/3/user/ferris", NavigationExtras::default()).await?;
//! while let Ok(event) = events.try_recv() {
//! 	if let Event::NavigationEnd { url_after_redirects, .. } = event {
//! 		assert_eq!(url_after_redirects, "/team/3/user/ferris");
//! 	}
//! }
//! # Ok(())
//! # }
//! ```

mod activate_routes;
mod check_guards;
pub mod config;
pub mod config_loader;
mod create_router_state;
pub mod create_url_tree;
pub mod error;
pub mod events;
pub mod guards;
pub mod location;
pub mod options;
pub mod outlet;
mod pre_activation;
mod recognize;
mod redirects;
mod resolve_data;
pub mod reuse_strategy;
pub mod router;
pub mod router_state;
mod transition;
pub mod url_handling;
pub mod url_serializer;
pub mod url_tree;

pub use config::{ComponentId, Data, PathMatch, Route, Routes, RunGuardsAndResolvers, UrlMatchResult};
pub use config_loader::{DefaultRouteLoader, RouteLoader};
pub use create_url_tree::Command;
pub use error::{MalformedUriError, RouterError, RouterResult};
pub use events::{Event, NavigationCancellationCode, NavigationTrigger};
pub use guards::{GuardResult, MaybeAsync, ResolvedValue};
pub use location::{HistoryState, Location, MemoryLocation, PopStateEvent};
pub use options::{
	CanceledNavigationResolution, OnSameUrlNavigation, ParamsInheritanceStrategy, RouterOptions, UrlUpdateStrategy,
};
pub use outlet::{ChildrenOutletContexts, ComponentRef, OutletContext, RouterOutlet};
pub use recognize::default_url_matcher;
pub use reuse_strategy::{DefaultRouteReuseStrategy, DetachedRouteHandle, RouteReuseStrategy};
pub use router::{ErrorHandler, MalformedUriHandler, PendingNavigation, Router, RouterBuilder};
pub use router_state::{ActivatedRoute, ActivatedRouteSnapshot, RouterState, RouterStateSnapshot, TreeNode};
pub use transition::{Navigation, NavigationExtras, QueryParamsHandling};
pub use url_handling::{DefaultUrlHandlingStrategy, UrlHandlingStrategy};
pub use url_serializer::{DefaultUrlSerializer, UrlSerializer};
pub use url_tree::{
	IsActiveMatchOptions, PRIMARY_OUTLET, Params, QueryParams, QueryValue, UrlSegment, UrlSegmentGroup, UrlTree,
};
