//! Navigation lifecycle events.
//!
//! Every scheduled navigation produces, in order:
//!
//! ```text
//! NavigationStart
//! (RouteConfigLoadStart RouteConfigLoadEnd)*
//! RoutesRecognized
//! GuardsCheckStart
//! (ChildActivationStart | ActivationStart)*
//! GuardsCheckEnd
//! (ResolveStart ResolveEnd)?
//! (ActivationEnd | ChildActivationEnd)*
//! NavigationEnd | NavigationCancel | NavigationError
//! ```
//!
//! Exactly one terminal event is emitted per navigation id.

use std::fmt;
use std::sync::Arc;

use crate::config::Route;
use crate::error::RouterError;
use crate::location::HistoryState;
use crate::router_state::{ActivatedRouteSnapshot, RouterStateSnapshot};

/// What triggered a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTrigger {
	/// A call to `navigate` or `navigate_by_url`.
	Imperative,
	/// A history `popstate` event.
	PopState,
	/// A `hashchange` event.
	HashChange,
}

impl NavigationTrigger {
	/// Whether the browser already shows the URL being navigated to.
	pub fn is_browser_triggered(self) -> bool {
		!matches!(self, Self::Imperative)
	}
}

/// Why a navigation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationCancellationCode {
	/// A guard or resolver redirected elsewhere.
	Redirect,
	/// A newer navigation was scheduled.
	SupersededByNewNavigation,
	/// A resolver completed without a value.
	NoDataFromResolver,
	/// A guard returned `false` or completed without a value.
	GuardRejected,
}

/// A router event.
#[derive(Debug, Clone)]
pub enum Event {
	NavigationStart {
		id: u64,
		url: String,
		trigger: NavigationTrigger,
		/// History state restored by a popstate navigation.
		restored_state: Option<HistoryState>,
	},
	RouteConfigLoadStart {
		route: Arc<Route>,
	},
	RouteConfigLoadEnd {
		route: Arc<Route>,
	},
	RoutesRecognized {
		id: u64,
		url: String,
		url_after_redirects: String,
		state: Arc<RouterStateSnapshot>,
	},
	GuardsCheckStart {
		id: u64,
		url: String,
		url_after_redirects: String,
		state: Arc<RouterStateSnapshot>,
	},
	ChildActivationStart {
		snapshot: ActivatedRouteSnapshot,
	},
	ActivationStart {
		snapshot: ActivatedRouteSnapshot,
	},
	GuardsCheckEnd {
		id: u64,
		url: String,
		url_after_redirects: String,
		state: Arc<RouterStateSnapshot>,
		should_activate: bool,
	},
	ResolveStart {
		id: u64,
		url: String,
		url_after_redirects: String,
		state: Arc<RouterStateSnapshot>,
	},
	ResolveEnd {
		id: u64,
		url: String,
		url_after_redirects: String,
		state: Arc<RouterStateSnapshot>,
	},
	ActivationEnd {
		snapshot: ActivatedRouteSnapshot,
	},
	ChildActivationEnd {
		snapshot: ActivatedRouteSnapshot,
	},
	NavigationEnd {
		id: u64,
		url: String,
		url_after_redirects: String,
	},
	NavigationCancel {
		id: u64,
		url: String,
		reason: String,
		code: NavigationCancellationCode,
	},
	NavigationError {
		id: u64,
		url: String,
		error: RouterError,
	},
	/// Published by hosts that restore scroll positions.
	Scroll {
		navigation_id: u64,
		position: Option<(f64, f64)>,
		anchor: Option<String>,
	},
}

impl Event {
	/// The navigation id carried by this event, if any.
	pub fn navigation_id(&self) -> Option<u64> {
		match self {
			Self::NavigationStart { id, .. }
			| Self::RoutesRecognized { id, .. }
			| Self::GuardsCheckStart { id, .. }
			| Self::GuardsCheckEnd { id, .. }
			| Self::ResolveStart { id, .. }
			| Self::ResolveEnd { id, .. }
			| Self::NavigationEnd { id, .. }
			| Self::NavigationCancel { id, .. }
			| Self::NavigationError { id, .. } => Some(*id),
			Self::Scroll { navigation_id, .. } => Some(*navigation_id),
			_ => None,
		}
	}

	/// Whether this event ends a navigation.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			Self::NavigationEnd { .. } | Self::NavigationCancel { .. } | Self::NavigationError { .. }
		)
	}

	/// A short name for the event kind.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::NavigationStart { .. } => "NavigationStart",
			Self::RouteConfigLoadStart { .. } => "RouteConfigLoadStart",
			Self::RouteConfigLoadEnd { .. } => "RouteConfigLoadEnd",
			Self::RoutesRecognized { .. } => "RoutesRecognized",
			Self::GuardsCheckStart { .. } => "GuardsCheckStart",
			Self::ChildActivationStart { .. } => "ChildActivationStart",
			Self::ActivationStart { .. } => "ActivationStart",
			Self::GuardsCheckEnd { .. } => "GuardsCheckEnd",
			Self::ResolveStart { .. } => "ResolveStart",
			Self::ResolveEnd { .. } => "ResolveEnd",
			Self::ActivationEnd { .. } => "ActivationEnd",
			Self::ChildActivationEnd { .. } => "ChildActivationEnd",
			Self::NavigationEnd { .. } => "NavigationEnd",
			Self::NavigationCancel { .. } => "NavigationCancel",
			Self::NavigationError { .. } => "NavigationError",
			Self::Scroll { .. } => "Scroll",
		}
	}
}

impl fmt::Display for Event {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NavigationStart { id, url, .. } => write!(f, "NavigationStart(id: {id}, url: '{url}')"),
			Self::NavigationEnd {
				id,
				url,
				url_after_redirects,
			} => write!(
				f,
				"NavigationEnd(id: {id}, url: '{url}', urlAfterRedirects: '{url_after_redirects}')"
			),
			Self::NavigationCancel { id, url, reason, .. } => {
				write!(f, "NavigationCancel(id: {id}, url: '{url}', reason: '{reason}')")
			}
			Self::NavigationError { id, url, error } => {
				write!(f, "NavigationError(id: {id}, url: '{url}', error: {error})")
			}
			Self::RouteConfigLoadStart { route } => {
				write!(f, "RouteConfigLoadStart(path: {})", route.path().unwrap_or_default())
			}
			Self::RouteConfigLoadEnd { route } => {
				write!(f, "RouteConfigLoadEnd(path: {})", route.path().unwrap_or_default())
			}
			Self::ChildActivationStart { snapshot }
			| Self::ActivationStart { snapshot }
			| Self::ActivationEnd { snapshot }
			| Self::ChildActivationEnd { snapshot } => {
				write!(f, "{}(path: '{}')", self.kind(), snapshot.route_path())
			}
			Self::Scroll { anchor, position, .. } => {
				write!(f, "Scroll(anchor: {anchor:?}, position: {position:?})")
			}
			Self::RoutesRecognized {
				id,
				url,
				url_after_redirects,
				..
			}
			| Self::GuardsCheckStart {
				id,
				url,
				url_after_redirects,
				..
			}
			| Self::ResolveStart {
				id,
				url,
				url_after_redirects,
				..
			}
			| Self::ResolveEnd {
				id,
				url,
				url_after_redirects,
				..
			} => write!(
				f,
				"{}(id: {id}, url: '{url}', urlAfterRedirects: '{url_after_redirects}')",
				self.kind()
			),
			Self::GuardsCheckEnd {
				id,
				url,
				url_after_redirects,
				should_activate,
				..
			} => write!(
				f,
				"GuardsCheckEnd(id: {id}, url: '{url}', urlAfterRedirects: '{url_after_redirects}', shouldActivate: {should_activate})"
			),
		}
	}
}
