//! The navigation pipeline.
//!
//! Every scheduled navigation becomes a [`NavigationTransition`] that a
//! single driver task runs through recognition, guards, resolvers,
//! component loading, commit and activation. Scheduling a new navigation
//! while one is running drops the running one at its next await point and
//! cancels it with [`NavigationCancellationCode::SupersededByNewNavigation`].

use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio::sync::{mpsc, oneshot};

use crate::activate_routes::ActivateRoutes;
use crate::check_guards::check_guards;
use crate::config::Route;
use crate::create_router_state::create_router_state;
use crate::error::{Interruption, RouterError, RouterResult};
use crate::events::{Event, NavigationCancellationCode, NavigationTrigger};
use crate::guards::GuardResult;
use crate::location::HistoryState;
use crate::options::{CanceledNavigationResolution, OnSameUrlNavigation, UrlUpdateStrategy};
use crate::pre_activation::{Checks, get_all_route_guards};
use crate::recognize::recognize;
use crate::resolve_data::{ResolveOutcome, resolve_data};
use crate::router::RouterInner;
use crate::router_state::{ActivatedRoute, RouterState, RouterStateSnapshot, create_empty_snapshot};
use crate::url_tree::{QueryParams, UrlTree};

/// How `create_url_tree` treats the current query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryParamsHandling {
	/// Use only the given parameters.
	#[default]
	Replace,
	/// Add the given parameters to the current ones. An empty list value
	/// removes a key.
	Merge,
	/// Keep the current parameters and ignore the given ones.
	Preserve,
}

/// Options for a single navigation.
#[derive(Debug, Clone, Default)]
pub struct NavigationExtras {
	/// The route relative commands are applied to. Defaults to the root.
	pub relative_to: Option<Arc<ActivatedRoute>>,
	pub query_params: Option<QueryParams>,
	pub fragment: Option<String>,
	pub query_params_handling: QueryParamsHandling,
	/// Keep the current fragment.
	pub preserve_fragment: bool,
	/// Navigate without touching the history.
	pub skip_location_change: bool,
	/// Replace the current history entry instead of pushing one.
	pub replace_url: bool,
	/// Extra state stored with the history entry.
	pub state: Option<serde_json::Map<String, serde_json::Value>>,
	/// Overrides [`RouterOptions::on_same_url_navigation`](crate::options::RouterOptions).
	pub on_same_url_navigation: Option<OnSameUrlNavigation>,
}

impl NavigationExtras {
	pub fn replace_url() -> Self {
		Self {
			replace_url: true,
			..Self::default()
		}
	}

	pub fn skip_location_change() -> Self {
		Self {
			skip_location_change: true,
			..Self::default()
		}
	}
}

/// A navigation as seen from outside the pipeline.
#[derive(Debug, Clone)]
pub struct Navigation {
	pub id: u64,
	/// The URL passed to the router.
	pub initial_url: UrlTree,
	/// The part of the URL the router processes.
	pub extracted_url: UrlTree,
	/// The URL after redirects, once recognised.
	pub final_url: Option<UrlTree>,
	pub trigger: NavigationTrigger,
	pub extras: NavigationExtras,
	/// The last successful navigation before this one, without its own
	/// predecessor.
	pub previous_navigation: Option<Box<Navigation>>,
}

pub(crate) struct NavigationTransition {
	pub id: u64,
	pub target_page_id: i64,
	pub source: NavigationTrigger,
	pub restored_state: Option<HistoryState>,
	pub raw_url: UrlTree,
	pub extracted_url: UrlTree,
	pub url_after_redirects: Option<UrlTree>,
	pub current_url_tree: UrlTree,
	pub current_snapshot: Arc<RouterStateSnapshot>,
	pub current_router_state: Arc<RouterState>,
	pub target_snapshot: Option<RouterStateSnapshot>,
	pub guards: Checks,
	pub extras: NavigationExtras,
	/// Set once the router's current URL and state point at this
	/// navigation's target.
	pub committed: bool,
}

pub(crate) type Responder = oneshot::Sender<RouterResult<bool>>;

pub(crate) struct ScheduledNavigation {
	pub transition: NavigationTransition,
	pub responder: Responder,
}

/// How a transition left the pipeline.
pub(crate) enum Outcome {
	Settled(RouterResult<bool>),
	/// Cancelled in favour of a navigation to `tree`, which inherits the
	/// caller's pending result.
	Redirect { tree: UrlTree, extras: NavigationExtras },
	/// A newer navigation was scheduled before this one could commit.
	Superseded,
}

/// How the stages finished when nothing interrupted them.
enum Flow {
	Completed,
	/// The URL was not processed; current state was kept.
	Skipped,
	/// Cancelled by the pipeline itself after restoring history.
	Cancelled {
		code: NavigationCancellationCode,
		reason: String,
	},
	Stale,
}

struct InFlight {
	id: u64,
	url: String,
	router: Arc<RouterInner>,
	responder: Responder,
	future: BoxFuture<'static, Outcome>,
}

enum Step {
	Scheduled(Option<ScheduledNavigation>),
	Finished(Outcome),
}

/// Runs scheduled navigations one at a time, switching to the latest.
pub(crate) async fn drive(router: Weak<RouterInner>, mut rx: mpsc::UnboundedReceiver<ScheduledNavigation>) {
	let mut current: Option<InFlight> = None;
	loop {
		let step = match current.as_mut() {
			Some(in_flight) => tokio::select! {
				biased;
				next = rx.recv() => Step::Scheduled(next),
				outcome = &mut in_flight.future => Step::Finished(outcome),
			},
			None => Step::Scheduled(rx.recv().await),
		};

		match step {
			Step::Finished(outcome) => {
				if let Some(done) = current.take() {
					finish(done, outcome);
				}
			}
			Step::Scheduled(Some(scheduled)) => {
				if let Some(old) = current.take() {
					supersede(old, scheduled.transition.id);
				}
				let Some(router) = router.upgrade() else {
					let _ = scheduled.responder.send(Ok(false));
					break;
				};
				current = Some(start(router, scheduled));
			}
			Step::Scheduled(None) => {
				if let Some(mut in_flight) = current.take() {
					let outcome = (&mut in_flight.future).await;
					finish(in_flight, outcome);
				}
				break;
			}
		}
	}
	tracing::debug!("navigation driver stopped");
}

fn start(router: Arc<RouterInner>, scheduled: ScheduledNavigation) -> InFlight {
	let ScheduledNavigation { transition, responder } = scheduled;
	let id = transition.id;
	let url = router.serialize(&transition.extracted_url);
	tracing::debug!(id, %url, "navigation started");
	let future = run(router.clone(), transition).boxed();
	InFlight {
		id,
		url,
		router,
		responder,
		future,
	}
}

fn finish(in_flight: InFlight, outcome: Outcome) {
	let InFlight {
		id,
		url,
		router,
		responder,
		..
	} = in_flight;
	match outcome {
		Outcome::Settled(result) => {
			let _ = responder.send(result);
		}
		Outcome::Redirect { tree, extras } => {
			tracing::debug!(id, from = %url, to = %tree, "redirecting");
			let _ = router.schedule_navigation(tree, NavigationTrigger::Imperative, None, extras, Some(responder));
		}
		Outcome::Superseded => {
			let latest = router.latest_navigation_id();
			cancel_superseded(&router, id, url, latest, responder);
		}
	}
}

fn supersede(old: InFlight, latest: u64) {
	let InFlight {
		id,
		url,
		router,
		responder,
		future,
	} = old;
	drop(future);
	cancel_superseded(&router, id, url, latest, responder);
}

fn cancel_superseded(router: &RouterInner, id: u64, url: String, latest: u64, responder: Responder) {
	tracing::debug!(id, latest, "navigation superseded");
	router.clear_current_navigation(id);
	router.emit(Event::NavigationCancel {
		id,
		url,
		reason: format!("Navigation ID {id} is not equal to the current navigation id {latest}"),
		code: NavigationCancellationCode::SupersededByNewNavigation,
	});
	let _ = responder.send(Ok(false));
}

/// Runs one transition to its outcome.
async fn run(router: Arc<RouterInner>, mut t: NavigationTransition) -> Outcome {
	router.begin_navigation(&t);
	let result = process(&router, &mut t).await;
	let outcome = match result {
		Ok(Flow::Completed) | Ok(Flow::Skipped) => Outcome::Settled(Ok(true)),
		Ok(Flow::Stale) => Outcome::Superseded,
		Ok(Flow::Cancelled { code, reason }) => {
			tracing::warn!(id = t.id, ?code, "navigation cancelled");
			router.emit(Event::NavigationCancel {
				id: t.id,
				url: router.serialize(&t.extracted_url),
				reason,
				code,
			});
			Outcome::Settled(Ok(false))
		}
		Err(Interruption::Canceling { code, reason, redirect }) => {
			if redirect.is_none() {
				tracing::warn!(id = t.id, ?code, "navigation cancelled, restoring history");
				router.state.lock().navigated = true;
				restore_history(&router, &t, true);
			}
			router.emit(Event::NavigationCancel {
				id: t.id,
				url: router.serialize(&t.extracted_url),
				reason,
				code,
			});
			match redirect {
				None => Outcome::Settled(Ok(false)),
				Some(tree) => {
					let raw = router.state.lock().raw_url_tree.clone();
					let extras = NavigationExtras {
						skip_location_change: t.extras.skip_location_change,
						replace_url: router.options.url_update_strategy == UrlUpdateStrategy::Eager
							|| t.source.is_browser_triggered(),
						..NavigationExtras::default()
					};
					Outcome::Redirect {
						tree: router.url_handling.merge(&tree, &raw),
						extras,
					}
				}
			}
		}
		Err(Interruption::Error(error)) => {
			tracing::error!(id = t.id, %error, "navigation failed");
			restore_history(&router, &t, true);
			router.emit(Event::NavigationError {
				id: t.id,
				url: router.serialize(&t.extracted_url),
				error: error.clone(),
			});
			Outcome::Settled((router.error_handler)(error))
		}
	};
	if !matches!(outcome, Outcome::Superseded) {
		router.clear_current_navigation(t.id);
	}
	outcome
}

async fn process(router: &Arc<RouterInner>, t: &mut NavigationTransition) -> Result<Flow, Interruption> {
	let (url_transition, raw_url_tree) = {
		let state = router.state.lock();
		let browser_url = router.serialize(&state.browser_url_tree);
		let url_transition = !state.navigated
			|| router.serialize(&t.extracted_url) != browser_url
			|| browser_url != router.serialize(&state.current_url_tree);
		(url_transition, state.raw_url_tree.clone())
	};
	let on_same_url = t.extras.on_same_url_navigation.unwrap_or(router.options.on_same_url_navigation);
	let process_current =
		(on_same_url == OnSameUrlNavigation::Reload || url_transition) && router.url_handling.should_process_url(&t.raw_url);

	if process_current {
		if t.source.is_browser_triggered() {
			router.state.lock().browser_url_tree = t.extracted_url.clone();
		}
		emit_navigation_start(router, t);
		tokio::task::yield_now().await;
		recognize_stage(router, t).await?;
	} else if url_transition && router.url_handling.should_process_url(&raw_url_tree) {
		// The router hands the URL back to whatever owns it and shows an
		// empty state.
		emit_navigation_start(router, t);
		t.target_snapshot = Some(create_empty_snapshot(&t.extracted_url, router.root_component.clone()));
		t.url_after_redirects = Some(t.extracted_url.clone());
		t.extras.skip_location_change = false;
		t.extras.replace_url = false;
	} else {
		tracing::debug!(id = t.id, "same URL, navigation ignored");
		emit_navigation_start(router, t);
		let url_after_redirects = {
			let mut state = router.state.lock();
			state.raw_url_tree = t.raw_url.clone();
			router.serialize(&state.current_url_tree)
		};
		router.emit(Event::NavigationEnd {
			id: t.id,
			url: router.serialize(&t.extracted_url),
			url_after_redirects,
		});
		return Ok(Flow::Skipped);
	}

	if let Some(flow) = guards_stage(router, t).await? {
		return Ok(flow);
	}
	if let Some(flow) = resolve_stage(router, t).await? {
		return Ok(flow);
	}
	load_components(router, t).await?;

	if router.latest_navigation_id() != t.id {
		return Ok(Flow::Stale);
	}
	commit(router, t)?;
	Ok(Flow::Completed)
}

fn emit_navigation_start(router: &RouterInner, t: &NavigationTransition) {
	router.emit(Event::NavigationStart {
		id: t.id,
		url: router.serialize(&t.extracted_url),
		trigger: t.source,
		restored_state: t.restored_state.clone(),
	});
}

async fn recognize_stage(router: &Arc<RouterInner>, t: &mut NavigationTransition) -> Result<(), Interruption> {
	let config = router.config();
	let recognized = recognize(
		&config,
		t.extracted_url.clone(),
		router.serializer.as_ref(),
		&router.config_loader,
		router.root_component.clone(),
		router.options.params_inheritance_strategy,
	)
	.await?;

	let url_after_redirects = recognized.tree;
	router.record_final_url(t.id, &url_after_redirects);

	if router.options.url_update_strategy == UrlUpdateStrategy::Eager {
		if !t.extras.skip_location_change {
			let raw = router.url_handling.merge(&url_after_redirects, &t.raw_url);
			set_browser_url(router, &raw, t);
		}
		router.state.lock().browser_url_tree = url_after_redirects.clone();
	}

	let state = Arc::new(recognized.state);
	router.emit(Event::RoutesRecognized {
		id: t.id,
		url: router.serialize(&t.extracted_url),
		url_after_redirects: router.serialize(&url_after_redirects),
		state: state.clone(),
	});
	t.target_snapshot = Some(Arc::unwrap_or_clone(state));
	t.url_after_redirects = Some(url_after_redirects);
	Ok(())
}

/// Target snapshot and URLs for the events of the later stages.
fn stage_parts(router: &RouterInner, t: &NavigationTransition) -> (String, String, Arc<RouterStateSnapshot>) {
	let url = router.serialize(&t.extracted_url);
	let after = t
		.url_after_redirects
		.as_ref()
		.map(|tree| router.serialize(tree))
		.unwrap_or_else(|| url.clone());
	let state = Arc::new(t.target_snapshot.clone().unwrap_or_else(|| create_empty_snapshot(&t.extracted_url, None)));
	(url, after, state)
}

async fn guards_stage(router: &Arc<RouterInner>, t: &mut NavigationTransition) -> Result<Option<Flow>, Interruption> {
	let (url, url_after_redirects, state) = stage_parts(router, t);
	router.emit(Event::GuardsCheckStart {
		id: t.id,
		url,
		url_after_redirects,
		state,
	});

	let Some(target) = t.target_snapshot.as_mut() else {
		return Err(RouterError::other(anyhow::anyhow!("navigation {} has no target state", t.id)).into());
	};
	t.guards = get_all_route_guards(target, &t.current_snapshot, &router.root_contexts);
	let result = check_guards(target, &t.current_snapshot, &t.guards, &router.events).await?;

	if let Some(GuardResult::Redirect(tree)) = result {
		return Err(Interruption::redirect(tree));
	}
	let should_activate = result == Some(GuardResult::Allow);

	let (url, url_after_redirects, state) = stage_parts(router, t);
	router.emit(Event::GuardsCheckEnd {
		id: t.id,
		url,
		url_after_redirects,
		state,
		should_activate,
	});

	if !should_activate {
		tracing::debug!(id = t.id, "guard rejected navigation");
		restore_history(router, t, false);
		return Ok(Some(Flow::Cancelled {
			code: NavigationCancellationCode::GuardRejected,
			reason: String::new(),
		}));
	}
	Ok(None)
}

async fn resolve_stage(router: &Arc<RouterInner>, t: &mut NavigationTransition) -> Result<Option<Flow>, Interruption> {
	if t.guards.can_activate.is_empty() {
		return Ok(None);
	}
	let (url, url_after_redirects, state) = stage_parts(router, t);
	router.emit(Event::ResolveStart {
		id: t.id,
		url,
		url_after_redirects,
		state,
	});

	let Some(target) = t.target_snapshot.as_mut() else {
		return Ok(None);
	};
	match resolve_data(target, &t.guards.can_activate, router.options.params_inheritance_strategy).await? {
		ResolveOutcome::Resolved => {}
		ResolveOutcome::Redirect(tree) => return Err(Interruption::redirect(tree)),
		ResolveOutcome::Empty => {
			restore_history(router, t, false);
			return Ok(Some(Flow::Cancelled {
				code: NavigationCancellationCode::NoDataFromResolver,
				reason: "At least one route resolver didn't emit any value.".to_string(),
			}));
		}
	}

	let (url, url_after_redirects, state) = stage_parts(router, t);
	router.emit(Event::ResolveEnd {
		id: t.id,
		url,
		url_after_redirects,
		state,
	});
	Ok(None)
}

/// Loads the lazy components of every route in the target that still
/// needs one.
async fn load_components(router: &Arc<RouterInner>, t: &mut NavigationTransition) -> Result<(), Interruption> {
	let Some(target) = t.target_snapshot.as_mut() else {
		return Ok(());
	};
	let pending: Vec<(u64, Arc<Route>)> = target
		.root
		.flatten()
		.into_iter()
		.filter(|snapshot| snapshot.component.is_none())
		.filter_map(|snapshot| {
			let config = snapshot.route_config()?;
			config.component_loader()?;
			Some((snapshot.id(), config.clone()))
		})
		.collect();
	if pending.is_empty() {
		return Ok(());
	}

	let loaded = join_all(pending.iter().map(|(_, route)| router.config_loader.load_component(route))).await;
	for ((id, _), component) in pending.into_iter().zip(loaded) {
		let component = component?;
		if let Some(node) = target.node_mut(id) {
			node.value.component = Some(component);
		}
	}
	Ok(())
}

/// Points the router at the target state, writes the URL when deferred and
/// activates the routes.
fn commit(router: &Arc<RouterInner>, t: &mut NavigationTransition) -> Result<(), Interruption> {
	let (Some(target), Some(url_after_redirects)) = (t.target_snapshot.take(), t.url_after_redirects.clone()) else {
		return Err(RouterError::other(anyhow::anyhow!("navigation {} reached commit unrecognised", t.id)).into());
	};
	let target_state = create_router_state(router.reuse_strategy.as_ref(), Arc::new(target), &t.current_router_state);

	let raw_url = router.url_handling.merge(&url_after_redirects, &t.raw_url);
	{
		let mut state = router.state.lock();
		state.current_url_tree = url_after_redirects.clone();
		state.raw_url_tree = raw_url.clone();
		state.router_state = target_state.clone();
	}
	t.committed = true;

	if router.options.url_update_strategy == UrlUpdateStrategy::Deferred {
		if !t.extras.skip_location_change {
			set_browser_url(router, &raw_url, t);
		}
		router.state.lock().browser_url_tree = url_after_redirects.clone();
	}

	ActivateRoutes::new(
		router.reuse_strategy.as_ref(),
		&target_state,
		&t.current_router_state,
		&router.events,
	)
	.activate(&router.root_contexts)?;

	{
		let mut state = router.state.lock();
		state.navigated = true;
		state.last_successful_id = Some(t.id);
		state.current_page_id = t.target_page_id;
		state.last_successful_navigation = state.current_navigation.clone();
	}
	tracing::info!(id = t.id, url = %router.serialize(&url_after_redirects), "navigation completed");
	router.emit(Event::NavigationEnd {
		id: t.id,
		url: router.serialize(&t.extracted_url),
		url_after_redirects: router.serialize(&url_after_redirects),
	});
	Ok(())
}

fn router_history_state(router: &RouterInner, navigation_id: Option<u64>, page_id: i64) -> HistoryState {
	let computed = router.options.canceled_navigation_resolution == CanceledNavigationResolution::Computed;
	HistoryState {
		navigation_id,
		router_page_id: computed.then_some(page_id),
		extra: serde_json::Map::new(),
	}
}

/// Writes `url` to the location, replacing the entry when the path is
/// unchanged or the caller asked for it.
fn set_browser_url(router: &RouterInner, url: &UrlTree, t: &NavigationTransition) {
	let path = router.serialize(url);
	let mut state = router_history_state(router, Some(t.id), t.target_page_id);
	state.extra = t.extras.state.clone().unwrap_or_default();
	if router.location.is_current_path_equal_to(&path, "") || t.extras.replace_url {
		router.location.replace_state(&path, "", state);
	} else {
		router.location.go(&path, "", state);
	}
}

/// Puts the browser back where it was before a failed or cancelled
/// navigation.
fn restore_history(router: &RouterInner, t: &NavigationTransition, from_error: bool) {
	match router.options.canceled_navigation_resolution {
		CanceledNavigationResolution::Computed => {
			let current_page_id = router.state.lock().current_page_id;
			let target_page_position = current_page_id - t.target_page_id;
			let browser_url_updated = t.source == NavigationTrigger::PopState
				|| router.options.url_update_strategy == UrlUpdateStrategy::Eager
				|| t.committed;
			if browser_url_updated && target_page_position != 0 {
				router.location.history_go(target_page_position);
			} else if t.committed && target_page_position == 0 {
				reset_state(router, t);
				router.state.lock().browser_url_tree = t.current_url_tree.clone();
				reset_url_to_current_url_tree(router);
			}
		}
		CanceledNavigationResolution::Replace => {
			if from_error {
				reset_state(router, t);
			}
			reset_url_to_current_url_tree(router);
		}
	}
}

fn reset_state(router: &RouterInner, t: &NavigationTransition) {
	let mut state = router.state.lock();
	state.router_state = t.current_router_state.clone();
	state.current_url_tree = t.current_url_tree.clone();
	state.raw_url_tree = router.url_handling.merge(&t.current_url_tree, &t.raw_url);
}

fn reset_url_to_current_url_tree(router: &RouterInner) {
	let (raw_url, last_successful_id, current_page_id) = {
		let state = router.state.lock();
		(state.raw_url_tree.clone(), state.last_successful_id, state.current_page_id)
	};
	let state = router_history_state(router, last_successful_id, current_page_id);
	router.location.replace_state(&router.serialize(&raw_url), "", state);
}
