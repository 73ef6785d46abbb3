//! Running `canDeactivate`, `canActivateChild` and `canActivate` guards.

use futures::FutureExt;
use tokio::sync::broadcast;

use crate::error::{RouterError, RouterResult};
use crate::events::Event;
use crate::guards::{GuardResult, PendingGuard, pending, prioritized_guard_value};
use crate::pre_activation::{CanActivateCheck, CanDeactivateCheck, Checks};
use crate::router_state::RouterStateSnapshot;

/// Runs every check and returns the outcome of the guard phase.
///
/// Deactivation checks run first, in order. Activation checks then run one
/// route at a time from the root down, each emitting `ChildActivationStart`
/// for its parent and `ActivationStart` for itself before its guards run.
/// The first result that is not [`GuardResult::Allow`] ends the phase;
/// `None` means a guard completed without a value.
pub(crate) async fn check_guards(
	target: &RouterStateSnapshot,
	current: &RouterStateSnapshot,
	checks: &Checks,
	events: &broadcast::Sender<Event>,
) -> RouterResult<Option<GuardResult>> {
	if checks.is_empty() {
		return Ok(Some(GuardResult::Allow));
	}

	for check in &checks.can_deactivate {
		match run_can_deactivate(check, current, target).await? {
			Some(GuardResult::Allow) => {}
			other => return Ok(other),
		}
	}

	for check in &checks.can_activate {
		if let Some(parent) = target.parent(check.route_id()) {
			let _ = events.send(Event::ChildActivationStart {
				snapshot: parent.clone(),
			});
		}
		if let Some(route) = target.route(check.route_id()) {
			let _ = events.send(Event::ActivationStart {
				snapshot: route.clone(),
			});
		}

		match run_can_activate_child(target, check).await? {
			Some(GuardResult::Allow) => {}
			other => return Ok(other),
		}
		match run_can_activate(target, check).await? {
			Some(GuardResult::Allow) => {}
			other => return Ok(other),
		}
	}

	Ok(Some(GuardResult::Allow))
}

async fn run_can_deactivate(
	check: &CanDeactivateCheck,
	current: &RouterStateSnapshot,
	target: &RouterStateSnapshot,
) -> RouterResult<Option<GuardResult>> {
	let Some(config) = check.route.route_config() else {
		return Ok(Some(GuardResult::Allow));
	};
	let guards = config.can_deactivate_guards();
	if guards.is_empty() {
		return Ok(Some(GuardResult::Allow));
	}
	let pending_guards = guards
		.iter()
		.map(|guard| pending(guard(check.component.as_ref(), &check.route, current, target)))
		.collect();
	prioritized_guard_value(pending_guards).await.map_err(RouterError::guard)
}

async fn run_can_activate(target: &RouterStateSnapshot, check: &CanActivateCheck) -> RouterResult<Option<GuardResult>> {
	let Some(route) = target.route(check.route_id()) else {
		return Ok(Some(GuardResult::Allow));
	};
	let guards = route.route_config().map(|c| c.can_activate_guards()).unwrap_or_default();
	if guards.is_empty() {
		return Ok(Some(GuardResult::Allow));
	}
	let pending_guards = guards.iter().map(|guard| pending(guard(route, target))).collect();
	prioritized_guard_value(pending_guards).await.map_err(RouterError::guard)
}

/// Ancestors' `canActivateChild` guards, nearest ancestor first. Every
/// guard receives the route being activated.
async fn run_can_activate_child(
	target: &RouterStateSnapshot,
	check: &CanActivateCheck,
) -> RouterResult<Option<GuardResult>> {
	let Some(route) = target.route(check.route_id()) else {
		return Ok(Some(GuardResult::Allow));
	};
	let ancestors = &check.path[..check.path.len().saturating_sub(1)];

	let groups: Vec<PendingGuard> = ancestors
		.iter()
		.rev()
		.filter_map(|id| target.route(*id)?.route_config().cloned())
		.filter(|config| !config.can_activate_child_guards().is_empty())
		.map(|config| {
			let group: Vec<PendingGuard> = config
				.can_activate_child_guards()
				.iter()
				.map(|guard| pending(guard(route, target)))
				.collect();
			prioritized_guard_value(group).boxed()
		})
		.collect();

	if groups.is_empty() {
		return Ok(Some(GuardResult::Allow));
	}
	prioritized_guard_value(groups).await.map_err(RouterError::guard)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{ComponentId, Data, Route};
	use crate::guards::MaybeAsync;
	use crate::outlet::ChildrenOutletContexts;
	use crate::pre_activation::get_all_route_guards;
	use crate::router_state::{ActivatedRouteSnapshot, TreeNode, root_snapshot};
	use crate::url_tree::{Params, QueryParams, UrlSegment, UrlTree};
	use parking_lot::Mutex;
	use rstest::{fixture, rstest};
	use std::sync::Arc;

	type Log = Arc<Mutex<Vec<String>>>;

	#[fixture]
	fn log() -> Log {
		Arc::new(Mutex::new(Vec::new()))
	}

	fn snap(route: &Arc<Route>) -> ActivatedRouteSnapshot {
		ActivatedRouteSnapshot::new(
			vec![UrlSegment::path(route.path_or_empty())],
			Params::new(),
			QueryParams::new(),
			None,
			Data::new(),
			"primary",
			route.component_id(),
			Some(route.clone()),
		)
	}

	/// A single chain of routes below the root.
	fn chain(routes: &[Arc<Route>]) -> RouterStateSnapshot {
		let mut node: Option<TreeNode<ActivatedRouteSnapshot>> = None;
		for route in routes.iter().rev() {
			node = Some(TreeNode::new(snap(route), node.into_iter().collect()));
		}
		let root = root_snapshot(&UrlTree::root_url(), Some(ComponentId::from("App")));
		RouterStateSnapshot::new("", TreeNode::new(root, node.into_iter().collect()))
	}

	fn logged(name: &str, log: &Log, result: bool) -> Route {
		let (a, d) = (log.clone(), log.clone());
		let (an, dn) = (name.to_string(), name.to_string());
		Route::new(name.to_lowercase())
			.component(name)
			.can_activate(move |_, _| {
				a.lock().push(format!("activate {an}"));
				result.into()
			})
			.can_deactivate(move |_, _, _, _| {
				d.lock().push(format!("deactivate {dn}"));
				true.into()
			})
	}

	async fn run(current: &RouterStateSnapshot, target: &mut RouterStateSnapshot) -> (RouterResult<Option<GuardResult>>, Vec<Event>) {
		let (tx, mut rx) = broadcast::channel(64);
		let checks = get_all_route_guards(target, current, &ChildrenOutletContexts::new());
		let result = check_guards(target, current, &checks, &tx).await;
		let mut events = Vec::new();
		while let Ok(event) = rx.try_recv() {
			events.push(event);
		}
		(result, events)
	}

	#[rstest]
	#[tokio::test]
	async fn test_deactivate_descendants_first_then_activate_ancestors_first(log: Log) {
		let (a, b, c) = (logged("A", &log, true), logged("B", &log, true), logged("C", &log, true));
		let (d, e, f) = (logged("D", &log, true), logged("E", &log, true), logged("F", &log, true));
		let current = chain(&[Arc::new(a), Arc::new(b), Arc::new(c)]);
		let mut target = chain(&[Arc::new(d), Arc::new(e), Arc::new(f)]);

		let (result, events) = run(&current, &mut target).await;
		assert_eq!(result.unwrap(), Some(GuardResult::Allow));
		assert_eq!(
			*log.lock(),
			vec![
				"deactivate C",
				"deactivate B",
				"deactivate A",
				"activate D",
				"activate E",
				"activate F"
			]
		);
		let kinds: Vec<&str> = events.iter().map(Event::kind).collect();
		assert_eq!(
			kinds,
			vec![
				"ChildActivationStart",
				"ActivationStart",
				"ChildActivationStart",
				"ActivationStart",
				"ChildActivationStart",
				"ActivationStart"
			]
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_rejection_stops_later_checks(log: Log) {
		let d = Arc::new(logged("D", &log, false));
		let e = Arc::new(logged("E", &log, true));
		let current = chain(&[]);
		let mut target = chain(&[d, e]);

		let (result, events) = run(&current, &mut target).await;
		assert_eq!(result.unwrap(), Some(GuardResult::Deny));
		assert_eq!(*log.lock(), vec!["activate D"]);
		assert_eq!(events.len(), 2);
	}

	#[rstest]
	#[tokio::test]
	async fn test_can_activate_child_sees_the_child(log: Log) {
		let seen = log.clone();
		let parent = Arc::new(Route::new("p").component("P").can_activate_child(move |child, _| {
			seen.lock().push(child.route_path().to_string());
			true.into()
		}));
		let child = Arc::new(Route::new("c").component("C"));
		let (result, _) = run(&chain(&[]), &mut chain(&[parent, child])).await;
		assert_eq!(result.unwrap(), Some(GuardResult::Allow));
		assert_eq!(*log.lock(), vec!["c"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_redirect_result_is_returned() {
		let target_url = UrlTree::root_url();
		let redirect = target_url.clone();
		let route = Arc::new(Route::new("a").component("A").can_activate(move |_, _| redirect.clone().into()));
		let (result, _) = run(&chain(&[]), &mut chain(&[route])).await;
		assert_eq!(result.unwrap(), Some(GuardResult::Redirect(target_url)));
	}

	// A guard that completes without a value cancels rather than fails.
	#[rstest]
	#[tokio::test]
	async fn test_empty_guard_yields_none() {
		let route = Arc::new(Route::new("a").component("A").can_activate(|_, _| MaybeAsync::empty()));
		let (result, _) = run(&chain(&[]), &mut chain(&[route])).await;
		assert_eq!(result.unwrap(), None);
	}

	#[rstest]
	#[tokio::test]
	async fn test_guard_error_is_a_router_error() {
		let route = Arc::new(
			Route::new("a")
				.component("A")
				.can_activate(|_, _| MaybeAsync::error(anyhow::anyhow!("boom"))),
		);
		let (result, _) = run(&chain(&[]), &mut chain(&[route])).await;
		assert_eq!(result.unwrap_err().to_string(), "Guard failed: boom");
	}
}
