//! Running route resolvers.

use std::collections::HashSet;

use futures::future::join_all;

use crate::config::Data;
use crate::error::{RouterError, RouterResult};
use crate::guards::{ResolvedValue, first_value};
use crate::options::ParamsInheritanceStrategy;
use crate::pre_activation::CanActivateCheck;
use crate::router_state::{RouterStateSnapshot, get_inherited};
use crate::url_tree::UrlTree;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResolveOutcome {
	Resolved,
	/// At least one resolver completed without a value.
	Empty,
	Redirect(UrlTree),
}

/// Runs the resolvers of the routes being activated and refreshes the data
/// of every route in their subtrees.
///
/// Routes are processed one at a time from the root down so a resolver can
/// read what its ancestors resolved. The resolvers of a single route run
/// concurrently.
pub(crate) async fn resolve_data(
	target: &mut RouterStateSnapshot,
	checks: &[CanActivateCheck],
	strategy: ParamsInheritanceStrategy,
) -> RouterResult<ResolveOutcome> {
	let with_resolvers: HashSet<u64> = checks.iter().map(CanActivateCheck::route_id).collect();
	let mut seen = HashSet::new();
	let mut needing_update = Vec::new();
	for check in checks {
		if seen.contains(&check.route_id()) {
			continue;
		}
		let Some(node) = target.node(check.route_id()) else {
			continue;
		};
		for route in node.flatten() {
			if seen.insert(route.id()) {
				needing_update.push(route.id());
			}
		}
	}

	for id in needing_update {
		if with_resolvers.contains(&id) {
			match run_resolve(target, id).await? {
				NodeResolution::Data(resolved) => {
					if let Some(node) = target.node_mut(id) {
						node.value.resolved_data = resolved;
					}
				}
				NodeResolution::Empty => return Ok(ResolveOutcome::Empty),
				NodeResolution::Redirect(tree) => return Ok(ResolveOutcome::Redirect(tree)),
			}
		}
		refresh_data(target, id, strategy);
	}
	Ok(ResolveOutcome::Resolved)
}

enum NodeResolution {
	Data(Data),
	Empty,
	Redirect(UrlTree),
}

/// Resolves every key of one route.
async fn run_resolve(target: &RouterStateSnapshot, id: u64) -> RouterResult<NodeResolution> {
	let Some(config) = target.route(id).and_then(|r| r.route_config()) else {
		return Ok(NodeResolution::Data(Data::new()));
	};
	let Some(route) = target.route(id).filter(|_| !config.resolvers().is_empty()) else {
		return Ok(NodeResolution::Data(Data::new()));
	};

	tracing::debug!(route = route.route_path(), keys = config.resolvers().len(), "running resolvers");
	let keys: Vec<String> = config.resolvers().keys().cloned().collect();
	let pending = config
		.resolvers()
		.values()
		.map(|resolver| first_value(resolver(route, target)));
	let results = join_all(pending).await;

	let mut data = Data::new();
	let mut emitted_all = true;
	for (key, result) in keys.into_iter().zip(results) {
		match result.map_err(|error| RouterError::resolver(key.clone(), error))? {
			Some(ResolvedValue::Data(value)) => {
				data.insert(key, value);
			}
			Some(ResolvedValue::Redirect(tree)) => return Ok(NodeResolution::Redirect(tree)),
			None => emitted_all = false,
		}
	}
	Ok(if emitted_all {
		NodeResolution::Data(data)
	} else {
		NodeResolution::Empty
	})
}

fn refresh_data(target: &mut RouterStateSnapshot, id: u64, strategy: ParamsInheritanceStrategy) {
	let Some(route) = target.route(id) else {
		return;
	};
	let data = get_inherited(route, target.parent(id), strategy).resolve;
	if let Some(node) = target.node_mut(id) {
		node.value.data = data;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{ComponentId, Route};
	use crate::guards::MaybeAsync;
	use crate::outlet::ChildrenOutletContexts;
	use crate::pre_activation::get_all_route_guards;
	use crate::router_state::{ActivatedRouteSnapshot, TreeNode, create_empty_snapshot, root_snapshot};
	use crate::url_tree::{Params, QueryParams, UrlSegment};
	use rstest::rstest;
	use serde_json::json;
	use std::sync::Arc;

	fn chain(routes: Vec<Route>) -> RouterStateSnapshot {
		let mut node: Option<TreeNode<ActivatedRouteSnapshot>> = None;
		for route in routes.into_iter().rev() {
			let route = Arc::new(route);
			let snapshot = ActivatedRouteSnapshot::new(
				vec![UrlSegment::path(route.path_or_empty())],
				Params::new(),
				QueryParams::new(),
				None,
				route.static_data().clone(),
				"primary",
				route.component_id(),
				Some(route.clone()),
			);
			node = Some(TreeNode::new(snapshot, node.into_iter().collect()));
		}
		let root = root_snapshot(&UrlTree::root_url(), Some(ComponentId::from("App")));
		RouterStateSnapshot::new("", TreeNode::new(root, node.into_iter().collect()))
	}

	async fn resolve(routes: Vec<Route>, strategy: ParamsInheritanceStrategy) -> (RouterResult<ResolveOutcome>, RouterStateSnapshot) {
		let mut target = chain(routes);
		let current = create_empty_snapshot(&UrlTree::root_url(), None);
		let checks = get_all_route_guards(&mut target, &current, &ChildrenOutletContexts::new());
		let outcome = resolve_data(&mut target, &checks.can_activate, strategy).await;
		(outcome, target)
	}

	#[rstest]
	#[tokio::test]
	async fn test_resolved_values_land_in_data() {
		let routes = vec![Route::new("a")
			.component("A")
			.data("static", json!(true))
			.resolve("user", |_, _| json!({"name": "ferris"}).into())];
		let (outcome, target) = resolve(routes, ParamsInheritanceStrategy::EmptyOnly).await;
		assert_eq!(outcome.unwrap(), ResolveOutcome::Resolved);
		let a = target.leaf();
		assert_eq!(a.data.get("user"), Some(&json!({"name": "ferris"})));
		assert_eq!(a.data.get("static"), Some(&json!(true)));
	}

	#[rstest]
	#[tokio::test]
	async fn test_child_resolver_reads_parent_data() {
		let routes = vec![
			Route::new("team").component("Team").resolve("team", |_, _| json!("rust").into()),
			Route::new("").component("Home").resolve("greeting", |route: &ActivatedRouteSnapshot, state: &RouterStateSnapshot| {
				let team = state.parent(route.id()).and_then(|p| p.data.get("team").cloned());
				json!(format!("hello {}", team.and_then(|t| t.as_str().map(str::to_string)).unwrap_or_default())).into()
			}),
		];
		let (outcome, target) = resolve(routes, ParamsInheritanceStrategy::EmptyOnly).await;
		assert_eq!(outcome.unwrap(), ResolveOutcome::Resolved);
		let leaf = target.leaf();
		assert_eq!(leaf.data.get("greeting"), Some(&json!("hello rust")));
		// Empty-path children inherit their parent's data.
		assert_eq!(leaf.data.get("team"), Some(&json!("rust")));
	}

	// A resolver that emits nothing cancels the navigation.
	#[rstest]
	#[tokio::test]
	async fn test_empty_resolver() {
		let routes = vec![Route::new("a").component("A").resolve("x", |_, _| MaybeAsync::empty())];
		let (outcome, _) = resolve(routes, ParamsInheritanceStrategy::EmptyOnly).await;
		assert_eq!(outcome.unwrap(), ResolveOutcome::Empty);
	}

	#[rstest]
	#[tokio::test]
	async fn test_resolver_error() {
		let routes = vec![Route::new("a")
			.component("A")
			.resolve("x", |_, _| MaybeAsync::error(anyhow::anyhow!("boom")))];
		let (outcome, _) = resolve(routes, ParamsInheritanceStrategy::EmptyOnly).await;
		assert_eq!(outcome.unwrap_err().to_string(), "Resolver for 'x' failed: boom");
	}

	#[rstest]
	#[tokio::test]
	async fn test_resolver_redirect() {
		let routes = vec![Route::new("a")
			.component("A")
			.resolve("x", |_, _| MaybeAsync::ready(ResolvedValue::Redirect(UrlTree::root_url())))];
		let (outcome, _) = resolve(routes, ParamsInheritanceStrategy::EmptyOnly).await;
		assert_eq!(outcome.unwrap(), ResolveOutcome::Redirect(UrlTree::root_url()));
	}
}
