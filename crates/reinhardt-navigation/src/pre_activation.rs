//! Working out which guards and resolvers a navigation has to run.
//!
//! The future and the current state trees are walked side by side. A node
//! matched by the same route config in both is retained; its guards and
//! resolvers run again only when its `runGuardsAndResolvers` mode says so,
//! otherwise it keeps its current data. Every current node that is not
//! retained needs a deactivation check, children before their parents.

use indexmap::IndexMap;

use crate::config::RunGuardsAndResolvers;
use crate::outlet::{ChildrenOutletContexts, ComponentRef, OutletContext};
use crate::router_state::{ActivatedRouteSnapshot, RouterStateSnapshot, TreeNode};
use crate::url_tree::{UrlSegment, equal_path, equal_query_params};

type Node = TreeNode<ActivatedRouteSnapshot>;

/// A route to activate, addressed by the snapshot ids from the root down.
#[derive(Debug, Clone)]
pub(crate) struct CanActivateCheck {
	pub path: Vec<u64>,
}

impl CanActivateCheck {
	pub(crate) fn route_id(&self) -> u64 {
		self.path.last().copied().unwrap_or_default()
	}
}

/// A current route that is about to be left.
#[derive(Clone)]
pub(crate) struct CanDeactivateCheck {
	pub component: Option<ComponentRef>,
	pub route: ActivatedRouteSnapshot,
}

#[derive(Default, Clone)]
pub(crate) struct Checks {
	pub can_activate: Vec<CanActivateCheck>,
	pub can_deactivate: Vec<CanDeactivateCheck>,
}

impl Checks {
	pub(crate) fn is_empty(&self) -> bool {
		self.can_activate.is_empty() && self.can_deactivate.is_empty()
	}
}

/// Computes the checks, copying current data onto retained future nodes
/// that do not re-run.
pub(crate) fn get_all_route_guards(
	future: &mut RouterStateSnapshot,
	curr: &RouterStateSnapshot,
	contexts: &ChildrenOutletContexts,
) -> Checks {
	let mut checks = Checks::default();
	let mut path = vec![future.root.value.id];
	get_child_route_guards(
		&mut future.root,
		Some(&curr.root),
		Some(contexts),
		&mut path,
		true,
		&mut checks,
	);
	checks
}

fn get_child_route_guards(
	future_node: &mut Node,
	curr_node: Option<&Node>,
	contexts: Option<&ChildrenOutletContexts>,
	future_path: &mut Vec<u64>,
	ancestors_equal: bool,
	checks: &mut Checks,
) {
	let mut previous: IndexMap<String, &Node> = curr_node.map(TreeNode::children_by_outlet).unwrap_or_default();

	for child in &mut future_node.children {
		let outlet = child.value.outlet.clone();
		future_path.push(child.value.id);
		get_route_guards(
			child,
			previous.get(&outlet).copied(),
			contexts,
			future_path,
			ancestors_equal,
			checks,
		);
		future_path.pop();
		previous.shift_remove(&outlet);
	}

	for (outlet, node) in previous {
		let context = contexts.and_then(|c| c.get_context(&outlet));
		deactivate_route_and_its_children(node, context.as_deref(), checks);
	}
}

fn get_route_guards(
	future_node: &mut Node,
	curr_node: Option<&Node>,
	parent_contexts: Option<&ChildrenOutletContexts>,
	future_path: &mut Vec<u64>,
	ancestors_equal: bool,
	checks: &mut Checks,
) {
	let context = parent_contexts.and_then(|c| c.get_context(&future_node.value.outlet));
	let has_component = future_node.value.component.is_some();

	match curr_node.filter(|curr| curr.value.same_config(&future_node.value)) {
		Some(curr_node) => {
			let curr = &curr_node.value;
			let locally_equal = equal_params_and_url_segments(curr, &future_node.value);
			let should_run = should_run_guards_and_resolvers(
				curr,
				&future_node.value,
				ancestors_equal && locally_equal,
			);
			if should_run {
				checks.can_activate.push(CanActivateCheck {
					path: future_path.clone(),
				});
			} else {
				future_node.value.data = curr.data.clone();
				future_node.value.resolved_data = curr.resolved_data.clone();
			}

			let child_contexts = if has_component {
				context.as_ref().map(|c| c.children())
			} else {
				parent_contexts
			};
			get_child_route_guards(
				future_node,
				Some(curr_node),
				child_contexts,
				future_path,
				ancestors_equal && locally_equal,
				checks,
			);

			if should_run
				&& let Some(outlet) = context.as_ref().and_then(|c| c.outlet()).filter(|o| o.is_activated())
			{
				checks.can_deactivate.push(CanDeactivateCheck {
					component: outlet.component(),
					route: curr.clone(),
				});
			}
		}
		None => {
			if let Some(curr_node) = curr_node {
				deactivate_route_and_its_children(curr_node, context.as_deref(), checks);
			}
			checks.can_activate.push(CanActivateCheck {
				path: future_path.clone(),
			});
			let child_contexts = if has_component {
				context.as_ref().map(|c| c.children())
			} else {
				parent_contexts
			};
			get_child_route_guards(future_node, None, child_contexts, future_path, false, checks);
		}
	}
}

fn should_run_guards_and_resolvers(
	curr: &ActivatedRouteSnapshot,
	future: &ActivatedRouteSnapshot,
	params_and_segments_equal: bool,
) -> bool {
	let mode = future
		.route_config()
		.map(|c| c.run_guards_and_resolvers_mode().clone())
		.unwrap_or_default();
	match mode {
		RunGuardsAndResolvers::Custom(predicate) => predicate(curr, future),
		RunGuardsAndResolvers::PathParamsChange => !equal_path(&curr.url, &future.url),
		RunGuardsAndResolvers::PathParamsOrQueryParamsChange => {
			!equal_path(&curr.url, &future.url) || !equal_query_params(&curr.query_params, &future.query_params)
		}
		RunGuardsAndResolvers::Always => true,
		RunGuardsAndResolvers::ParamsOrQueryParamsChange => {
			!params_and_segments_equal || !equal_query_params(&curr.query_params, &future.query_params)
		}
		RunGuardsAndResolvers::ParamsChange => !params_and_segments_equal,
	}
}

/// Params and segments of the two routes, ignoring ancestors.
fn equal_params_and_url_segments(a: &ActivatedRouteSnapshot, b: &ActivatedRouteSnapshot) -> bool {
	a.params == b.params && equal_segments(&a.url, &b.url)
}

fn equal_segments(a: &[UrlSegment], b: &[UrlSegment]) -> bool {
	equal_path(a, b) && a.iter().zip(b).all(|(x, y)| x.parameters == y.parameters)
}

fn deactivate_route_and_its_children(route: &Node, context: Option<&OutletContext>, checks: &mut Checks) {
	let snapshot = &route.value;
	for (outlet, child) in route.children_by_outlet() {
		if snapshot.component.is_none() {
			deactivate_route_and_its_children(child, context, checks);
		} else {
			let child_context = context.and_then(|c| c.children().get_context(&outlet));
			deactivate_route_and_its_children(child, child_context.as_deref(), checks);
		}
	}

	let component = match (&snapshot.component, context) {
		(Some(_), Some(context)) => context.active_component(),
		_ => None,
	};
	checks.can_deactivate.push(CanDeactivateCheck {
		component,
		route: snapshot.clone(),
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{ComponentId, Data, Route};
	use crate::url_tree::{Params, QueryParams, UrlTree};
	use rstest::rstest;
	use std::sync::Arc;

	fn snap(route: &Arc<Route>, url: &[&str], params: &[(&str, &str)]) -> ActivatedRouteSnapshot {
		ActivatedRouteSnapshot::new(
			url.iter().map(|s| UrlSegment::path(*s)).collect(),
			params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<Params>(),
			QueryParams::new(),
			None,
			Data::new(),
			"primary",
			route.component_id(),
			Some(route.clone()),
		)
	}

	fn state(children: Vec<Node>) -> RouterStateSnapshot {
		let root = crate::router_state::root_snapshot(&UrlTree::root_url(), Some(ComponentId::from("App")));
		RouterStateSnapshot::new("", TreeNode::new(root, children))
	}

	fn always(_: &ActivatedRouteSnapshot, _: &ActivatedRouteSnapshot) -> bool {
		true
	}

	fn leaf(value: ActivatedRouteSnapshot) -> Node {
		TreeNode::new(value, Vec::new())
	}

	fn paths_of(future: &RouterStateSnapshot, checks: &Checks) -> Vec<String> {
		checks
			.can_activate
			.iter()
			.map(|c| future.route(c.route_id()).map(|s| s.route_path().to_string()).unwrap_or_default())
			.collect()
	}

	#[rstest]
	fn test_retained_parent_keeps_data_and_new_child_is_checked() {
		let a = Arc::new(Route::new("a").component("A"));
		let b = Arc::new(Route::new("b").component("B"));
		let c = Arc::new(Route::new("c").component("C"));

		let mut curr_a = snap(&a, &["a"], &[]);
		curr_a.data.insert("k".into(), serde_json::json!(1));
		let curr = state(vec![TreeNode::new(curr_a, vec![leaf(snap(&b, &["b"], &[]))])]);
		let mut future = state(vec![TreeNode::new(snap(&a, &["a"], &[]), vec![leaf(snap(&c, &["c"], &[]))])]);

		let checks = get_all_route_guards(&mut future, &curr, &ChildrenOutletContexts::new());
		assert_eq!(paths_of(&future, &checks), vec!["c"]);
		assert_eq!(checks.can_deactivate.len(), 1);
		assert_eq!(checks.can_deactivate[0].route.route_path(), "b");
		assert_eq!(future.root.children[0].value.data.get("k"), Some(&serde_json::json!(1)));
	}

	#[rstest]
	fn test_parent_param_change_reruns_children() {
		let team = Arc::new(Route::new("team/:id").component("Team"));
		let user = Arc::new(Route::new("user").component("User"));
		let curr = state(vec![TreeNode::new(
			snap(&team, &["team", "1"], &[("id", "1")]),
			vec![leaf(snap(&user, &["user"], &[]))],
		)]);
		let mut future = state(vec![TreeNode::new(
			snap(&team, &["team", "2"], &[("id", "2")]),
			vec![leaf(snap(&user, &["user"], &[]))],
		)]);

		let checks = get_all_route_guards(&mut future, &curr, &ChildrenOutletContexts::new());
		assert_eq!(paths_of(&future, &checks), vec!["team/:id", "user"]);
		assert!(checks.can_deactivate.is_empty());
	}

	#[rstest]
	#[case(RunGuardsAndResolvers::Always, 1)]
	#[case(RunGuardsAndResolvers::ParamsChange, 0)]
	#[case(RunGuardsAndResolvers::Custom(Arc::new(always)), 1)]
	fn test_run_guards_and_resolvers_modes(#[case] mode: RunGuardsAndResolvers, #[case] expected: usize) {
		let a = Arc::new(Route::new("a").component("A").run_guards_and_resolvers(mode));
		let curr = state(vec![leaf(snap(&a, &["a"], &[]))]);
		let mut future = state(vec![leaf(snap(&a, &["a"], &[]))]);
		let checks = get_all_route_guards(&mut future, &curr, &ChildrenOutletContexts::new());
		assert_eq!(checks.can_activate.len(), expected);
	}

	#[rstest]
	fn test_deactivation_is_children_first() {
		let a = Arc::new(Route::new("a").component("A"));
		let b = Arc::new(Route::new("b").component("B"));
		let c = Arc::new(Route::new("c").component("C"));
		let x = Arc::new(Route::new("x").component("X"));
		let curr = state(vec![TreeNode::new(
			snap(&a, &["a"], &[]),
			vec![TreeNode::new(snap(&b, &["b"], &[]), vec![leaf(snap(&c, &["c"], &[]))])],
		)]);
		let mut future = state(vec![leaf(snap(&x, &["x"], &[]))]);

		let checks = get_all_route_guards(&mut future, &curr, &ChildrenOutletContexts::new());
		let order: Vec<&str> = checks.can_deactivate.iter().map(|c| c.route.route_path()).collect();
		assert_eq!(order, vec!["c", "b", "a"]);
		assert_eq!(paths_of(&future, &checks), vec!["x"]);
	}
}
