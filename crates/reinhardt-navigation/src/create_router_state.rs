//! Building the live [`RouterState`] for a recognised snapshot.

use std::sync::Arc;

use crate::reuse_strategy::RouteReuseStrategy;
use crate::router_state::{ActivatedRoute, ActivatedRouteSnapshot, RouterState, RouterStateSnapshot, TreeNode};

type LiveNode = TreeNode<Arc<ActivatedRoute>>;

/// Creates the next state, keeping the live routes the strategy allows to be
/// reused and re-attaching stored subtrees where it asks for them.
pub(crate) fn create_router_state(
	strategy: &dyn RouteReuseStrategy,
	curr: Arc<RouterStateSnapshot>,
	prev: &RouterState,
) -> Arc<RouterState> {
	let root = create_node(strategy, &curr.root, Some(prev.root_node()));
	RouterState::new_arc(root, curr)
}

fn create_node(
	strategy: &dyn RouteReuseStrategy,
	curr: &TreeNode<ActivatedRouteSnapshot>,
	prev: Option<&LiveNode>,
) -> LiveNode {
	if let Some(prev) = prev.filter(|p| strategy.should_reuse_route(&curr.value, &p.value.snapshot())) {
		let value = prev.value.clone();
		value.set_future_snapshot(curr.value.clone());
		let children = create_or_reuse_children(strategy, curr, prev);
		return TreeNode::new(value, children);
	}

	if strategy.should_attach(&curr.value)
		&& let Some(handle) = strategy.retrieve(&curr.value)
	{
		let mut tree = handle.route;
		tree.value.set_future_snapshot(curr.value.clone());
		tree.children = curr.children.iter().map(|c| create_node(strategy, c, None)).collect();
		return tree;
	}

	let value = ActivatedRoute::from_snapshot(curr.value.clone());
	let children = curr.children.iter().map(|c| create_node(strategy, c, None)).collect();
	TreeNode::new(value, children)
}

fn create_or_reuse_children(
	strategy: &dyn RouteReuseStrategy,
	curr: &TreeNode<ActivatedRouteSnapshot>,
	prev: &LiveNode,
) -> Vec<LiveNode> {
	curr.children
		.iter()
		.map(|child| {
			let reusable = prev
				.children
				.iter()
				.find(|p| strategy.should_reuse_route(&child.value, &p.value.snapshot()));
			create_node(strategy, child, reusable)
		})
		.collect()
}
