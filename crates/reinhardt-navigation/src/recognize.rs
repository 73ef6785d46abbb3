//! Matching a URL tree against the route configuration.
//!
//! Recognition walks the segment groups of the URL and the route config in
//! parallel, trying sibling routes in order and backtracking on a miss.
//! Redirects are expanded as they are met: a relative redirect re-matches
//! the rewritten segments against the same siblings (without following a
//! second redirect), an absolute one restarts recognition from the root.
//! Lazy children are loaded on demand once `canLoad` allows it.

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{ComponentId, PathMatch, Route, Routes, UrlMatchResult};
use crate::config_loader::RouterConfigLoader;
use crate::create_url_tree::create_url_tree_from_snapshot;
use crate::error::{Interruption, RouterError};
use crate::events::NavigationCancellationCode;
use crate::guards::{GuardResult, pending, prioritized_guard_value};
use crate::options::ParamsInheritanceStrategy;
use crate::redirects::{apply_redirect_commands, lineralize_segments};
use crate::router_state::{
	ActivatedRouteSnapshot, RouterStateSnapshot, TreeNode, inherit_params_and_data, root_snapshot,
};
use crate::url_serializer::{UrlSerializer, serialize_path, serialize_paths};
use crate::url_tree::{PRIMARY_OUTLET, Params, UrlSegment, UrlSegmentGroup, UrlTree};

/// Absolute redirects followed before recognition gives up.
const MAX_ALLOWED_REDIRECTS: usize = 31;

type Node = TreeNode<ActivatedRouteSnapshot>;

enum MatchError {
	/// Nothing matched the group. Siblings are tried next.
	NoMatch(String),
	/// Restart from the root with this tree.
	AbsoluteRedirect(UrlTree),
	Interrupt(Interruption),
}

impl From<RouterError> for MatchError {
	fn from(error: RouterError) -> Self {
		Self::Interrupt(Interruption::Error(error))
	}
}

impl From<Interruption> for MatchError {
	fn from(interruption: Interruption) -> Self {
		Self::Interrupt(interruption)
	}
}

type MatchResult<T> = Result<T, MatchError>;

fn no_match(group: &UrlSegmentGroup) -> MatchError {
	MatchError::NoMatch(serialize_paths(group))
}

/// The outcome of recognising a URL.
pub(crate) struct Recognized {
	pub state: RouterStateSnapshot,
	/// The URL after redirects.
	pub tree: UrlTree,
}

/// Recognises `url_tree` against `config`.
pub(crate) async fn recognize(
	config: &[Arc<Route>],
	url_tree: UrlTree,
	serializer: &dyn UrlSerializer,
	loader: &RouterConfigLoader,
	root_component: Option<ComponentId>,
	strategy: ParamsInheritanceStrategy,
) -> Result<Recognized, Interruption> {
	let recognizer = Recognizer {
		config,
		serializer,
		loader,
		url_tree: Mutex::new(url_tree),
		absolute_redirect_count: AtomicUsize::new(0),
	};
	recognizer.recognize(root_component, strategy).await
}

struct Recognizer<'r> {
	config: &'r [Arc<Route>],
	serializer: &'r dyn UrlSerializer,
	loader: &'r RouterConfigLoader,
	url_tree: Mutex<UrlTree>,
	absolute_redirect_count: AtomicUsize,
}

/// A successful path match.
struct RouteMatch {
	consumed: Vec<UrlSegment>,
	remaining: Vec<UrlSegment>,
	parameters: Params,
	pos_params: IndexMap<String, UrlSegment>,
}

impl Recognizer<'_> {
	fn current_tree(&self) -> UrlTree {
		self.url_tree.lock().clone()
	}

	async fn recognize(
		&self,
		root_component: Option<ComponentId>,
		strategy: ParamsInheritanceStrategy,
	) -> Result<Recognized, Interruption> {
		let (root_group, _) = split(&self.current_tree().root, &[], &[], self.config);
		let children = self.match_root(root_group).await?;

		let url_tree = self.current_tree();
		let root = root_snapshot(&url_tree, root_component);
		let mut state = RouterStateSnapshot::new(String::new(), TreeNode::new(root, children));
		let tree = create_url_tree_from_snapshot(
			&state,
			&state.root.value,
			&[],
			url_tree.query_params.clone(),
			url_tree.fragment.clone(),
		)?;
		state.url = self.serializer.serialize(&tree);
		inherit_params_and_data(&mut state.root, None, strategy);
		Ok(Recognized { state, tree })
	}

	async fn match_root(&self, mut group: UrlSegmentGroup) -> Result<Vec<Node>, Interruption> {
		loop {
			match self.process_segment_group(self.config, &group, PRIMARY_OUTLET).await {
				Ok(children) => return Ok(children),
				Err(MatchError::AbsoluteRedirect(tree)) => {
					tracing::debug!(url = %self.serializer.serialize(&tree), "absolute redirect");
					group = tree.root.clone();
					*self.url_tree.lock() = tree;
				}
				Err(MatchError::NoMatch(segment)) => return Err(RouterError::NoMatch(segment).into()),
				Err(MatchError::Interrupt(interruption)) => return Err(interruption),
			}
		}
	}

	fn process_segment_group<'a>(
		&'a self,
		config: &'a [Arc<Route>],
		group: &'a UrlSegmentGroup,
		outlet: &'a str,
	) -> BoxFuture<'a, MatchResult<Vec<Node>>> {
		async move {
			if group.segments.is_empty() && group.has_children() {
				return self.process_children(config, group).await;
			}
			self.process_segment(config, group, &group.segments, outlet, true).await
		}
		.boxed()
	}

	fn process_children<'a>(
		&'a self,
		config: &'a [Arc<Route>],
		group: &'a UrlSegmentGroup,
	) -> BoxFuture<'a, MatchResult<Vec<Node>>> {
		async move {
			if !group.has_children() {
				return Err(no_match(group));
			}
			let mut outlets: Vec<&String> = group.children.keys().collect();
			outlets.sort_by_key(|outlet| outlet.as_str() != PRIMARY_OUTLET);

			let mut children = Vec::new();
			for outlet in outlets {
				let child = &group.children[outlet];
				let sorted = sort_by_matching_outlets(config, outlet);
				children.extend(self.process_segment_group(&sorted, child, outlet).await?);
			}
			let mut merged = merge_empty_path_matches(children);
			check_outlet_name_uniqueness(&merged)?;
			merged.sort_by_key(|node| (node.value.outlet != PRIMARY_OUTLET, node.value.outlet.clone()));
			Ok(merged)
		}
		.boxed()
	}

	fn process_segment<'a>(
		&'a self,
		routes: &'a [Arc<Route>],
		group: &'a UrlSegmentGroup,
		segments: &'a [UrlSegment],
		outlet: &'a str,
		allow_redirects: bool,
	) -> BoxFuture<'a, MatchResult<Vec<Node>>> {
		async move {
			for route in routes {
				match self
					.process_segment_against_route(routes, route, group, segments, outlet, allow_redirects)
					.await
				{
					Err(MatchError::NoMatch(_)) => continue,
					other => return other,
				}
			}
			if segments.is_empty() && !group.children.contains_key(outlet) {
				return Ok(Vec::new());
			}
			Err(no_match(group))
		}
		.boxed()
	}

	fn process_segment_against_route<'a>(
		&'a self,
		routes: &'a [Arc<Route>],
		route: &'a Arc<Route>,
		group: &'a UrlSegmentGroup,
		segments: &'a [UrlSegment],
		outlet: &'a str,
		allow_redirects: bool,
	) -> BoxFuture<'a, MatchResult<Vec<Node>>> {
		async move {
			if !is_immediate_match(route, group, segments, outlet) {
				return Err(no_match(group));
			}
			match route.redirect_target() {
				None => self.match_segment_against_route(group, route, segments, outlet).await,
				Some(redirect_to) if allow_redirects => {
					self.expand_segment_against_route_using_redirect(group, routes, route, redirect_to, segments, outlet)
						.await
				}
				Some(_) => Err(no_match(group)),
			}
		}
		.boxed()
	}

	fn expand_segment_against_route_using_redirect<'a>(
		&'a self,
		group: &'a UrlSegmentGroup,
		routes: &'a [Arc<Route>],
		route: &'a Arc<Route>,
		redirect_to: &'a str,
		segments: &'a [UrlSegment],
		outlet: &'a str,
	) -> BoxFuture<'a, MatchResult<Vec<Node>>> {
		async move {
			let Some(matched) = match_route(group, route, segments) else {
				return Err(no_match(group));
			};
			if redirect_to.starts_with('/') {
				let count = self.absolute_redirect_count.fetch_add(1, Ordering::Relaxed) + 1;
				if count > MAX_ALLOWED_REDIRECTS {
					let url = self.serializer.serialize(&self.current_tree());
					return Err(RouterError::CyclicRedirect(url).into());
				}
			}

			let query_params = self.current_tree().query_params;
			let redirect = apply_redirect_commands(
				self.serializer,
				&query_params,
				&matched.consumed,
				redirect_to,
				&matched.pos_params,
			)?;
			if redirect.absolute {
				return Err(MatchError::AbsoluteRedirect(redirect.tree));
			}
			let mut new_segments = lineralize_segments(redirect_to, &redirect.tree)?;
			new_segments.extend(matched.remaining);
			self.process_segment(routes, group, &new_segments, outlet, false).await
		}
		.boxed()
	}

	fn match_segment_against_route<'a>(
		&'a self,
		raw: &'a UrlSegmentGroup,
		route: &'a Arc<Route>,
		segments: &'a [UrlSegment],
		outlet: &'a str,
	) -> BoxFuture<'a, MatchResult<Vec<Node>>> {
		async move {
			let url_tree = self.current_tree();
			let (snapshot, consumed, remaining, raw) = if route.path() == Some("**") {
				let params = segments.last().map(|s| s.parameters.clone()).unwrap_or_default();
				let snapshot = ActivatedRouteSnapshot::new(
					segments.to_vec(),
					params,
					url_tree.query_params.clone(),
					url_tree.fragment.clone(),
					route.static_data().clone(),
					route.outlet_name(),
					route.component_id(),
					Some(route.clone()),
				);
				// A wildcard swallows whatever follows, named outlets included.
				let raw = UrlSegmentGroup::new(raw.segments.clone(), IndexMap::new());
				(snapshot, Vec::new(), Vec::new(), raw)
			} else {
				let Some(matched) = self.match_with_checks(raw, route, segments).await? else {
					return Err(no_match(raw));
				};
				let snapshot = ActivatedRouteSnapshot::new(
					matched.consumed.clone(),
					matched.parameters,
					url_tree.query_params.clone(),
					url_tree.fragment.clone(),
					route.static_data().clone(),
					route.outlet_name(),
					route.component_id(),
					Some(route.clone()),
				);
				(snapshot, matched.consumed, matched.remaining, raw.clone())
			};

			let child_config = self.get_child_config(route, segments).await?;
			let (group, sliced) = split(&raw, &consumed, &remaining, &child_config);

			if sliced.is_empty() && group.has_children() {
				let children = self.process_children(&child_config, &group).await?;
				return Ok(vec![TreeNode::new(snapshot, children)]);
			}
			if child_config.is_empty() && sliced.is_empty() {
				return Ok(vec![TreeNode::new(snapshot, Vec::new())]);
			}

			// Children of a named-outlet route are configured for the primary outlet.
			let child_outlet = if route.outlet_name() == outlet {
				PRIMARY_OUTLET
			} else {
				outlet
			};
			let children = self
				.process_segment(&child_config, &group, &sliced, child_outlet, true)
				.await?;
			Ok(vec![TreeNode::new(snapshot, children)])
		}
		.boxed()
	}

	async fn match_with_checks(
		&self,
		group: &UrlSegmentGroup,
		route: &Arc<Route>,
		segments: &[UrlSegment],
	) -> MatchResult<Option<RouteMatch>> {
		let Some(matched) = match_route(group, route, segments) else {
			return Ok(None);
		};
		let guards = route
			.can_match_guards()
			.iter()
			.map(|guard| pending(guard(route, segments)))
			.collect();
		match prioritized_guard_value(guards).await.map_err(RouterError::guard)? {
			Some(GuardResult::Allow) => Ok(Some(matched)),
			Some(GuardResult::Deny) => Ok(None),
			Some(GuardResult::Redirect(tree)) => Err(Interruption::redirect(tree).into()),
			None => Err(Interruption::cancel(NavigationCancellationCode::GuardRejected, "").into()),
		}
	}

	async fn get_child_config(&self, route: &Arc<Route>, segments: &[UrlSegment]) -> MatchResult<Routes> {
		if let Some(children) = route.child_routes() {
			return Ok(children.clone());
		}
		if route.children_loader().is_none() {
			return Ok(Vec::new());
		}
		if let Some(loaded) = route.loaded_routes() {
			return Ok(loaded.as_ref().clone());
		}

		let guards = route
			.can_load_guards()
			.iter()
			.map(|guard| pending(guard(route, segments)))
			.collect();
		match prioritized_guard_value(guards).await.map_err(RouterError::guard)? {
			Some(GuardResult::Allow) => {}
			Some(GuardResult::Redirect(tree)) => return Err(Interruption::redirect(tree).into()),
			Some(GuardResult::Deny) | None => {
				let reason = format!(
					"Cannot load children because the guard of the route \"path: '{}'\" returned false",
					route.path_or_empty()
				);
				return Err(Interruption::cancel(NavigationCancellationCode::GuardRejected, reason).into());
			}
		}
		let loaded = self.loader.load_children(route).await?;
		Ok(loaded.as_ref().clone())
	}
}

/// The matcher used for routes declared with a path.
///
/// Parts of the path starting with `:` capture the segment at that
/// position. With [`PathMatch::Full`] the path must consume every segment
/// of a group without children.
pub fn default_url_matcher(segments: &[UrlSegment], group: &UrlSegmentGroup, route: &Route) -> Option<UrlMatchResult> {
	let parts: Vec<&str> = route.path_or_empty().split('/').collect();
	if parts.len() > segments.len() {
		return None;
	}
	if route.path_match_strategy() == PathMatch::Full && (group.has_children() || parts.len() < segments.len()) {
		return None;
	}
	let mut pos_params = IndexMap::new();
	for (part, segment) in parts.iter().zip(segments) {
		match part.strip_prefix(':') {
			Some(name) => {
				pos_params.insert(name.to_string(), segment.clone());
			}
			None if *part != segment.path => return None,
			None => {}
		}
	}
	Some(UrlMatchResult {
		consumed: segments[..parts.len()].to_vec(),
		pos_params,
	})
}

fn match_route(group: &UrlSegmentGroup, route: &Route, segments: &[UrlSegment]) -> Option<RouteMatch> {
	match route.path() {
		Some("**") => Some(RouteMatch {
			consumed: segments.to_vec(),
			remaining: Vec::new(),
			parameters: segments.last().map(|s| s.parameters.clone()).unwrap_or_default(),
			pos_params: IndexMap::new(),
		}),
		Some("") => {
			if route.path_match_strategy() == PathMatch::Full && (group.has_children() || !segments.is_empty()) {
				return None;
			}
			Some(RouteMatch {
				consumed: Vec::new(),
				remaining: segments.to_vec(),
				parameters: Params::new(),
				pos_params: IndexMap::new(),
			})
		}
		_ => {
			let result = match route.matcher_fn() {
				Some(matcher) => matcher(segments, group, route),
				None => default_url_matcher(segments, group, route),
			}?;
			let mut parameters: Params = result
				.pos_params
				.iter()
				.map(|(name, segment)| (name.clone(), segment.path.clone()))
				.collect();
			if let Some(last) = result.consumed.last() {
				parameters.extend(last.parameters.clone());
			}
			let remaining = segments.get(result.consumed.len()..).unwrap_or_default().to_vec();
			Some(RouteMatch {
				consumed: result.consumed,
				remaining,
				parameters,
				pos_params: result.pos_params,
			})
		}
	}
}

fn is_immediate_match(route: &Route, group: &UrlSegmentGroup, segments: &[UrlSegment], outlet: &str) -> bool {
	if route.outlet_name() != outlet && (outlet == PRIMARY_OUTLET || !empty_path_match(group, segments, route)) {
		return false;
	}
	match_route(group, route, segments).is_some()
}

fn empty_path_match(group: &UrlSegmentGroup, sliced: &[UrlSegment], route: &Route) -> bool {
	if (group.has_children() || !sliced.is_empty()) && route.path_match_strategy() == PathMatch::Full {
		return false;
	}
	route.path() == Some("")
}

/// Rearranges a group so empty-path routes of named outlets get a group of
/// their own.
fn split(
	group: &UrlSegmentGroup,
	consumed: &[UrlSegment],
	sliced: &[UrlSegment],
	config: &[Arc<Route>],
) -> (UrlSegmentGroup, Vec<UrlSegment>) {
	let has_empty_named = config
		.iter()
		.any(|r| empty_path_match(group, sliced, r) && r.outlet_name() != PRIMARY_OUTLET);
	if !sliced.is_empty() && has_empty_named {
		let primary = UrlSegmentGroup::new(sliced.to_vec(), group.children.clone());
		let children = create_children_for_empty_paths(config, primary);
		return (UrlSegmentGroup::new(consumed.to_vec(), children), Vec::new());
	}

	if sliced.is_empty() && config.iter().any(|r| empty_path_match(group, sliced, r)) {
		let mut children = group.children.clone();
		for route in config {
			if empty_path_match(group, sliced, route) && !children.contains_key(route.outlet_name()) {
				children.insert(route.outlet_name().to_string(), UrlSegmentGroup::empty());
			}
		}
		return (UrlSegmentGroup::new(group.segments.clone(), children), Vec::new());
	}

	(
		UrlSegmentGroup::new(group.segments.clone(), group.children.clone()),
		sliced.to_vec(),
	)
}

fn create_children_for_empty_paths(
	config: &[Arc<Route>],
	primary: UrlSegmentGroup,
) -> IndexMap<String, UrlSegmentGroup> {
	let mut children = IndexMap::from([(PRIMARY_OUTLET.to_string(), primary)]);
	for route in config {
		if route.path() == Some("") && route.outlet_name() != PRIMARY_OUTLET {
			children.insert(route.outlet_name().to_string(), UrlSegmentGroup::empty());
		}
	}
	children
}

/// Routes for `outlet` first, the others after, each keeping their order.
fn sort_by_matching_outlets(routes: &[Arc<Route>], outlet: &str) -> Routes {
	let (mut matching, others): (Routes, Routes) = routes.iter().cloned().partition(|r| r.outlet_name() == outlet);
	matching.extend(others);
	matching
}

fn has_empty_path_config(node: &Node) -> bool {
	node.value.route_config().is_some_and(|config| config.path() == Some(""))
}

/// Merges nodes produced by the same empty-path route for several outlets.
fn merge_empty_path_matches(nodes: Vec<Node>) -> Vec<Node> {
	let mut result: Vec<Node> = Vec::new();
	let mut merged: Vec<usize> = Vec::new();
	for node in nodes {
		if !has_empty_path_config(&node) {
			result.push(node);
			continue;
		}
		match result.iter().position(|r| r.value.same_config(&node.value)) {
			Some(idx) => {
				result[idx].children.extend(node.children);
				if !merged.contains(&idx) {
					merged.push(idx);
				}
			}
			None => result.push(node),
		}
	}

	let mut kept = Vec::with_capacity(result.len());
	let mut merged_nodes = Vec::new();
	for (idx, node) in result.into_iter().enumerate() {
		if merged.contains(&idx) {
			let children = merge_empty_path_matches(node.children);
			merged_nodes.push(TreeNode::new(node.value, children));
		} else {
			kept.push(node);
		}
	}
	kept.extend(merged_nodes);
	kept
}

fn check_outlet_name_uniqueness(nodes: &[Node]) -> Result<(), RouterError> {
	let mut seen: IndexMap<&str, &ActivatedRouteSnapshot> = IndexMap::new();
	for node in nodes {
		if let Some(previous) = seen.get(node.value.outlet.as_str()) {
			let join = |url: &[UrlSegment]| url.iter().map(serialize_path).collect::<Vec<_>>().join("/");
			return Err(RouterError::DuplicateOutlet(format!(
				"{}' and '{}",
				join(&previous.url),
				join(&node.value.url)
			)));
		}
		seen.insert(&node.value.outlet, &node.value);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::PathMatch;
	use crate::config_loader::DefaultRouteLoader;
	use crate::guards::MaybeAsync;
	use crate::url_serializer::DefaultUrlSerializer;
	use rstest::rstest;
	use tokio::sync::broadcast;

	async fn run(config: Vec<Route>, url: &str) -> Result<Recognized, Interruption> {
		let config: Routes = config.into_iter().map(Arc::new).collect();
		let (events, _) = broadcast::channel(16);
		let loader = RouterConfigLoader::new(Arc::new(DefaultRouteLoader), events);
		let tree = DefaultUrlSerializer.parse(url).unwrap();
		recognize(
			&config,
			tree,
			&DefaultUrlSerializer,
			&loader,
			None,
			ParamsInheritanceStrategy::EmptyOnly,
		)
		.await
	}

	fn describe(node: &Node) -> String {
		let own = format!("{}:{}", node.value.outlet, node.value.route_path());
		if node.children.is_empty() {
			own
		} else {
			let children: Vec<String> = node.children.iter().map(describe).collect();
			format!("{own}[{}]", children.join(","))
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_nested_params() {
		let config = vec![
			Route::new("team/:id")
				.component("Team")
				.children(vec![Route::new("user/:name").component("User")]),
		];
		let recognized = run(config, "/team/22/user/victor").await.ok().unwrap();
		let leaf = recognized.state.leaf();
		assert_eq!(leaf.param("name"), Some("victor"));
		assert_eq!(leaf.param("id"), None);
		assert_eq!(recognized.state.url, "/team/22/user/victor");
	}

	#[rstest]
	#[tokio::test]
	async fn test_named_outlets_sorted_primary_first() {
		let config = vec![
			Route::new("a").component("A"),
			Route::new("c").component("C").outlet("right"),
			Route::new("b").component("B").outlet("left"),
		];
		let recognized = run(config, "/a(right:c//left:b)").await.ok().unwrap();
		assert_eq!(
			describe(&recognized.state.root),
			"primary:[primary:a,left:b,right:c]"
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_relative_redirect_with_params() {
		let config = vec![
			Route::new("old/:id").redirect_to("new/:id"),
			Route::new("new/:id").component("New"),
		];
		let recognized = run(config, "/old/5?x=1").await.ok().unwrap();
		assert_eq!(recognized.state.url, "/new/5?x=1");
		assert_eq!(recognized.state.leaf().param("id"), Some("5"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_absolute_redirect_restarts() {
		let config = vec![
			Route::new("a")
				.component("A")
				.children(vec![Route::new("b").redirect_to("/c")]),
			Route::new("c").component("C"),
		];
		let recognized = run(config, "/a/b").await.ok().unwrap();
		assert_eq!(recognized.state.url, "/c");
	}

	#[rstest]
	#[tokio::test]
	async fn test_redirect_loop_is_detected() {
		let config = vec![
			Route::new("a").redirect_to("/b"),
			Route::new("b").redirect_to("/a"),
		];
		let result = run(config, "/a").await;
		assert!(matches!(
			result,
			Err(Interruption::Error(RouterError::CyclicRedirect(_)))
		));
	}

	#[rstest]
	#[tokio::test]
	async fn test_no_match() {
		let config = vec![Route::new("a").component("A")];
		match run(config, "/a/b").await {
			Err(Interruption::Error(RouterError::NoMatch(segment))) => assert_eq!(segment, "a/b"),
			_ => panic!("expected a NoMatch error"),
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_wildcard_catches_rest() {
		let config = vec![Route::new("a").component("A"), Route::new("**").component("NotFound")];
		let recognized = run(config, "/x/y").await.ok().unwrap();
		let leaf = recognized.state.leaf();
		assert_eq!(leaf.route_path(), "**");
		assert_eq!(leaf.url.len(), 2);
	}

	#[rstest]
	#[tokio::test]
	async fn test_empty_path_full_redirect() {
		let config = vec![
			Route::new("").redirect_to("home").path_match(PathMatch::Full),
			Route::new("home").component("Home"),
		];
		let recognized = run(config, "/").await.ok().unwrap();
		assert_eq!(recognized.state.url, "/home");
	}

	#[rstest]
	#[tokio::test]
	async fn test_componentless_parent_passes_params() {
		let config = vec![
			Route::new("parent/:id").children(vec![Route::new("child").component("Child")]),
		];
		let recognized = run(config, "/parent/7/child").await.ok().unwrap();
		assert_eq!(recognized.state.leaf().param("id"), Some("7"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_can_match_skips_to_next_route() {
		let config = vec![
			Route::new("a").component("Admin").can_match(|_, _| false.into()),
			Route::new("a").component("User"),
		];
		let recognized = run(config, "/a").await.ok().unwrap();
		assert_eq!(
			recognized.state.leaf().component.as_ref().map(|c| c.as_str()),
			Some("User")
		);
	}

	#[rstest]
	#[tokio::test]
	async fn test_can_match_empty_cancels() {
		let config = vec![Route::new("a").component("A").can_match(|_, _| MaybeAsync::empty())];
		let result = run(config, "/a").await;
		assert!(matches!(
			result,
			Err(Interruption::Canceling {
				code: NavigationCancellationCode::GuardRejected,
				..
			})
		));
	}

	#[rstest]
	#[tokio::test]
	async fn test_lazy_children_and_can_load() {
		let config = vec![
			Route::new("lazy").load_children(|| async { Ok(vec![Route::new("x").component("X")]) }),
			Route::new("locked")
				.can_load(|_, _| false.into())
				.load_children(|| async { Ok(vec![Route::new("y").component("Y")]) }),
		];
		let recognized = run(config, "/lazy/x").await.ok().unwrap();
		assert_eq!(recognized.state.leaf().route_path(), "x");

		let config = vec![
			Route::new("locked")
				.can_load(|_, _| false.into())
				.load_children(|| async { Ok(vec![Route::new("y").component("Y")]) }),
		];
		match run(config, "/locked/y").await {
			Err(Interruption::Canceling { code, reason, .. }) => {
				assert_eq!(code, NavigationCancellationCode::GuardRejected);
				assert!(reason.contains("path: 'locked'"));
			}
			_ => panic!("expected the load to be rejected"),
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_empty_path_named_outlet() {
		let config = vec![
			Route::new("a").component("A"),
			Route::new("").component("Aux").outlet("aux"),
		];
		let recognized = run(config, "/a").await.ok().unwrap();
		assert_eq!(describe(&recognized.state.root), "primary:[primary:a,aux:]");
		assert_eq!(recognized.state.url, "/a");
	}

	#[rstest]
	fn test_default_matcher_full() {
		let route = Route::new("a/:id").component("A").path_match(PathMatch::Full);
		let segments = vec![UrlSegment::path("a"), UrlSegment::path("1")];
		let group = UrlSegmentGroup::new(segments.clone(), IndexMap::new());
		let result = default_url_matcher(&segments, &group, &route).unwrap();
		assert_eq!(result.consumed.len(), 2);
		assert_eq!(result.pos_params["id"].path, "1");

		let longer = vec![UrlSegment::path("a"), UrlSegment::path("1"), UrlSegment::path("x")];
		assert!(default_url_matcher(&longer, &group, &route).is_none());
	}
}
