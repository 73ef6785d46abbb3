//! Building URL trees from navigation commands.
//!
//! Commands are applied relative to a route. A first command such as
//! `"/a/b"` is absolute, `"../x"` climbs one segment group, a
//! [`Command::Matrix`] right after a path attaches matrix parameters to it,
//! and [`Command::Outlets`] addresses named outlets.
//!
//! ```
//! use reinhardt_navigation::create_url_tree::{Command, create_url_tree_from_segment_group};
//! use reinhardt_navigation::url_serializer::{DefaultUrlSerializer, UrlSerializer};
//! use reinhardt_navigation::url_tree::QueryParams;
//!
//! let current = DefaultUrlSerializer.parse("/team/33/user/11").unwrap();
//! let commands = vec![Command::from("/team"), Command::from(44), Command::from("user")];
//! let tree = create_url_tree_from_segment_group(&current.root, &[], &commands, QueryParams::new(), None).unwrap();
//! assert_eq!(DefaultUrlSerializer.serialize(&tree), "/team/44/user");
//! ```

use indexmap::IndexMap;

use crate::error::{RouterError, RouterResult};
use crate::router_state::{ActivatedRouteSnapshot, RouterStateSnapshot, TreeNode};
use crate::url_tree::{PRIMARY_OUTLET, Params, QueryParams, UrlSegment, UrlSegmentGroup, UrlTree};

/// One navigation command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
	/// A path. The first path command may contain `/`, `.` and `..`.
	Path(String),
	/// Matrix parameters for the preceding path, or for the current segment
	/// when first.
	Matrix(Params),
	/// Commands per outlet. `None` removes the outlet.
	Outlets(IndexMap<String, Option<Vec<Command>>>),
	/// A path used verbatim, never split.
	SegmentPath(String),
}

impl Command {
	/// Matrix parameters from key/value pairs.
	pub fn matrix<K, V>(params: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		Self::Matrix(params.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}

	/// Outlet commands from `/`-separated paths. `None` removes the outlet.
	pub fn outlets<K: Into<String>>(outlets: impl IntoIterator<Item = (K, Option<&'static str>)>) -> Self {
		Self::Outlets(
			outlets
				.into_iter()
				.map(|(name, path)| {
					let commands = path.map(|p| p.split('/').map(Command::from).collect());
					(name.into(), commands)
				})
				.collect(),
		)
	}

	fn is_matrix(&self) -> bool {
		matches!(self, Self::Matrix(_))
	}

	fn is_outlets(&self) -> bool {
		matches!(self, Self::Outlets(_))
	}
}

impl From<&str> for Command {
	fn from(path: &str) -> Self {
		Self::Path(path.to_string())
	}
}

impl From<String> for Command {
	fn from(path: String) -> Self {
		Self::Path(path)
	}
}

macro_rules! command_from_number {
	($($ty:ty),*) => {
		$(impl From<$ty> for Command {
			fn from(value: $ty) -> Self {
				Self::Path(value.to_string())
			}
		})*
	};
}

command_from_number!(i32, i64, u32, u64, usize);

fn invalid(message: &str) -> RouterError {
	RouterError::InvalidCommands(message.to_string())
}

/// Commands after the leading path has been split.
struct CommandNavigation {
	is_absolute: bool,
	double_dots: usize,
	commands: Vec<Command>,
}

impl CommandNavigation {
	fn to_root(&self) -> bool {
		self.is_absolute && matches!(self.commands.as_slice(), [Command::Path(p)] if p == "/")
	}
}

fn compute_navigation(commands: &[Command]) -> RouterResult<CommandNavigation> {
	if matches!(commands, [Command::Path(p)] if p == "/") {
		return Ok(CommandNavigation {
			is_absolute: true,
			double_dots: 0,
			commands: commands.to_vec(),
		});
	}

	let mut is_absolute = false;
	let mut double_dots = 0;
	let mut res = Vec::with_capacity(commands.len());
	for (idx, command) in commands.iter().enumerate() {
		match command {
			Command::SegmentPath(path) => res.push(Command::Path(path.clone())),
			Command::Path(path) if idx == 0 => {
				for (part_idx, part) in path.split('/').enumerate() {
					match part {
						"." if part_idx == 0 => {}
						"" if part_idx == 0 => is_absolute = true,
						".." => double_dots += 1,
						"" => {}
						part => res.push(Command::Path(part.to_string())),
					}
				}
			}
			other => res.push(other.clone()),
		}
	}

	if is_absolute && res.first().is_some_and(Command::is_matrix) {
		return Err(invalid("Root segment cannot have matrix parameters"));
	}
	if let Some(pos) = res.iter().position(Command::is_outlets)
		&& pos != res.len() - 1
	{
		return Err(invalid("{outlets:{}} has to be the last command"));
	}

	Ok(CommandNavigation {
		is_absolute,
		double_dots,
		commands: res,
	})
}

struct Position {
	/// Outlet names from the root to the group commands apply to.
	path: Vec<String>,
	process_children: bool,
	index: usize,
}

fn find_starting_position(
	nav: &CommandNavigation,
	root: &UrlSegmentGroup,
	target_path: &[String],
) -> RouterResult<Position> {
	if nav.is_absolute || target_path.is_empty() {
		return Ok(Position {
			path: Vec::new(),
			process_children: true,
			index: 0,
		});
	}

	let segments_at = |path: &[String]| root.at_path(path).map_or(0, |g| g.segments.len() as isize);
	let modifier = if nav.commands.first().is_some_and(Command::is_matrix) {
		0
	} else {
		1
	};

	let mut path = target_path.to_vec();
	let mut index = segments_at(&path) - 1 + modifier;
	let mut double_dots = nav.double_dots as isize;
	while double_dots > index {
		double_dots -= index;
		if path.pop().is_none() {
			return Err(invalid("Invalid number of '../'"));
		}
		index = segments_at(&path);
	}
	let index = usize::try_from(index - double_dots).map_err(|_| invalid("Invalid number of '../'"))?;
	Ok(Position {
		path,
		process_children: false,
		index,
	})
}

fn get_outlets(commands: &[Command]) -> IndexMap<String, Option<Vec<Command>>> {
	match commands.first() {
		Some(Command::Outlets(outlets)) => outlets.clone(),
		_ => IndexMap::from([(PRIMARY_OUTLET.to_string(), Some(commands.to_vec()))]),
	}
}

fn update_segment_group(
	group: Option<&UrlSegmentGroup>,
	start_index: usize,
	commands: &[Command],
) -> RouterResult<UrlSegmentGroup> {
	let empty = UrlSegmentGroup::empty();
	let group = group.unwrap_or(&empty);
	if group.segments.is_empty() && group.has_children() {
		return update_segment_group_children(group, start_index, commands);
	}

	let prefix = prefixed_with(group, start_index, commands);
	let sliced = &commands[prefix.command_index..];
	if !prefix.matched {
		create_new_segment_group(group, start_index, commands)
	} else if prefix.path_index < group.segments.len() {
		let primary = UrlSegmentGroup::new(group.segments[prefix.path_index..].to_vec(), group.children.clone());
		let split = UrlSegmentGroup::new(
			group.segments[..prefix.path_index].to_vec(),
			IndexMap::from([(PRIMARY_OUTLET.to_string(), primary)]),
		);
		update_segment_group_children(&split, 0, sliced)
	} else if sliced.is_empty() {
		Ok(UrlSegmentGroup::new(group.segments.clone(), IndexMap::new()))
	} else if !group.has_children() {
		create_new_segment_group(group, start_index, commands)
	} else {
		update_segment_group_children(group, 0, sliced)
	}
}

fn update_segment_group_children(
	group: &UrlSegmentGroup,
	start_index: usize,
	commands: &[Command],
) -> RouterResult<UrlSegmentGroup> {
	if commands.is_empty() {
		return Ok(UrlSegmentGroup::new(group.segments.clone(), IndexMap::new()));
	}

	let outlets = get_outlets(commands);
	// Named outlet commands go through an empty-path primary child.
	if outlets.keys().any(|o| o != PRIMARY_OUTLET)
		&& group.number_of_children() == 1
		&& let Some(primary) = group.primary().filter(|p| p.segments.is_empty())
	{
		let updated = update_segment_group_children(primary, start_index, commands)?;
		return Ok(UrlSegmentGroup::new(group.segments.clone(), updated.children));
	}

	let mut children = IndexMap::new();
	for (outlet, commands) in &outlets {
		if let Some(commands) = commands {
			let child = update_segment_group(group.children.get(outlet), start_index, commands)?;
			children.insert(outlet.clone(), child);
		}
	}
	for (outlet, child) in &group.children {
		if !outlets.contains_key(outlet) {
			children.insert(outlet.clone(), child.clone());
		}
	}
	Ok(UrlSegmentGroup::new(group.segments.clone(), children))
}

struct Prefix {
	matched: bool,
	path_index: usize,
	command_index: usize,
}

fn prefixed_with(group: &UrlSegmentGroup, start_index: usize, commands: &[Command]) -> Prefix {
	let no_match = Prefix {
		matched: false,
		path_index: 0,
		command_index: 0,
	};
	let mut command_index = 0;
	let mut path_index = start_index;
	while path_index < group.segments.len() {
		let Some(command) = commands.get(command_index) else {
			return no_match;
		};
		let segment = &group.segments[path_index];
		let current = match command {
			// May address other outlets too, so it is never consumed here.
			Command::Outlets(_) => break,
			Command::Matrix(_) => return no_match,
			Command::Path(path) | Command::SegmentPath(path) => path.as_str(),
		};
		match commands.get(command_index + 1) {
			Some(Command::Matrix(params)) if !current.is_empty() => {
				if !compare(current, params, segment) {
					return no_match;
				}
				command_index += 2;
			}
			_ => {
				if !compare(current, &Params::new(), segment) {
					return no_match;
				}
				command_index += 1;
			}
		}
		path_index += 1;
	}
	Prefix {
		matched: true,
		path_index,
		command_index,
	}
}

fn compare(path: &str, params: &Params, segment: &UrlSegment) -> bool {
	path == segment.path && *params == segment.parameters
}

fn create_new_segment_group(
	group: &UrlSegmentGroup,
	start_index: usize,
	commands: &[Command],
) -> RouterResult<UrlSegmentGroup> {
	let mut paths: Vec<UrlSegment> = group.segments.iter().take(start_index).cloned().collect();
	let mut i = 0;
	while i < commands.len() {
		match &commands[i] {
			Command::Outlets(outlets) => {
				return Ok(UrlSegmentGroup::new(paths, create_new_segment_children(outlets)?));
			}
			Command::Matrix(params) if i == 0 => {
				let segment = group
					.segments
					.get(start_index)
					.ok_or_else(|| invalid("matrix parameters have no segment to apply to"))?;
				paths.push(UrlSegment::new(segment.path.clone(), params.clone()));
				i += 1;
			}
			Command::Matrix(_) => return Err(invalid("matrix parameters must follow a path")),
			Command::Path(path) | Command::SegmentPath(path) => match commands.get(i + 1) {
				Some(Command::Matrix(params)) if !path.is_empty() => {
					paths.push(UrlSegment::new(path.clone(), params.clone()));
					i += 2;
				}
				_ => {
					paths.push(UrlSegment::path(path.clone()));
					i += 1;
				}
			},
		}
	}
	Ok(UrlSegmentGroup::new(paths, IndexMap::new()))
}

fn create_new_segment_children(
	outlets: &IndexMap<String, Option<Vec<Command>>>,
) -> RouterResult<IndexMap<String, UrlSegmentGroup>> {
	let mut children = IndexMap::new();
	for (outlet, commands) in outlets {
		if let Some(commands) = commands {
			children.insert(
				outlet.clone(),
				create_new_segment_group(&UrlSegmentGroup::empty(), 0, commands)?,
			);
		}
	}
	Ok(children)
}

/// Drops empty groups, lifts named children out of empty primary groups and
/// merges lone primary children into their parent.
pub(crate) fn squash_segment_group(group: UrlSegmentGroup) -> UrlSegmentGroup {
	let mut children = IndexMap::new();
	for (outlet, child) in group.children {
		let child = squash_segment_group(child);
		if outlet == PRIMARY_OUTLET && child.segments.is_empty() && child.has_children() {
			children.extend(child.children);
		} else if !child.segments.is_empty() || child.has_children() {
			children.insert(outlet, child);
		}
	}
	merge_trivial_children(UrlSegmentGroup::new(group.segments, children))
}

fn merge_trivial_children(mut group: UrlSegmentGroup) -> UrlSegmentGroup {
	if group.number_of_children() == 1
		&& let Some(primary) = group.children.shift_remove(PRIMARY_OUTLET)
	{
		let mut segments = group.segments;
		segments.extend(primary.segments);
		return UrlSegmentGroup::new(segments, primary.children);
	}
	group
}

fn create_root(group: UrlSegmentGroup) -> UrlSegmentGroup {
	if group.segments.is_empty() {
		group
	} else {
		UrlSegmentGroup::new(Vec::new(), IndexMap::from([(PRIMARY_OUTLET.to_string(), group)]))
	}
}

fn tree(
	root: &UrlSegmentGroup,
	at: &[String],
	new_group: UrlSegmentGroup,
	query_params: QueryParams,
	fragment: Option<String>,
) -> UrlTree {
	let candidate = if at.is_empty() {
		new_group
	} else {
		let mut candidate = root.clone();
		if let Some(slot) = candidate.at_path_mut(at) {
			*slot = new_group;
		}
		candidate
	};
	UrlTree::new(create_root(squash_segment_group(candidate)), query_params, fragment)
}

/// Applies `commands` to the group at `target_path` (outlet names walked
/// from `root`).
///
/// # Errors
///
/// Returns [`RouterError::InvalidCommands`] when the commands are malformed
/// or climb above the root.
pub fn create_url_tree_from_segment_group(
	root: &UrlSegmentGroup,
	target_path: &[String],
	commands: &[Command],
	query_params: QueryParams,
	fragment: Option<String>,
) -> RouterResult<UrlTree> {
	if commands.is_empty() {
		return Ok(tree(root, &[], root.clone(), query_params, fragment));
	}
	let nav = compute_navigation(commands)?;
	if nav.to_root() {
		return Ok(tree(root, &[], UrlSegmentGroup::empty(), query_params, fragment));
	}

	let position = find_starting_position(&nav, root, target_path)?;
	let group = root
		.at_path(&position.path)
		.ok_or_else(|| invalid("the starting segment group does not exist"))?;
	let new_group = if position.process_children {
		update_segment_group_children(group, position.index, &nav.commands)?
	} else {
		update_segment_group(Some(group), position.index, &nav.commands)?
	};
	Ok(tree(root, &position.path, new_group, query_params, fragment))
}

/// Applies `commands` relative to a route of a recognised state.
///
/// The segment groups are rebuilt from the routes' consumed segments, so
/// the result reflects the state rather than any URL string.
pub fn create_url_tree_from_snapshot(
	state: &RouterStateSnapshot,
	relative_to: &ActivatedRouteSnapshot,
	commands: &[Command],
	query_params: QueryParams,
	fragment: Option<String>,
) -> RouterResult<UrlTree> {
	let (root, target_path) = segment_group_from_state(&state.root, relative_to.id);
	create_url_tree_from_segment_group(
		&root,
		&target_path.unwrap_or_default(),
		commands,
		query_params,
		fragment,
	)
}

/// The segment group tree of a state and the outlet path of route `target`.
pub(crate) fn segment_group_from_state(
	root: &TreeNode<ActivatedRouteSnapshot>,
	target: u64,
) -> (UrlSegmentGroup, Option<Vec<String>>) {
	fn build(
		node: &TreeNode<ActivatedRouteSnapshot>,
		target: u64,
		path: &mut Vec<String>,
		found: &mut Option<Vec<String>>,
	) -> UrlSegmentGroup {
		if node.value.id == target {
			*found = Some(path.clone());
		}
		let mut children = IndexMap::new();
		for child in &node.children {
			path.push(child.value.outlet.clone());
			children.insert(child.value.outlet.clone(), build(child, target, path, found));
			path.pop();
		}
		UrlSegmentGroup::new(node.value.url.clone(), children)
	}

	let mut found = None;
	let group = build(root, target, &mut Vec::new(), &mut found);
	(group, found)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::url_serializer::{DefaultUrlSerializer, UrlSerializer};
	use crate::url_tree::QueryValue;
	use rstest::rstest;

	fn create(url: &str, path: &[&str], commands: Vec<Command>) -> RouterResult<String> {
		let current = DefaultUrlSerializer.parse(url).unwrap();
		let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
		create_url_tree_from_segment_group(&current.root, &path, &commands, QueryParams::new(), None)
			.map(|tree| DefaultUrlSerializer.serialize(&tree))
	}

	#[rstest]
	#[case("/a/b", vec![], "/a/b")]
	#[case("/a/b", vec!["/".into()], "/")]
	#[case("/", vec!["one".into(), "two".into()], "/one/two")]
	#[case("/", vec!["one".into(), 11.into(), "two".into(), 22.into()], "/one/11/two/22")]
	#[case("/a/b", vec!["/c".into()], "/c")]
	#[case("/a/b", vec!["/one/two".into()], "/one/two")]
	#[case("/", vec!["one".into(), Command::matrix([("a", "1")])], "/one;a=1")]
	#[case("/a/b", vec![Command::outlets([("right", Some("c"))])], "/a/b(right:c)")]
	#[case("/a(right:b)", vec![Command::outlets([("right", None)])], "/a")]
	#[case("/a/b", vec![Command::SegmentPath("x/y".into())], "/x%2Fy")]
	fn test_from_root(#[case] url: &str, #[case] commands: Vec<Command>, #[case] expected: &str) {
		assert_eq!(create(url, &[], commands).unwrap(), expected);
	}

	#[rstest]
	#[case(vec!["d".into()], "/a/b/c/d")]
	#[case(vec!["../d".into()], "/a/b/d")]
	#[case(vec!["./d".into()], "/a/b/c/d")]
	#[case(vec!["../../d".into(), "e".into()], "/a/d/e")]
	#[case(vec![Command::matrix([("x", "1")])], "/a/b/c;x=1")]
	fn test_relative_to_primary_group(#[case] commands: Vec<Command>, #[case] expected: &str) {
		assert_eq!(create("/a/b/c", &[PRIMARY_OUTLET], commands).unwrap(), expected);
	}

	#[rstest]
	fn test_too_many_double_dots() {
		let err = create("/a/b/c", &[PRIMARY_OUTLET], vec!["../../../../x".into()]).unwrap_err();
		assert!(matches!(err, RouterError::InvalidCommands(msg) if msg.contains("'../'")));
	}

	#[rstest]
	#[case(vec![Command::outlets([("aux", Some("x"))]), "a".into()], "has to be the last command")]
	#[case(vec!["/".into(), Command::matrix([("a", "1")])], "Root segment cannot have matrix parameters")]
	fn test_invalid_commands(#[case] commands: Vec<Command>, #[case] message: &str) {
		let err = create("/a", &[], commands).unwrap_err();
		assert!(matches!(err, RouterError::InvalidCommands(msg) if msg.contains(message)));
	}

	#[rstest]
	fn test_outlets_through_empty_primary_child() {
		let aux = UrlSegmentGroup::new(vec![UrlSegment::path("x")], IndexMap::new());
		let empty_primary = UrlSegmentGroup::new(Vec::new(), IndexMap::from([("aux".to_string(), aux)]));
		let root = UrlSegmentGroup::new(Vec::new(), IndexMap::from([(PRIMARY_OUTLET.to_string(), empty_primary)]));
		let tree = create_url_tree_from_segment_group(
			&root,
			&[],
			&[Command::outlets([("aux", Some("y"))])],
			QueryParams::new(),
			None,
		)
		.unwrap();
		assert_eq!(DefaultUrlSerializer.serialize(&tree), "/(aux:y)");
	}

	#[rstest]
	fn test_query_params_and_fragment() {
		let current = DefaultUrlSerializer.parse("/a?old=1").unwrap();
		let query = QueryParams::from([("x".to_string(), QueryValue::from("1"))]);
		let tree = create_url_tree_from_segment_group(&current.root, &[], &[], query, Some("f".into())).unwrap();
		assert_eq!(DefaultUrlSerializer.serialize(&tree), "/a?x=1#f");
	}

	#[rstest]
	fn test_squash_merges_primary_chain() {
		let inner = UrlSegmentGroup::new(vec![UrlSegment::path("b")], IndexMap::new());
		let empty = UrlSegmentGroup::new(Vec::new(), IndexMap::from([(PRIMARY_OUTLET.to_string(), inner)]));
		let outer = UrlSegmentGroup::new(
			vec![UrlSegment::path("a")],
			IndexMap::from([(PRIMARY_OUTLET.to_string(), empty)]),
		);
		let squashed = squash_segment_group(outer);
		assert_eq!(squashed.segments, vec![UrlSegment::path("a"), UrlSegment::path("b")]);
		assert!(!squashed.has_children());
	}
}
