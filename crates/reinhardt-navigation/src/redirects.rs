//! Expansion of `redirectTo` targets.
//!
//! A target is parsed as a URL. Segments written as `:name` are replaced by
//! the positional parameter of that name, literal segments that also appear
//! in the consumed URL keep the consumed segment (and its matrix
//! parameters), and query values written as `:name` copy the query
//! parameter of that name from the URL being navigated to.

use indexmap::IndexMap;

use crate::error::{RouterError, RouterResult};
use crate::url_serializer::UrlSerializer;
use crate::url_tree::{QueryParams, QueryValue, UrlSegment, UrlSegmentGroup, UrlTree};

/// An expanded redirect target.
#[derive(Debug, Clone)]
pub(crate) struct Redirect {
	pub tree: UrlTree,
	/// The target started with `/`; recognition restarts from the root.
	pub absolute: bool,
}

pub(crate) fn apply_redirect_commands(
	serializer: &dyn UrlSerializer,
	current_query: &QueryParams,
	segments: &[UrlSegment],
	redirect_to: &str,
	pos_params: &IndexMap<String, UrlSegment>,
) -> RouterResult<Redirect> {
	let target = serializer.parse(redirect_to)?;
	let mut actual = segments.to_vec();
	let root = create_segment_group(redirect_to, &target.root, &mut actual, pos_params)?;
	let query_params = create_query_params(&target.query_params, current_query);
	Ok(Redirect {
		tree: UrlTree::new(root, query_params, target.fragment),
		absolute: redirect_to.starts_with('/'),
	})
}

fn create_query_params(redirect_params: &QueryParams, actual: &QueryParams) -> QueryParams {
	let mut res = QueryParams::new();
	for (key, value) in redirect_params {
		match value {
			QueryValue::Single(v) if v.starts_with(':') => {
				if let Some(source) = actual.get(&v[1..]) {
					res.insert(key.clone(), source.clone());
				}
			}
			other => {
				res.insert(key.clone(), other.clone());
			}
		}
	}
	res
}

fn create_segment_group(
	redirect_to: &str,
	group: &UrlSegmentGroup,
	actual: &mut Vec<UrlSegment>,
	pos_params: &IndexMap<String, UrlSegment>,
) -> RouterResult<UrlSegmentGroup> {
	let segments = group
		.segments
		.iter()
		.map(|segment| match segment.path.strip_prefix(':') {
			Some(name) => find_pos_param(redirect_to, name, segment, pos_params),
			None => Ok(find_or_return(segment, actual)),
		})
		.collect::<RouterResult<Vec<_>>>()?;

	let mut children = IndexMap::new();
	for (name, child) in &group.children {
		children.insert(
			name.clone(),
			create_segment_group(redirect_to, child, actual, pos_params)?,
		);
	}
	Ok(UrlSegmentGroup::new(segments, children))
}

fn find_pos_param(
	redirect_to: &str,
	name: &str,
	segment: &UrlSegment,
	pos_params: &IndexMap<String, UrlSegment>,
) -> RouterResult<UrlSegment> {
	pos_params
		.get(name)
		.cloned()
		.ok_or_else(|| RouterError::MissingRedirectParam {
			redirect_to: redirect_to.to_string(),
			param: segment.path.clone(),
		})
}

/// Reuses the consumed segment with the same path, dropping it and
/// everything after it from further lookups.
fn find_or_return(segment: &UrlSegment, actual: &mut Vec<UrlSegment>) -> UrlSegment {
	match actual.iter().position(|s| s.path == segment.path) {
		Some(idx) => {
			let found = actual[idx].clone();
			actual.truncate(idx);
			found
		}
		None => segment.clone(),
	}
}

/// Flattens a relative redirect target, which may only use the primary outlet.
pub(crate) fn lineralize_segments(redirect_to: &str, tree: &UrlTree) -> RouterResult<Vec<UrlSegment>> {
	let mut res = Vec::new();
	let mut current = &tree.root;
	loop {
		res.extend(current.segments.iter().cloned());
		if current.number_of_children() == 0 {
			return Ok(res);
		}
		match current.primary() {
			Some(primary) if current.number_of_children() == 1 => current = primary,
			_ => return Err(RouterError::NamedOutletsRedirect(redirect_to.to_string())),
		}
	}
}
