//! Structured URL model.
//!
//! A URL such as `/team/33;expand=true/(user/victor//support:help)?debug=true#top`
//! is represented as a [`UrlTree`]: a root [`UrlSegmentGroup`] holding path
//! [`UrlSegment`]s and named child groups (one per outlet), plus query
//! parameters and an optional fragment.
//!
//! Trees are values. Operations that "modify" a tree build a new one.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::url_serializer::{DefaultUrlSerializer, UrlSerializer};

/// Name of the outlet every un-named route renders into.
pub const PRIMARY_OUTLET: &str = "primary";

/// Matrix or positional parameters (`;name=value`).
///
/// Equality ignores insertion order, serialization preserves it.
pub type Params = IndexMap<String, String>;

/// Query parameters (`?name=value&name=other`).
pub type QueryParams = IndexMap<String, QueryValue>;

/// A query parameter value, either a single string or a repeated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
	/// `?key=value`
	Single(String),
	/// `?key=a&key=b`
	Multiple(Vec<String>),
}

impl QueryValue {
	/// Returns the first value.
	pub fn first(&self) -> Option<&str> {
		match self {
			Self::Single(value) => Some(value),
			Self::Multiple(values) => values.first().map(String::as_str),
		}
	}

	/// Returns every value carried by this parameter.
	pub fn all(&self) -> Vec<&str> {
		match self {
			Self::Single(value) => vec![value.as_str()],
			Self::Multiple(values) => values.iter().map(String::as_str).collect(),
		}
	}

	/// Collapses single-element lists so that a parsed value and a built value
	/// compare equal. Returns `None` for an empty list.
	pub fn normalized(self) -> Option<Self> {
		match self {
			Self::Multiple(mut values) if values.len() == 1 => values.pop().map(Self::Single),
			Self::Multiple(values) if values.is_empty() => None,
			other => Some(other),
		}
	}

	/// Compares two values treating lists as unordered.
	pub fn equivalent(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Multiple(a), Self::Multiple(b)) => {
				if a.len() != b.len() {
					return false;
				}
				let mut a = a.clone();
				let mut b = b.clone();
				a.sort();
				b.sort();
				a == b
			}
			(Self::Single(a), Self::Single(b)) => a == b,
			_ => false,
		}
	}

	/// Appends another occurrence of the same key.
	pub(crate) fn push(&mut self, value: String) {
		match self {
			Self::Single(existing) => {
				*self = Self::Multiple(vec![std::mem::take(existing), value]);
			}
			Self::Multiple(values) => values.push(value),
		}
	}
}

impl From<&str> for QueryValue {
	fn from(value: &str) -> Self {
		Self::Single(value.to_string())
	}
}

impl From<String> for QueryValue {
	fn from(value: String) -> Self {
		Self::Single(value)
	}
}

impl From<Vec<String>> for QueryValue {
	fn from(values: Vec<String>) -> Self {
		Self::Multiple(values)
	}
}

impl From<Vec<&str>> for QueryValue {
	fn from(values: Vec<&str>) -> Self {
		Self::Multiple(values.into_iter().map(str::to_string).collect())
	}
}

/// A single path token plus its matrix parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlSegment {
	/// The decoded path part.
	pub path: String,
	/// The matrix parameters attached to this segment.
	pub parameters: Params,
}

impl UrlSegment {
	/// Creates a segment.
	pub fn new(path: impl Into<String>, parameters: Params) -> Self {
		Self {
			path: path.into(),
			parameters,
		}
	}

	/// Creates a segment without matrix parameters.
	pub fn path(path: impl Into<String>) -> Self {
		Self::new(path, Params::new())
	}
}

impl fmt::Display for UrlSegment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&crate::url_serializer::serialize_path(self))
	}
}

/// An ordered list of segments plus named child groups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlSegmentGroup {
	/// The segments consumed at this level.
	pub segments: Vec<UrlSegment>,
	/// Child groups keyed by outlet name.
	pub children: IndexMap<String, UrlSegmentGroup>,
}

impl UrlSegmentGroup {
	/// Creates a group.
	pub fn new(segments: Vec<UrlSegment>, children: IndexMap<String, UrlSegmentGroup>) -> Self {
		Self { segments, children }
	}

	/// Creates a group with no segments and no children.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Whether this group has child outlets.
	pub fn has_children(&self) -> bool {
		!self.children.is_empty()
	}

	/// Number of child outlets.
	pub fn number_of_children(&self) -> usize {
		self.children.len()
	}

	/// The primary child group, if any.
	pub fn primary(&self) -> Option<&UrlSegmentGroup> {
		self.children.get(PRIMARY_OUTLET)
	}

	/// Returns the group at `path`, a list of outlet names walked from `self`.
	pub fn at_path(&self, path: &[String]) -> Option<&UrlSegmentGroup> {
		path.iter()
			.try_fold(self, |group, outlet| group.children.get(outlet))
	}

	/// Returns the group at `path` mutably.
	pub fn at_path_mut(&mut self, path: &[String]) -> Option<&mut UrlSegmentGroup> {
		path.iter()
			.try_fold(self, |group, outlet| group.children.get_mut(outlet))
	}
}

impl fmt::Display for UrlSegmentGroup {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&crate::url_serializer::serialize_paths(self))
	}
}

/// A parsed URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlTree {
	/// The root group. It never carries segments itself once normalised.
	pub root: UrlSegmentGroup,
	/// Query parameters.
	pub query_params: QueryParams,
	/// Fragment, without the leading `#`.
	pub fragment: Option<String>,
}

impl UrlTree {
	/// Creates a tree.
	pub fn new(root: UrlSegmentGroup, query_params: QueryParams, fragment: Option<String>) -> Self {
		Self {
			root,
			query_params,
			fragment,
		}
	}

	/// The tree for `/`.
	pub fn root_url() -> Self {
		Self::default()
	}

	/// Returns the first value of a query parameter.
	pub fn query_param(&self, name: &str) -> Option<&str> {
		self.query_params.get(name).and_then(QueryValue::first)
	}
}

impl fmt::Display for UrlTree {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&DefaultUrlSerializer.serialize(self))
	}
}

/// How paths are compared by [`contains_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathsMatch {
	/// The trees must have the same paths.
	Exact,
	/// The contained tree may be a prefix of the container.
	Subset,
}

/// How query or matrix parameters are compared by [`contains_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamsMatch {
	/// Both sides must carry exactly the same parameters.
	Exact,
	/// Every parameter of the contained tree must be present in the container.
	Subset,
	/// Parameters are not compared.
	Ignored,
}

/// How fragments are compared by [`contains_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FragmentMatch {
	/// The fragments must be equal.
	Exact,
	/// Fragments are not compared.
	Ignored,
}

/// Options for `is_active` checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsActiveMatchOptions {
	pub paths: PathsMatch,
	pub query_params: ParamsMatch,
	pub fragment: FragmentMatch,
	pub matrix_params: ParamsMatch,
}

impl IsActiveMatchOptions {
	/// Everything must match exactly.
	pub const EXACT: Self = Self {
		paths: PathsMatch::Exact,
		query_params: ParamsMatch::Exact,
		fragment: FragmentMatch::Ignored,
		matrix_params: ParamsMatch::Ignored,
	};

	/// The checked URL may be a prefix of the current one.
	pub const SUBSET: Self = Self {
		paths: PathsMatch::Subset,
		query_params: ParamsMatch::Subset,
		fragment: FragmentMatch::Ignored,
		matrix_params: ParamsMatch::Ignored,
	};

	/// Legacy boolean form: `true` means [`Self::EXACT`].
	pub fn from_exact(exact: bool) -> Self {
		if exact { Self::EXACT } else { Self::SUBSET }
	}
}

impl Default for IsActiveMatchOptions {
	fn default() -> Self {
		Self::SUBSET
	}
}

/// Whether `containee` is contained in `container` under `options`.
pub fn contains_tree(container: &UrlTree, containee: &UrlTree, options: IsActiveMatchOptions) -> bool {
	let paths = match options.paths {
		PathsMatch::Exact => equal_segment_groups(&container.root, &containee.root, options.matrix_params),
		PathsMatch::Subset => contains_segment_group(
			&container.root,
			&containee.root,
			&containee.root.segments,
			options.matrix_params,
		),
	};
	let query = match options.query_params {
		ParamsMatch::Exact => equal_query_params(&container.query_params, &containee.query_params),
		ParamsMatch::Subset => contains_query_params(&container.query_params, &containee.query_params),
		ParamsMatch::Ignored => true,
	};
	let fragment = options.fragment == FragmentMatch::Ignored || container.fragment == containee.fragment;
	paths && query && fragment
}

/// Compares segment paths, ignoring matrix parameters.
pub fn equal_path(a: &[UrlSegment], b: &[UrlSegment]) -> bool {
	a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.path == y.path)
}

/// Compares two query parameter maps, treating repeated values as unordered.
pub fn equal_query_params(a: &QueryParams, b: &QueryParams) -> bool {
	a.len() == b.len() && contains_query_params(a, b)
}

fn contains_query_params(container: &QueryParams, containee: &QueryParams) -> bool {
	containee.len() <= container.len()
		&& containee
			.iter()
			.all(|(key, value)| container.get(key).is_some_and(|other| other.equivalent(value)))
}

fn params_match(container: &Params, containee: &Params, mode: ParamsMatch) -> bool {
	match mode {
		ParamsMatch::Exact => container == containee,
		ParamsMatch::Subset => {
			containee.len() <= container.len()
				&& containee.iter().all(|(k, v)| container.get(k) == Some(v))
		}
		ParamsMatch::Ignored => true,
	}
}

fn matrix_params_match(container: &[UrlSegment], containee: &[UrlSegment], mode: ParamsMatch) -> bool {
	containee
		.iter()
		.zip(container)
		.all(|(inner, outer)| params_match(&outer.parameters, &inner.parameters, mode))
}

fn equal_segment_groups(container: &UrlSegmentGroup, containee: &UrlSegmentGroup, mode: ParamsMatch) -> bool {
	if !equal_path(&container.segments, &containee.segments)
		|| !matrix_params_match(&container.segments, &containee.segments, mode)
		|| container.number_of_children() != containee.number_of_children()
	{
		return false;
	}
	containee.children.iter().all(|(name, child)| {
		container
			.children
			.get(name)
			.is_some_and(|other| equal_segment_groups(other, child, mode))
	})
}

fn contains_segment_group(
	container: &UrlSegmentGroup,
	containee: &UrlSegmentGroup,
	containee_paths: &[UrlSegment],
	mode: ParamsMatch,
) -> bool {
	let len = container.segments.len();
	if len > containee_paths.len() {
		let current = &container.segments[..containee_paths.len()];
		equal_path(current, containee_paths)
			&& !containee.has_children()
			&& matrix_params_match(current, containee_paths, mode)
	} else if len == containee_paths.len() {
		if !equal_path(&container.segments, containee_paths)
			|| !matrix_params_match(&container.segments, containee_paths, mode)
		{
			return false;
		}
		containee.children.iter().all(|(name, child)| {
			container
				.children
				.get(name)
				.is_some_and(|other| contains_segment_group(other, child, &child.segments, mode))
		})
	} else {
		let (current, next) = containee_paths.split_at(len);
		if !equal_path(&container.segments, current)
			|| !matrix_params_match(&container.segments, current, mode)
		{
			return false;
		}
		match container.primary() {
			Some(primary) => contains_segment_group(primary, containee, next, mode),
			None => false,
		}
	}
}
