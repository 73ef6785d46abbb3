//! Conversion between URL strings and [`UrlTree`]s.
//!
//! The default format:
//!
//! ```text
//! /inbox/33;open=true/(popup:compose//sidebar:chat)?debug=true#top
//! ```
//!
//! - segments are separated by `/`
//! - matrix parameters follow a segment as `;key=value`
//! - secondary outlets are written inside parentheses as `name:path`, separated by `//`
//! - query parameters and the fragment follow the usual syntax

use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::error::MalformedUriError;
use crate::url_tree::{
	PRIMARY_OUTLET, Params, QueryParams, QueryValue, UrlSegment, UrlSegmentGroup, UrlTree,
};

/// Parses and serializes URLs.
///
/// Implementations must round-trip: `parse(serialize(t))` equals `t` for any
/// well-formed tree.
pub trait UrlSerializer: Send + Sync {
	/// Parses a URL string.
	///
	/// # Errors
	///
	/// Returns [`MalformedUriError`] when the string is not a valid URL, most
	/// commonly because of invalid percent-encoding.
	fn parse(&self, url: &str) -> Result<UrlTree, MalformedUriError>;

	/// Serializes a tree back into a URL string.
	fn serialize(&self, tree: &UrlTree) -> String;
}

/// The standard URL format.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUrlSerializer;

impl UrlSerializer for DefaultUrlSerializer {
	fn parse(&self, url: &str) -> Result<UrlTree, MalformedUriError> {
		let mut parser = UrlParser::new(url);
		let root = parser.parse_root_segment()?;
		let query_params = parser.parse_query_params()?;
		let fragment = parser.parse_fragment()?;
		Ok(UrlTree::new(root, query_params, fragment))
	}

	fn serialize(&self, tree: &UrlTree) -> String {
		let segment = format!("/{}", serialize_segment(&tree.root, true));
		let query = serialize_query_params(&tree.query_params);
		let fragment = tree
			.fragment
			.as_deref()
			.map(|f| format!("#{}", encode_uri_fragment(f)))
			.unwrap_or_default();
		format!("{segment}{query}{fragment}")
	}
}

/// Characters left alone by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'-')
	.remove(b'_')
	.remove(b'.')
	.remove(b'!')
	.remove(b'~')
	.remove(b'*')
	.remove(b'\'')
	.remove(b'(')
	.remove(b')');

const URI_STRING: &AsciiSet = &URI_COMPONENT
	.remove(b'@')
	.remove(b':')
	.remove(b'$')
	.remove(b',');

const URI_QUERY: &AsciiSet = &URI_STRING.remove(b';');

const URI_SEGMENT: &AsciiSet = &URI_STRING.add(b'(').add(b')').remove(b'&');

/// Characters left alone by `encodeURI`.
const URI_FRAGMENT: &AsciiSet = &URI_COMPONENT
	.remove(b';')
	.remove(b',')
	.remove(b'/')
	.remove(b'?')
	.remove(b':')
	.remove(b'@')
	.remove(b'&')
	.remove(b'=')
	.remove(b'+')
	.remove(b'$')
	.remove(b'#');

/// Encodes a string for use in the path or the fragment.
pub fn encode_uri_string(s: &str) -> String {
	utf8_percent_encode(s, URI_STRING).to_string()
}

/// Encodes a query parameter key or value.
pub fn encode_uri_query(s: &str) -> String {
	utf8_percent_encode(s, URI_QUERY).to_string()
}

/// Encodes a path segment or a matrix parameter.
pub fn encode_uri_segment(s: &str) -> String {
	utf8_percent_encode(s, URI_SEGMENT).to_string()
}

/// Encodes a fragment.
pub fn encode_uri_fragment(s: &str) -> String {
	utf8_percent_encode(s, URI_FRAGMENT).to_string()
}

/// Strict percent-decoding: every `%` must start a valid escape and the
/// result must be UTF-8.
pub fn decode(s: &str) -> Result<String, MalformedUriError> {
	let bytes = s.as_bytes();
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let valid = bytes.len() > i + 2
				&& bytes[i + 1].is_ascii_hexdigit()
				&& bytes[i + 2].is_ascii_hexdigit();
			if !valid {
				return Err(MalformedUriError::new(s, "invalid percent-encoding"));
			}
			i += 3;
		} else {
			i += 1;
		}
	}
	percent_decode_str(s)
		.decode_utf8()
		.map(|decoded| decoded.into_owned())
		.map_err(|_| MalformedUriError::new(s, "percent-encoded bytes are not valid UTF-8"))
}

/// Decodes a query key or value, treating `+` as a space.
pub fn decode_query(s: &str) -> Result<String, MalformedUriError> {
	decode(&s.replace('+', "%20"))
}

/// Serializes one segment with its matrix parameters.
pub fn serialize_path(segment: &UrlSegment) -> String {
	format!(
		"{}{}",
		encode_uri_segment(&segment.path),
		serialize_matrix_params(&segment.parameters)
	)
}

/// Serializes the segments of a group, ignoring its children.
pub fn serialize_paths(group: &UrlSegmentGroup) -> String {
	group
		.segments
		.iter()
		.map(serialize_path)
		.collect::<Vec<_>>()
		.join("/")
}

fn serialize_matrix_params(params: &Params) -> String {
	params
		.iter()
		.map(|(key, value)| format!(";{}={}", encode_uri_segment(key), encode_uri_segment(value)))
		.collect()
}

fn serialize_query_params(params: &QueryParams) -> String {
	let parts: Vec<String> = params
		.iter()
		.map(|(name, value)| {
			let name = encode_uri_query(name);
			value
				.all()
				.into_iter()
				.map(|v| format!("{name}={}", encode_uri_query(v)))
				.collect::<Vec<_>>()
				.join("&")
		})
		.filter(|part| !part.is_empty())
		.collect();
	if parts.is_empty() {
		String::new()
	} else {
		format!("?{}", parts.join("&"))
	}
}

/// Children rendered primary first, secondary outlets afterwards in order.
fn children_in_order(group: &UrlSegmentGroup) -> Vec<(&String, &UrlSegmentGroup)> {
	let mut primary = Vec::with_capacity(group.children.len());
	let mut others = Vec::new();
	for (name, child) in &group.children {
		if name == PRIMARY_OUTLET {
			primary.push((name, child));
		} else {
			others.push((name, child));
		}
	}
	primary.extend(others);
	primary
}

fn serialize_segment(group: &UrlSegmentGroup, root: bool) -> String {
	if !group.has_children() {
		return serialize_paths(group);
	}

	if root {
		let primary = group
			.primary()
			.map(|p| serialize_segment(p, false))
			.unwrap_or_default();
		let secondary: Vec<String> = group
			.children
			.iter()
			.filter(|(name, _)| name.as_str() != PRIMARY_OUTLET)
			.map(|(name, child)| format!("{name}:{}", serialize_segment(child, false)))
			.collect();
		if secondary.is_empty() {
			primary
		} else {
			format!("{primary}({})", secondary.join("//"))
		}
	} else {
		let children: Vec<String> = children_in_order(group)
			.into_iter()
			.map(|(name, child)| {
				if name == PRIMARY_OUTLET {
					serialize_segment(child, false)
				} else {
					format!("{name}:{}", serialize_segment(child, false))
				}
			})
			.collect();
		if group.children.len() == 1 && group.primary().is_some() {
			format!("{}/{}", serialize_paths(group), children[0])
		} else {
			format!("{}/({})", serialize_paths(group), children.join("//"))
		}
	}
}

fn take_until(s: &str, stop: impl Fn(char) -> bool) -> &str {
	match s.find(stop) {
		Some(idx) => &s[..idx],
		None => s,
	}
}

fn match_segments(s: &str) -> &str {
	take_until(s, |c| matches!(c, '/' | '(' | ')' | '?' | ';' | '#'))
}

fn match_matrix_key_segments(s: &str) -> &str {
	take_until(s, |c| matches!(c, '/' | '(' | ')' | '?' | ';' | '=' | '#'))
}

fn match_query_params(s: &str) -> &str {
	take_until(s, |c| matches!(c, '=' | '?' | '&' | '#'))
}

fn match_url_query_param_value(s: &str) -> &str {
	take_until(s, |c| matches!(c, '&' | '#'))
}

struct UrlParser<'a> {
	url: &'a str,
	remaining: &'a str,
}

impl<'a> UrlParser<'a> {
	fn new(url: &'a str) -> Self {
		Self {
			url,
			remaining: url,
		}
	}

	fn parse_root_segment(&mut self) -> Result<UrlSegmentGroup, MalformedUriError> {
		self.consume_optional("/");
		if self.remaining.is_empty() || self.peek_starts_with("?") || self.peek_starts_with("#") {
			return Ok(UrlSegmentGroup::empty());
		}
		// the root group never carries segments itself
		Ok(UrlSegmentGroup::new(Vec::new(), self.parse_children()?))
	}

	fn parse_query_params(&mut self) -> Result<QueryParams, MalformedUriError> {
		let mut params = QueryParams::new();
		if self.consume_optional("?") {
			loop {
				self.parse_query_param(&mut params)?;
				if !self.consume_optional("&") {
					break;
				}
			}
		}
		Ok(params)
	}

	fn parse_fragment(&mut self) -> Result<Option<String>, MalformedUriError> {
		if self.consume_optional("#") {
			decode(self.remaining).map(Some)
		} else {
			Ok(None)
		}
	}

	fn parse_children(&mut self) -> Result<IndexMap<String, UrlSegmentGroup>, MalformedUriError> {
		if self.remaining.is_empty() {
			return Ok(IndexMap::new());
		}

		self.consume_optional("/");

		let mut segments = Vec::new();
		if !self.peek_starts_with("(") {
			segments.push(self.parse_segment()?);
		}

		while self.peek_starts_with("/") && !self.peek_starts_with("//") && !self.peek_starts_with("/(") {
			self.capture("/")?;
			segments.push(self.parse_segment()?);
		}

		let mut children = IndexMap::new();
		if self.peek_starts_with("/(") {
			self.capture("/")?;
			children = self.parse_parens(true)?;
		}

		let mut res = IndexMap::new();
		if self.peek_starts_with("(") {
			res = self.parse_parens(false)?;
		}

		if !segments.is_empty() || !children.is_empty() {
			res.shift_insert(0, PRIMARY_OUTLET.to_string(), UrlSegmentGroup::new(segments, children));
		}
		Ok(res)
	}

	fn parse_segment(&mut self) -> Result<UrlSegment, MalformedUriError> {
		let path = match_segments(self.remaining);
		if path.is_empty() && self.peek_starts_with(";") {
			return Err(MalformedUriError::new(
				self.url,
				format!("empty path url segment cannot have parameters: '{}'", self.remaining),
			));
		}
		self.capture(path)?;
		let path = decode(path)?;
		Ok(UrlSegment::new(path, self.parse_matrix_params()?))
	}

	fn parse_matrix_params(&mut self) -> Result<Params, MalformedUriError> {
		let mut params = Params::new();
		while self.consume_optional(";") {
			self.parse_param(&mut params)?;
		}
		Ok(params)
	}

	fn parse_param(&mut self, params: &mut Params) -> Result<(), MalformedUriError> {
		let key = match_matrix_key_segments(self.remaining);
		if key.is_empty() {
			return Ok(());
		}
		self.capture(key)?;
		let mut value = "";
		if self.consume_optional("=") {
			let matched = match_segments(self.remaining);
			if !matched.is_empty() {
				value = matched;
				self.capture(value)?;
			}
		}
		params.insert(decode(key)?, decode(value)?);
		Ok(())
	}

	fn parse_query_param(&mut self, params: &mut QueryParams) -> Result<(), MalformedUriError> {
		let key = match_query_params(self.remaining);
		if key.is_empty() {
			return Ok(());
		}
		self.capture(key)?;
		let mut value = "";
		if self.consume_optional("=") {
			let matched = match_url_query_param_value(self.remaining);
			if !matched.is_empty() {
				value = matched;
				self.capture(value)?;
			}
		}
		let key = decode_query(key)?;
		let value = decode_query(value)?;
		match params.get_mut(&key) {
			Some(existing) => existing.push(value),
			None => {
				params.insert(key, QueryValue::Single(value));
			}
		}
		Ok(())
	}

	fn parse_parens(&mut self, allow_primary: bool) -> Result<IndexMap<String, UrlSegmentGroup>, MalformedUriError> {
		let mut segments = IndexMap::new();
		self.capture("(")?;

		while !self.consume_optional(")") && !self.remaining.is_empty() {
			let path = match_segments(self.remaining);
			let next = self.remaining[path.len()..].chars().next();
			// anything else means an unescaped character or an unclosed group
			if !matches!(next, Some('/' | ')' | ';')) {
				return Err(MalformedUriError::new(self.url, "cannot parse url"));
			}

			let outlet_name = match path.find(':') {
				Some(idx) => {
					let name = &path[..idx];
					self.capture(name)?;
					self.capture(":")?;
					name.to_string()
				}
				None if allow_primary => PRIMARY_OUTLET.to_string(),
				None => {
					return Err(MalformedUriError::new(
						self.url,
						format!("missing outlet name in '{}'", self.remaining),
					));
				}
			};

			let mut children = self.parse_children()?;
			let group = if children.len() == 1 && children.contains_key(PRIMARY_OUTLET) {
				children.swap_remove(PRIMARY_OUTLET).unwrap_or_default()
			} else {
				UrlSegmentGroup::new(Vec::new(), children)
			};
			segments.insert(outlet_name, group);
			self.consume_optional("//");
		}
		Ok(segments)
	}

	fn peek_starts_with(&self, s: &str) -> bool {
		self.remaining.starts_with(s)
	}

	fn consume_optional(&mut self, s: &str) -> bool {
		match self.remaining.strip_prefix(s) {
			Some(rest) => {
				self.remaining = rest;
				true
			}
			None => false,
		}
	}

	fn capture(&mut self, s: &str) -> Result<(), MalformedUriError> {
		if self.consume_optional(s) {
			Ok(())
		} else {
			Err(MalformedUriError::new(self.url, format!("expected \"{s}\"")))
		}
	}
}
