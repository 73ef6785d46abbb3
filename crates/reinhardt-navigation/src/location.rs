//! Browser history abstraction.
//!
//! The router only needs a small contract from the history service: read
//! the current path and state, push or replace entries, move by a relative
//! offset, and be told when the user moves through history. [`MemoryLocation`]
//! implements it over an in-memory stack.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::events::NavigationTrigger;

/// State object stored in every history entry written by the router.
///
/// Serialises as `{ "navigationId": n, "routerPageId": p, ...extra }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub navigation_id: Option<u64>,
	/// Position of the entry in history. Only written in computed mode.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub router_page_id: Option<i64>,
	/// Caller supplied state.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HistoryState {
	pub fn with_extra(extra: serde_json::Map<String, serde_json::Value>) -> Self {
		Self {
			extra,
			..Self::default()
		}
	}
}

/// The user moved through history or changed the hash.
#[derive(Debug, Clone, PartialEq)]
pub struct PopStateEvent {
	/// The path now displayed, including query and hash.
	pub url: String,
	/// The state of the entry now displayed.
	pub state: Option<HistoryState>,
	/// `PopState` or `HashChange`.
	pub trigger: NavigationTrigger,
}

/// History service used by the router.
pub trait Location: Send + Sync {
	/// The current path with its query, and its hash when `include_hash`.
	fn path(&self, include_hash: bool) -> String;

	/// The state of the current entry.
	fn get_state(&self) -> Option<HistoryState>;

	fn is_current_path_equal_to(&self, path: &str, query: &str) -> bool;

	/// Pushes a new entry.
	fn go(&self, path: &str, query: &str, state: HistoryState);

	/// Replaces the current entry.
	fn replace_state(&self, path: &str, query: &str, state: HistoryState);

	/// Moves through history by a relative offset.
	fn history_go(&self, delta: i64);

	/// Pop-state and hash-change notifications.
	fn subscribe(&self) -> broadcast::Receiver<PopStateEvent>;
}

fn join_query(path: &str, query: &str) -> String {
	match query.strip_prefix('?').unwrap_or(query) {
		"" => path.to_string(),
		query => format!("{path}?{query}"),
	}
}

fn normalize(path: &str) -> &str {
	match path.strip_suffix('/') {
		Some("") | None => path,
		Some(stripped) => stripped,
	}
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
	url: String,
	state: Option<HistoryState>,
}

#[derive(Debug)]
struct Stack {
	entries: Vec<Entry>,
	index: usize,
}

/// An in-memory history stack.
///
/// ```
/// use reinhardt_navigation::location::{HistoryState, Location, MemoryLocation};
///
/// let location = MemoryLocation::new("/");
/// location.go("/a", "", HistoryState::default());
/// location.go("/b", "x=1", HistoryState::default());
/// assert_eq!(location.path(false), "/b?x=1");
/// location.back();
/// assert_eq!(location.path(false), "/a");
/// ```
#[derive(Debug)]
pub struct MemoryLocation {
	stack: Mutex<Stack>,
	events: broadcast::Sender<PopStateEvent>,
}

impl Default for MemoryLocation {
	fn default() -> Self {
		Self::new("/")
	}
}

impl MemoryLocation {
	pub fn new(initial_url: impl Into<String>) -> Self {
		let (events, _) = broadcast::channel(64);
		Self {
			stack: Mutex::new(Stack {
				entries: vec![Entry {
					url: initial_url.into(),
					state: None,
				}],
				index: 0,
			}),
			events,
		}
	}

	pub fn back(&self) {
		self.history_go(-1);
	}

	pub fn forward(&self) {
		self.history_go(1);
	}

	/// Number of entries in the stack.
	pub fn len(&self) -> usize {
		self.stack.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Index of the displayed entry.
	pub fn index(&self) -> usize {
		self.stack.lock().index
	}

	/// URLs of all entries, oldest first.
	pub fn urls(&self) -> Vec<String> {
		self.stack.lock().entries.iter().map(|e| e.url.clone()).collect()
	}

	/// Simulates the user editing the hash: pushes an entry without state and
	/// emits a hash change.
	pub fn simulate_hash_change(&self, url: impl Into<String>) {
		let url = url.into();
		self.push(Entry {
			url: url.clone(),
			state: None,
		});
		let _ = self.events.send(PopStateEvent {
			url,
			state: None,
			trigger: NavigationTrigger::HashChange,
		});
	}

	/// Emits a popstate for the displayed entry without moving, as browsers
	/// do on page load.
	pub fn simulate_pop_state(&self) {
		let entry = {
			let stack = self.stack.lock();
			stack.entries[stack.index].clone()
		};
		let _ = self.events.send(PopStateEvent {
			url: entry.url,
			state: entry.state,
			trigger: NavigationTrigger::PopState,
		});
	}

	fn push(&self, entry: Entry) {
		let mut stack = self.stack.lock();
		let next = stack.index + 1;
		stack.entries.truncate(next);
		stack.entries.push(entry);
		stack.index = next;
	}
}

impl Location for MemoryLocation {
	fn path(&self, include_hash: bool) -> String {
		let stack = self.stack.lock();
		let url = &stack.entries[stack.index].url;
		if include_hash {
			url.clone()
		} else {
			url.split('#').next().unwrap_or_default().to_string()
		}
	}

	fn get_state(&self) -> Option<HistoryState> {
		let stack = self.stack.lock();
		stack.entries[stack.index].state.clone()
	}

	fn is_current_path_equal_to(&self, path: &str, query: &str) -> bool {
		let expected = join_query(path, query);
		normalize(&self.path(false)) == normalize(&expected)
	}

	fn go(&self, path: &str, query: &str, state: HistoryState) {
		self.push(Entry {
			url: join_query(path, query),
			state: Some(state),
		});
	}

	fn replace_state(&self, path: &str, query: &str, state: HistoryState) {
		let mut stack = self.stack.lock();
		let index = stack.index;
		stack.entries[index] = Entry {
			url: join_query(path, query),
			state: Some(state),
		};
	}

	fn history_go(&self, delta: i64) {
		let entry = {
			let mut stack = self.stack.lock();
			let last = stack.entries.len() as i64 - 1;
			let target = (stack.index as i64 + delta).clamp(0, last) as usize;
			if target == stack.index {
				return;
			}
			stack.index = target;
			stack.entries[target].clone()
		};
		tracing::debug!(url = %entry.url, delta, "history moved");
		let _ = self.events.send(PopStateEvent {
			url: entry.url,
			state: entry.state,
			trigger: NavigationTrigger::PopState,
		});
	}

	fn subscribe(&self) -> broadcast::Receiver<PopStateEvent> {
		self.events.subscribe()
	}
}
