//! History integration tests
//!
//! Checks how navigations write to the location, how popstate events are
//! turned into navigations, and how cancelled navigations restore history.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{drain, wait_for_terminal};
use reinhardt_navigation::{
	CanceledNavigationResolution, Event, Location, MemoryLocation, NavigationExtras, NavigationTrigger, Route,
	Router, RouterOptions, UrlUpdateStrategy,
};
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn location() -> Arc<MemoryLocation> {
	Arc::new(MemoryLocation::new("/"))
}

fn routes() -> Vec<Route> {
	vec![
		Route::new("a").component("A"),
		Route::new("b").component("B"),
		Route::new("denied").component("Denied").can_activate(|_, _| false.into()),
	]
}

fn router_with(location: &Arc<MemoryLocation>, options: RouterOptions, routes: Vec<Route>) -> Router {
	Router::builder(routes)
		.location(location.clone())
		.options(options)
		.build()
		.unwrap()
}

/// Test: Each navigation pushes an entry carrying its id
#[rstest]
#[tokio::test]
async fn test_navigations_push_entries(location: Arc<MemoryLocation>) {
	let router = router_with(&location, RouterOptions::default(), routes());

	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());
	assert!(router.navigate_by_url("/b", NavigationExtras::default()).await.unwrap());

	assert_eq!(location.urls(), vec!["/", "/a", "/b"]);
	let state = location.get_state().unwrap();
	assert_eq!(state.navigation_id, Some(2));
	assert_eq!(state.router_page_id, None);
}

/// Test: replaceUrl replaces the current entry and extra state is stored
#[rstest]
#[tokio::test]
async fn test_replace_url_with_state(location: Arc<MemoryLocation>) {
	let router = router_with(&location, RouterOptions::default(), routes());
	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());

	let extras = NavigationExtras {
		replace_url: true,
		state: Some(json!({"from": "test"}).as_object().cloned().unwrap()),
		..NavigationExtras::default()
	};
	assert!(router.navigate_by_url("/b", extras).await.unwrap());

	assert_eq!(location.urls(), vec!["/", "/b"]);
	assert_eq!(location.get_state().unwrap().extra.get("from"), Some(&json!("test")));
}

/// Test: skipLocationChange navigates without touching history
#[rstest]
#[tokio::test]
async fn test_skip_location_change(location: Arc<MemoryLocation>) {
	let router = router_with(&location, RouterOptions::default(), routes());
	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());
	assert!(router.navigate_by_url("/b", NavigationExtras::skip_location_change()).await.unwrap());

	assert_eq!(router.url(), "/b");
	assert_eq!(location.path(false), "/a");
	assert_eq!(location.len(), 2);
}

/// Test: A rejected navigation leaves the location untouched
#[rstest]
#[case(UrlUpdateStrategy::Deferred)]
#[case(UrlUpdateStrategy::Eager)]
#[tokio::test]
async fn test_rejected_navigation_restores_url(location: Arc<MemoryLocation>, #[case] strategy: UrlUpdateStrategy) {
	let options = RouterOptions {
		url_update_strategy: strategy,
		..RouterOptions::default()
	};
	let router = router_with(&location, options, routes());
	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());

	assert!(!router.navigate_by_url("/denied", NavigationExtras::default()).await.unwrap());
	assert_eq!(router.url(), "/a");
	assert_eq!(location.path(false), "/a");
}

/// Test: Eager updates write the URL before guards run
#[rstest]
#[tokio::test]
async fn test_eager_url_update(location: Arc<MemoryLocation>) {
	let seen = Arc::new(parking_lot::Mutex::new(None));
	let probe = location.clone();
	let record = seen.clone();
	let options = RouterOptions {
		url_update_strategy: UrlUpdateStrategy::Eager,
		..RouterOptions::default()
	};
	let router = router_with(
		&location,
		options,
		vec![Route::new("a").component("A").can_activate(move |_, _| {
			*record.lock() = Some(probe.path(false));
			true.into()
		})],
	);

	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());
	assert_eq!(seen.lock().as_deref(), Some("/a"));
	assert_eq!(location.urls(), vec!["/", "/a"]);
}

/// Test: Going back triggers a popstate navigation that replaces the entry
#[rstest]
#[tokio::test]
async fn test_popstate_navigates(location: Arc<MemoryLocation>) {
	let router = router_with(&location, RouterOptions::default(), routes());
	router.set_up_location_change_listener();
	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());
	assert!(router.navigate_by_url("/b", NavigationExtras::default()).await.unwrap());
	let mut events = router.events();

	location.back();
	let events = wait_for_terminal(&mut events, 1).await;

	assert_eq!(router.url(), "/a");
	assert_eq!(location.urls(), vec!["/", "/a", "/b"]);
	assert_eq!(location.index(), 1);
	let start = events.iter().find_map(|e| match e {
		Event::NavigationStart {
			trigger, restored_state, ..
		} => Some((*trigger, restored_state.as_ref().and_then(|s| s.navigation_id))),
		_ => None,
	});
	assert_eq!(start, Some((NavigationTrigger::PopState, Some(1))));
}

/// Test: A popstate repeating the navigation that just ran is ignored
#[rstest]
#[tokio::test]
async fn test_popstate_for_current_navigation_is_ignored(location: Arc<MemoryLocation>) {
	let router = router_with(&location, RouterOptions::default(), routes());
	router.set_up_location_change_listener();
	let mut events = router.events();
	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());

	location.simulate_pop_state();
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;

	let events = drain(&mut events);
	let starts: Vec<u64> = events
		.iter()
		.filter(|e| e.kind() == "NavigationStart")
		.filter_map(Event::navigation_id)
		.collect();
	assert_eq!(starts, vec![1]);
	assert_eq!(router.url(), "/a");
	assert_eq!(router.last_successful_navigation().map(|n| n.id), Some(1));
	assert_eq!(location.urls(), vec!["/", "/a"]);
}

/// Test: A hash change starts a navigation
#[rstest]
#[tokio::test]
async fn test_hash_change_navigates(location: Arc<MemoryLocation>) {
	let router = router_with(&location, RouterOptions::default(), routes());
	router.set_up_location_change_listener();
	let mut events = router.events();

	location.simulate_hash_change("/b");
	let events = wait_for_terminal(&mut events, 1).await;
	assert_eq!(router.url(), "/b");
	assert!(matches!(
		events.first(),
		Some(Event::NavigationStart {
			trigger: NavigationTrigger::HashChange,
			..
		})
	));
}

/// Test: The initial navigation follows the location and replaces its entry
#[rstest]
#[tokio::test]
async fn test_initial_navigation() {
	let location = Arc::new(MemoryLocation::new("/b"));
	let router = router_with(&location, RouterOptions::default(), routes());

	let pending = router.initial_navigation().unwrap();
	assert!(pending.await.unwrap());
	assert_eq!(router.url(), "/b");
	assert_eq!(location.len(), 1);
	assert!(router.initial_navigation().is_none());
}

/// Test: In computed mode a rejected back navigation moves history forward again
#[rstest]
#[tokio::test]
async fn test_computed_resolution_restores_history(location: Arc<MemoryLocation>) {
	let allow_a = Arc::new(AtomicBool::new(true));
	let flag = allow_a.clone();
	let options = RouterOptions {
		canceled_navigation_resolution: CanceledNavigationResolution::Computed,
		..RouterOptions::default()
	};
	let router = router_with(
		&location,
		options,
		vec![
			Route::new("a")
				.component("A")
				.can_activate(move |_, _| flag.load(Ordering::SeqCst).into()),
			Route::new("b").component("B"),
		],
	);
	router.set_up_location_change_listener();
	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());
	assert!(router.navigate_by_url("/b", NavigationExtras::default()).await.unwrap());
	assert_eq!(location.get_state().and_then(|s| s.router_page_id), Some(2));

	allow_a.store(false, Ordering::SeqCst);
	let mut events = router.events();
	location.back();
	let events = wait_for_terminal(&mut events, 2).await;

	let terminal: Vec<&str> = events.iter().filter(|e| e.is_terminal()).map(Event::kind).collect();
	assert_eq!(terminal, vec!["NavigationCancel", "NavigationEnd"]);
	assert_eq!(router.url(), "/b");
	assert_eq!(location.path(false), "/b");
	assert_eq!(location.index(), 2);
}

/// Test: Scroll events carry the last successful navigation id
#[rstest]
#[tokio::test]
async fn test_publish_scroll(location: Arc<MemoryLocation>) {
	let router = router_with(&location, RouterOptions::default(), routes());
	assert!(router.navigate_by_url("/a", NavigationExtras::default()).await.unwrap());
	let mut events = router.events();

	router.publish_scroll(Some((0.0, 120.0)), None);
	assert!(matches!(
		drain(&mut events).as_slice(),
		[Event::Scroll {
			navigation_id: 1,
			position: Some(_),
			anchor: None
		}]
	));
}
