//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reinhardt_navigation::{ActivatedRoute, ComponentRef, Event, RouterOutlet};
use tokio::sync::broadcast;

/// An outlet that records what the router asks it to do.
#[derive(Default)]
pub struct RecordingOutlet {
	pub log: Mutex<Vec<String>>,
	active: Mutex<Option<String>>,
}

impl RecordingOutlet {
	pub fn log(&self) -> Vec<String> {
		self.log.lock().clone()
	}

	pub fn active(&self) -> Option<String> {
		self.active.lock().clone()
	}
}

impl RouterOutlet for RecordingOutlet {
	fn is_activated(&self) -> bool {
		self.active.lock().is_some()
	}

	fn component(&self) -> Option<ComponentRef> {
		self.active.lock().clone().map(|c| Arc::new(c) as ComponentRef)
	}

	fn activate_with(&self, route: Arc<ActivatedRoute>) -> anyhow::Result<()> {
		let name = route.component().map(|c| c.to_string()).unwrap_or_default();
		self.log.lock().push(format!("activate {name}"));
		*self.active.lock() = Some(name);
		Ok(())
	}

	fn deactivate(&self) {
		let previous = self.active.lock().take().unwrap_or_default();
		self.log.lock().push(format!("deactivate {previous}"));
	}

	fn detach(&self) -> Option<ComponentRef> {
		let component = self.component();
		let previous = self.active.lock().take().unwrap_or_default();
		self.log.lock().push(format!("detach {previous}"));
		component
	}

	fn attach(&self, component: ComponentRef, _route: Arc<ActivatedRoute>) {
		let name = component.downcast_ref::<String>().cloned().unwrap_or_default();
		self.log.lock().push(format!("attach {name}"));
		*self.active.lock() = Some(name);
	}
}

/// Events already published.
pub fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
	let mut drained = Vec::new();
	while let Ok(event) = events.try_recv() {
		drained.push(event);
	}
	drained
}

pub fn kinds(events: &[Event]) -> Vec<&'static str> {
	events.iter().map(Event::kind).collect()
}

/// Collects events until `count` terminal events have been seen.
pub async fn wait_for_terminal(events: &mut broadcast::Receiver<Event>, count: usize) -> Vec<Event> {
	let mut seen = Vec::new();
	let mut terminal = 0;
	let collect = async {
		while terminal < count {
			match events.recv().await {
				Ok(event) => {
					if event.is_terminal() {
						terminal += 1;
					}
					seen.push(event);
				}
				Err(broadcast::error::RecvError::Lagged(_)) => {}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	};
	tokio::time::timeout(Duration::from_secs(5), collect)
		.await
		.expect("timed out waiting for navigation events");
	seen
}
