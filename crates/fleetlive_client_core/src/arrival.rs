//! Bus-stop arrival inference from geofence enter/exit events.

use std::collections::HashMap;

use fleetlive_domain::{GeofenceEvent, GeofenceEventType, RouteStop, StopStatus};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::debug;

#[derive(Default)]
struct Seen<'a> {
	enter: Option<(usize, &'a str)>,
	exit: Option<(usize, &'a str)>,
}

/// Per-stop status for `route`, from a chronological event list.
///
/// The last ENTER and the last EXIT per geofence win. A stop is current when
/// it was entered and not exited afterwards; only the first such stop in route
/// order is marked current.
pub fn infer_stop_statuses(route: &[RouteStop], events: &[GeofenceEvent]) -> Vec<StopStatus> {
	let mut seen: HashMap<&str, Seen<'_>> = HashMap::new();
	for (pos, ev) in events.iter().enumerate() {
		let slot = seen.entry(ev.geofence_id.as_str()).or_default();
		let mark = Some((pos, ev.created_at.as_str()));
		match ev.event_type {
			GeofenceEventType::Enter => slot.enter = mark,
			GeofenceEventType::Exit => slot.exit = mark,
		}
	}

	let mut current_taken = false;
	route
		.iter()
		.map(|stop| {
			let s = seen.get(stop.geofence_id.as_str());
			let enter = s.and_then(|s| s.enter);
			let exit = s.and_then(|s| s.exit);

			let inside = match (enter, exit) {
				(Some((entered, _)), Some((exited, _))) => entered > exited,
				(Some(_), None) => true,
				_ => false,
			};
			let is_current = inside && !current_taken;
			current_taken |= is_current;

			StopStatus {
				geofence_id: stop.geofence_id.clone(),
				name: stop.name.clone(),
				entered_at: enter.map(|(_, at)| at.to_string()),
				exited_at: exit.map(|(_, at)| at.to_string()),
				has_arrived: exit.is_some(),
				is_current,
			}
		})
		.collect()
}

/// SHA-256 over the route ids and every event's id, type and timestamp.
pub fn input_signature(route: &[RouteStop], events: &[GeofenceEvent]) -> [u8; 32] {
	let mut h = Sha256::new();
	for stop in route {
		h.update(stop.geofence_id.as_bytes());
		h.update([0x1f]);
	}
	h.update([0x1e]);
	for ev in events {
		h.update(ev.geofence_id.as_bytes());
		h.update([0x1f]);
		h.update(ev.event_type.as_str().as_bytes());
		h.update([0x1f]);
		h.update(ev.created_at.as_bytes());
		h.update([0x1e]);
	}
	let mut out = [0u8; 32];
	out.copy_from_slice(&h.finalize());
	out
}

/// Publishes stop statuses, skipping inputs it has already seen.
#[derive(Debug)]
pub struct ArrivalTracker {
	tx: watch::Sender<Vec<StopStatus>>,
	last_signature: Option<[u8; 32]>,
}

impl Default for ArrivalTracker {
	fn default() -> Self {
		let (tx, _rx) = watch::channel(Vec::new());
		Self {
			tx,
			last_signature: None,
		}
	}
}

impl ArrivalTracker {
	pub fn subscribe(&self) -> watch::Receiver<Vec<StopStatus>> {
		self.tx.subscribe()
	}

	pub fn statuses(&self) -> Vec<StopStatus> {
		self.tx.borrow().clone()
	}

	/// Returns false when the input matches the previous one.
	pub fn apply(&mut self, route: &[RouteStop], events: &[GeofenceEvent]) -> bool {
		let signature = input_signature(route, events);
		if self.last_signature == Some(signature) {
			debug!("arrival input unchanged");
			return false;
		}
		self.last_signature = Some(signature);

		let statuses = infer_stop_statuses(route, events);
		self.tx.send_if_modified(|cur| {
			if *cur == statuses {
				return false;
			}
			*cur = statuses;
			true
		})
	}
}
