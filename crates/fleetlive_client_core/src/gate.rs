use tracing::debug;

use crate::registry::{FeedKey, FeedRequest};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthState {
	#[default]
	Unauthenticated,
	Authenticating,
	Authenticated,
}

/// What the gate decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
	Send(FeedRequest),
	Buffered,
	Dropped,
}

/// Holds data requests back until the server accepted our credentials.
///
/// Only the latest request per feed is kept. An unsubscribe issued before auth
/// cancels the buffered subscribe for that device: a fresh connection has no
/// server-side subscriptions yet, so there is nothing to undo.
#[derive(Debug, Default)]
pub struct AuthGate {
	state: AuthState,
	pending: Vec<FeedRequest>,
}

impl AuthGate {
	pub fn state(&self) -> AuthState {
		self.state
	}

	pub fn is_authenticated(&self) -> bool {
		self.state == AuthState::Authenticated
	}

	pub fn pending(&self) -> &[FeedRequest] {
		&self.pending
	}

	/// Credentials were sent on a fresh connection.
	pub fn begin(&mut self) {
		self.state = AuthState::Authenticating;
	}

	pub fn admit(&mut self, req: FeedRequest) -> Admission {
		if self.is_authenticated() {
			return Admission::Send(req);
		}

		if let FeedRequest::Unsubscribe(key) = &req {
			let feed = FeedKey::Device(key.clone());
			self.pending.retain(|p| p.feed() != feed);
			debug!(device = %key, "unsubscribe before auth cancels pending subscribe");
			return Admission::Dropped;
		}

		let feed = req.feed();
		match self.pending.iter_mut().find(|p| p.feed() == feed) {
			Some(slot) => {
				debug!(?feed, "superseding pending request");
				*slot = req;
			}
			None => self.pending.push(req),
		}
		Admission::Buffered
	}

	/// Drop a buffered request without replacement.
	pub fn cancel(&mut self, feed: &FeedKey) {
		self.pending.retain(|p| &p.feed() != feed);
	}

	/// Returns the buffered requests in first-buffered order.
	pub fn on_success(&mut self) -> Vec<FeedRequest> {
		self.state = AuthState::Authenticated;
		std::mem::take(&mut self.pending)
	}

	pub fn on_failure(&mut self) {
		self.state = AuthState::Unauthenticated;
		self.pending.clear();
	}

	pub fn reset(&mut self) {
		self.state = AuthState::Unauthenticated;
		self.pending.clear();
	}
}

#[cfg(test)]
mod tests {
	use fleetlive_domain::{DeviceFilter, DeviceKey, StatusFilter};

	use super::*;

	fn key(s: &str) -> DeviceKey {
		DeviceKey::new(s).expect("valid key")
	}

	#[test]
	fn latest_request_per_feed_wins_before_auth() {
		let mut gate = AuthGate::default();
		gate.begin();

		let x = DeviceFilter::default();
		let mut y = DeviceFilter::default();
		y.set_status(StatusFilter::Running);

		assert_eq!(gate.admit(FeedRequest::AllDevices(x)), Admission::Buffered);
		assert_eq!(gate.admit(FeedRequest::JoinChat("c".into())), Admission::Buffered);
		assert_eq!(gate.admit(FeedRequest::AllDevices(y.clone())), Admission::Buffered);

		let flushed = gate.on_success();
		assert_eq!(
			flushed,
			vec![FeedRequest::AllDevices(y), FeedRequest::JoinChat("c".into())]
		);
		assert!(gate.is_authenticated());
		assert!(gate.pending().is_empty());
	}

	#[test]
	fn unsubscribe_before_auth_cancels_pending_subscribe() {
		let mut gate = AuthGate::default();
		gate.admit(FeedRequest::Subscribe(key("1")));
		gate.admit(FeedRequest::Subscribe(key("2")));
		assert_eq!(gate.admit(FeedRequest::Unsubscribe(key("1"))), Admission::Dropped);
		assert_eq!(gate.pending(), &[FeedRequest::Subscribe(key("2"))]);
	}

	#[test]
	fn authenticated_gate_passes_requests_through() {
		let mut gate = AuthGate::default();
		gate.begin();
		gate.on_success();
		let req = FeedRequest::Unsubscribe(key("3"));
		assert_eq!(gate.admit(req.clone()), Admission::Send(req));
	}

	#[test]
	fn failure_and_reset_clear_the_buffer() {
		let mut gate = AuthGate::default();
		gate.begin();
		gate.admit(FeedRequest::FetchChatList);
		gate.on_failure();
		assert_eq!(gate.state(), AuthState::Unauthenticated);
		assert!(gate.pending().is_empty());

		gate.begin();
		gate.admit(FeedRequest::FetchChatList);
		gate.cancel(&FeedKey::ChatList);
		assert!(gate.pending().is_empty());
	}
}
