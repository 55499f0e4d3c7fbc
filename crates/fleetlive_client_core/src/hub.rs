use fleetlive_domain::{DeviceFilter, DeviceKey, StatusFilter};
use fleetlive_protocol::ClientMessage;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::controller::Intent;
use crate::gate::{Admission, AuthGate};
use crate::mux::{self, FeedEvent};
use crate::registry::{FeedKey, FeedRequest, StreamingMode, SubscriptionRegistry};
use crate::store::chat::ChatStore;
use crate::store::telemetry::{ConnectionStatus, TelemetryStore};
use crate::transport::BoxedTransport;
use crate::{ClientCoreError, is_auth_error_message};

/// What the network task has to act on after an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubOutcome {
	None,
	AuthSucceeded,
	AuthFailed(String),
}

/// Composition root for one client session.
///
/// Owns the subscription registry, the auth gate, both stores and the current
/// transport. Every store operation goes through here, so the registry and
/// the stores are always mutated together.
pub struct TelemetryHub {
	registry: SubscriptionRegistry,
	gate: AuthGate,
	telemetry: TelemetryStore,
	chat: ChatStore,
	transport: Option<BoxedTransport>,
	default_filter: DeviceFilter,
	max_frame_bytes: usize,
}

impl TelemetryHub {
	pub fn new(default_filter: DeviceFilter, max_frame_bytes: usize) -> Self {
		Self {
			registry: SubscriptionRegistry::new(default_filter.clone()),
			gate: AuthGate::default(),
			telemetry: TelemetryStore::new(default_filter.clone()),
			chat: ChatStore::default(),
			transport: None,
			default_filter,
			max_frame_bytes,
		}
	}

	pub fn telemetry(&self) -> &TelemetryStore {
		&self.telemetry
	}

	pub fn chat(&self) -> &ChatStore {
		&self.chat
	}

	pub fn registry(&self) -> &SubscriptionRegistry {
		&self.registry
	}

	pub fn gate(&self) -> &AuthGate {
		&self.gate
	}

	pub fn is_connected(&self) -> bool {
		self.transport.as_ref().is_some_and(|t| t.is_open())
	}

	// Connection lifecycle.

	pub fn on_connecting(&self) {
		self.telemetry.set_status(ConnectionStatus::Connecting);
	}

	pub fn on_reconnect_scheduled(&self, attempt: u32, next_retry_in_ms: u64) {
		self.telemetry.set_status(ConnectionStatus::Reconnecting {
			attempt,
			next_retry_in_ms,
		});
	}

	pub fn on_connect_failed(&self, err: &ClientCoreError) {
		self.telemetry.connection_error(err.to_string());
	}

	/// A socket is up: authenticate, then replay the want-set behind the gate.
	pub fn on_connected(&mut self, transport: BoxedTransport, token: &str) {
		self.transport = Some(transport);
		self.gate.reset();
		self.telemetry.connection_established();

		self.send(&ClientMessage::Authenticate {
			token: token.to_string(),
		});
		self.gate.begin();

		let replay = self.registry.on_connection_restored();
		debug!(requests = replay.len(), "replaying subscriptions");
		self.telemetry.begin_resync();
		self.route_all(replay);
	}

	/// The socket went away on its own.
	pub fn on_connection_lost(&mut self, reason: &str) {
		self.transport = None;
		self.gate.reset();
		self.registry.on_disconnected();
		self.telemetry.connection_lost(ConnectionStatus::Disconnected {
			reason: Some(reason.to_string()),
		});
	}

	/// Close the socket but keep the stores as they are.
	pub fn close_connection(&mut self, reason: &str) {
		if let Some(t) = self.transport.take() {
			info!(%reason, "closing connection");
			t.close(reason);
		}
		self.on_connection_lost(reason);
	}

	/// Close the socket and clear received data. Wants survive and are
	/// replayed on the next connect.
	pub fn disconnect(&mut self, reason: &str) {
		self.close_connection(reason);
		self.telemetry.disconnected(reason);
		self.chat.reset();
		if let Some(chat_id) = self.registry.active_chat_id() {
			self.chat.join(chat_id);
		}
	}

	/// Disconnect and forget everything.
	pub fn logout(&mut self) {
		self.disconnect("logout");
		self.registry.reset(self.default_filter.clone());
		self.gate.reset();
		self.telemetry.reset(self.default_filter.clone());
		self.chat.reset();
		info!("logged out");
	}

	// Device feeds.

	pub fn start_all_devices_stream(&mut self, filter: Option<DeviceFilter>) {
		let filter = filter
			.unwrap_or_else(|| self.registry.last_filter().clone())
			.normalized();
		let reqs = self.registry.want_all_devices(filter.clone());
		self.telemetry.begin_all_devices(filter);
		self.route_all(reqs);
	}

	pub fn set_status_filter(&mut self, status: StatusFilter) {
		self.update_filter(|f| f.set_status(status));
	}

	pub fn set_search_term(&mut self, term: String) {
		self.update_filter(|f| f.set_search_term(term));
	}

	pub fn set_limit(&mut self, limit: u32) {
		self.update_filter(|f| f.set_limit(limit));
	}

	pub fn set_page(&mut self, page: u32) {
		self.update_filter(|f| f.set_page(page));
	}

	pub fn next_page(&mut self) {
		let (page, has_next) = self.telemetry.with(|s| (s.filter.page, s.page_info.has_next_page));
		if has_next {
			self.set_page(page.saturating_add(1));
		}
	}

	pub fn prev_page(&mut self) {
		let page = self.telemetry.with(|s| s.filter.page);
		if page > 1 {
			self.set_page(page - 1);
		}
	}

	/// Re-request the current page.
	pub fn refresh(&mut self) {
		if self.registry.mode() != StreamingMode::All {
			debug!(mode = ?self.registry.mode(), "refresh ignored outside all-devices mode");
			return;
		}
		let filter = self.telemetry.with(|s| s.filter.clone());
		self.start_all_devices_stream(Some(filter));
	}

	// While devices are tracked a new filter is only remembered for the fallback.
	fn update_filter(&mut self, f: impl FnOnce(&mut DeviceFilter)) {
		let mut filter = self.telemetry.with(|s| s.filter.clone());
		f(&mut filter);
		let filter = filter.normalized();

		if self.registry.mode() == StreamingMode::Single {
			self.registry.remember_filter(filter.clone());
			self.telemetry.set_filter(filter);
		} else {
			self.start_all_devices_stream(Some(filter));
		}
	}

	pub fn start_single_device_stream(&mut self, key: DeviceKey) {
		let reqs = self.registry.want_single_device(key.clone());
		if reqs.is_empty() {
			return;
		}
		info!(device = %key, "tracking device");
		self.gate.cancel(&FeedKey::AllDevices);
		self.telemetry.begin_single_device(key);
		self.route_all(reqs);
	}

	pub fn stop_single_device_stream(&mut self, key: &DeviceKey) {
		let reqs = self.registry.unwant_single_device(key);
		let fallback = fallback_filter(&reqs);
		self.telemetry.stop_single_device(key, fallback);
		if !reqs.is_empty() {
			info!(device = %key, "stopped tracking device");
		}
		self.route_all(reqs);
	}

	pub fn stop_all_single_device_streams(&mut self) {
		let reqs = self.registry.unwant_all_single_devices();
		if let Some(filter) = fallback_filter(&reqs) {
			self.telemetry.begin_all_devices(filter);
		}
		self.route_all(reqs);
	}

	pub fn clear_error(&self) {
		self.telemetry.clear_error();
		self.chat.clear_error();
	}

	pub fn clear_device_error(&self, key: &DeviceKey) {
		self.telemetry.clear_device_error(key);
	}

	// Chat.

	pub fn fetch_chat_list(&mut self) {
		self.chat.begin_fetch_list();
		if !self.route(FeedRequest::FetchChatList) {
			self.chat.set_error("not connected");
		}
	}

	pub fn join_chat(&mut self, chat_id: String) {
		self.chat.join(&chat_id);
		let reqs = self.registry.want_chat(chat_id);
		self.route_all(reqs);
	}

	pub fn leave_chat(&mut self) {
		self.registry.unwant_chat();
		self.gate.cancel(&FeedKey::ChatRoom);
		self.chat.leave();
	}

	/// Never buffered: sending before auth is reported as a chat error.
	pub fn send_message(&mut self, chat_id: String, text: String) {
		if text.trim().is_empty() {
			self.chat.set_error("message text must not be empty");
			return;
		}
		if !self.is_connected() || !self.gate.is_authenticated() {
			self.chat.set_error("not connected");
			return;
		}
		if !self.send(&ClientMessage::SendMessage { chat_id, text }) {
			self.chat.set_error("message could not be sent");
		}
	}

	pub fn apply_intent(&mut self, intent: Intent) {
		match intent {
			Intent::StartAllDevices { filter } => self.start_all_devices_stream(filter),
			Intent::SetStatusFilter(status) => self.set_status_filter(status),
			Intent::SetSearchTerm(term) => self.set_search_term(term),
			Intent::SetLimit(limit) => self.set_limit(limit),
			Intent::SetPage(page) => self.set_page(page),
			Intent::NextPage => self.next_page(),
			Intent::PrevPage => self.prev_page(),
			Intent::Refresh => self.refresh(),
			Intent::StartSingleDevice(key) => self.start_single_device_stream(key),
			Intent::StopSingleDevice(key) => self.stop_single_device_stream(&key),
			Intent::StopAllSingleDevices => self.stop_all_single_device_streams(),
			Intent::ClearError => self.clear_error(),
			Intent::ClearDeviceError(key) => self.clear_device_error(&key),
			Intent::FetchChatList => self.fetch_chat_list(),
			Intent::JoinChat(chat_id) => self.join_chat(chat_id),
			Intent::LeaveChat => self.leave_chat(),
			Intent::SendMessage { chat_id, text } => self.send_message(chat_id, text),
		}
	}

	// Inbound.

	/// Decode one text frame and apply it. Bad frames are logged and dropped.
	pub fn handle_text(&mut self, text: &str) -> HubOutcome {
		match mux::decode(text, self.max_frame_bytes) {
			Ok(event) => self.apply(event),
			Err(e) => {
				warn!(error = %e, "dropping inbound frame");
				counter!("fleetlive_client_frames_dropped_total").increment(1);
				HubOutcome::None
			}
		}
	}

	pub fn apply(&mut self, event: FeedEvent) -> HubOutcome {
		debug!(event = event.name(), "inbound event");
		match event {
			FeedEvent::AuthSuccess { role } => {
				info!(role = role.as_deref().unwrap_or("-"), "authenticated");
				self.telemetry.authenticated(role);
				for req in self.gate.on_success() {
					self.send_request(req);
				}
				HubOutcome::AuthSucceeded
			}
			FeedEvent::AuthError { message } => {
				self.fail_auth(&message);
				HubOutcome::AuthFailed(message)
			}
			FeedEvent::AllDevicesData(snapshot) => {
				self.telemetry.apply_snapshot(snapshot);
				HubOutcome::None
			}
			FeedEvent::SingleDeviceData { key, fields } => {
				self.telemetry.apply_single_device(key, fields);
				HubOutcome::None
			}
			FeedEvent::ChatList(chats) => {
				self.chat.apply_chat_list(chats);
				HubOutcome::None
			}
			FeedEvent::ChatHistory { chat_id, messages } => {
				let chat_id = chat_id
					.or_else(|| messages.first().map(|m| m.chat_id.clone()))
					.or_else(|| self.registry.active_chat_id().map(str::to_string));
				match chat_id {
					Some(id) => self.chat.apply_history(&id, messages),
					None => debug!("chat history without a room; dropped"),
				}
				HubOutcome::None
			}
			FeedEvent::NewMessage(message) => {
				self.chat.apply_new_message(message);
				HubOutcome::None
			}
			FeedEvent::Error { message, device } => {
				if let Some(key) = device {
					if !self.registry.is_wanted(&key) {
						debug!(device = %key, %message, "error for untracked device; dropped");
						return HubOutcome::None;
					}
					let err = ClientCoreError::Subscription {
						device: key.clone(),
						message: message.clone(),
					};
					warn!(device = %key, error = %err, "device subscription failed");
					self.telemetry.record_device_error(&key, message);
					return HubOutcome::None;
				}
				if is_auth_error_message(&message) {
					self.fail_auth(&message);
					return HubOutcome::AuthFailed(message);
				}
				warn!(%message, "server error");
				self.telemetry.set_error(message);
				HubOutcome::None
			}
		}
	}

	/// Terminal auth failure: every subscription is now invalid server-side.
	pub fn fail_auth(&mut self, message: &str) {
		warn!(%message, "authentication failed");
		self.gate.on_failure();
		self.registry.teardown();
		self.telemetry.auth_failed(message);
		self.chat.leave();
	}

	// Outbound.

	fn route_all(&mut self, reqs: Vec<FeedRequest>) {
		for req in reqs {
			self.route(req);
		}
	}

	/// Returns false when the request went nowhere.
	fn route(&mut self, req: FeedRequest) -> bool {
		if !self.is_connected() {
			debug!(feed = ?req.feed(), "not connected; request dropped");
			return false;
		}
		match self.gate.admit(req) {
			Admission::Send(req) => self.send_request(req),
			Admission::Buffered | Admission::Dropped => true,
		}
	}

	fn send_request(&mut self, req: FeedRequest) -> bool {
		let sent = self.send(&req.to_message());
		if sent {
			self.registry.mark_sent(&req);
		}
		sent
	}

	fn send(&self, msg: &ClientMessage) -> bool {
		let Some(t) = self.transport.as_ref().filter(|t| t.is_open()) else {
			warn!(event = msg.event_name(), "socket closed; dropping outbound message");
			return false;
		};
		match t.send(msg) {
			Ok(()) => {
				debug!(event = msg.event_name(), "sent");
				true
			}
			Err(e) => {
				warn!(event = msg.event_name(), error = %e, "send failed");
				false
			}
		}
	}
}

fn fallback_filter(reqs: &[FeedRequest]) -> Option<DeviceFilter> {
	reqs.iter().find_map(|r| match r {
		FeedRequest::AllDevices(f) => Some(f.clone()),
		_ => None,
	})
}
