use std::collections::BTreeSet;

use fleetlive_domain::{DeviceFilter, DeviceKey};
use fleetlive_protocol::ClientMessage;
use tracing::debug;

/// Which device feed the client is streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StreamingMode {
	#[default]
	None,
	All,
	Single,
}

/// A logical feed; the gate keeps at most one pending request per feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKey {
	AllDevices,
	Device(DeviceKey),
	ChatList,
	ChatRoom,
}

/// A request the registry wants on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRequest {
	AllDevices(DeviceFilter),
	Subscribe(DeviceKey),
	Unsubscribe(DeviceKey),
	FetchChatList,
	JoinChat(String),
}

impl FeedRequest {
	pub fn feed(&self) -> FeedKey {
		match self {
			FeedRequest::AllDevices(_) => FeedKey::AllDevices,
			FeedRequest::Subscribe(key) | FeedRequest::Unsubscribe(key) => FeedKey::Device(key.clone()),
			FeedRequest::FetchChatList => FeedKey::ChatList,
			FeedRequest::JoinChat(_) => FeedKey::ChatRoom,
		}
	}

	pub fn to_message(&self) -> ClientMessage {
		match self {
			FeedRequest::AllDevices(filter) => ClientMessage::RequestAllDevices(filter.clone()),
			FeedRequest::Subscribe(key) => ClientMessage::SubscribeDevice {
				id: key.as_str().to_string(),
			},
			FeedRequest::Unsubscribe(key) => ClientMessage::UnsubscribeDevice {
				id: key.as_str().to_string(),
			},
			FeedRequest::FetchChatList => ClientMessage::FetchChatList,
			FeedRequest::JoinChat(chat_id) => ClientMessage::JoinChat {
				chat_id: chat_id.clone(),
			},
		}
	}
}

/// Source of truth for what the client wants the server to stream.
///
/// Every operation returns the requests needed to move the server towards the
/// new want-set; the caller decides whether they are sent, buffered or dropped.
/// After a reconnect, `on_connection_restored` yields the requests that rebuild
/// the want-set on a fresh connection.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
	mode: StreamingMode,
	active_device_ids: BTreeSet<DeviceKey>,
	active_chat_id: Option<String>,
	last_filter: DeviceFilter,
	fulfilled: BTreeSet<FeedKey>,
}

impl SubscriptionRegistry {
	pub fn new(default_filter: DeviceFilter) -> Self {
		Self {
			last_filter: default_filter,
			..Self::default()
		}
	}

	pub fn mode(&self) -> StreamingMode {
		self.mode
	}

	pub fn active_device_ids(&self) -> &BTreeSet<DeviceKey> {
		&self.active_device_ids
	}

	pub fn is_wanted(&self, key: &DeviceKey) -> bool {
		self.active_device_ids.contains(key)
	}

	pub fn active_chat_id(&self) -> Option<&str> {
		self.active_chat_id.as_deref()
	}

	pub fn last_filter(&self) -> &DeviceFilter {
		&self.last_filter
	}

	/// Feeds requested on the current connection.
	pub fn fulfilled(&self) -> &BTreeSet<FeedKey> {
		&self.fulfilled
	}

	pub fn want_all_devices(&mut self, filter: DeviceFilter) -> Vec<FeedRequest> {
		let mut out: Vec<FeedRequest> = std::mem::take(&mut self.active_device_ids)
			.into_iter()
			.map(FeedRequest::Unsubscribe)
			.collect();

		self.mode = StreamingMode::All;
		self.last_filter = filter.clone();
		out.push(FeedRequest::AllDevices(filter));
		out
	}

	/// Already wanted ids are a no-op.
	pub fn want_single_device(&mut self, key: DeviceKey) -> Vec<FeedRequest> {
		if self.active_device_ids.contains(&key) {
			debug!(device = %key, "device already wanted");
			return Vec::new();
		}

		self.active_device_ids.insert(key.clone());
		self.mode = StreamingMode::Single;
		vec![FeedRequest::Subscribe(key)]
	}

	/// Falls back to the all-devices feed once no device is left.
	pub fn unwant_single_device(&mut self, key: &DeviceKey) -> Vec<FeedRequest> {
		if !self.active_device_ids.remove(key) {
			return Vec::new();
		}

		let mut out = vec![FeedRequest::Unsubscribe(key.clone())];
		if self.active_device_ids.is_empty() {
			out.extend(self.want_all_devices(self.last_filter.clone()));
		}
		out
	}

	pub fn unwant_all_single_devices(&mut self) -> Vec<FeedRequest> {
		if self.active_device_ids.is_empty() {
			return Vec::new();
		}
		self.want_all_devices(self.last_filter.clone())
	}

	/// Remember the filter without switching modes (used while tracking devices).
	pub fn remember_filter(&mut self, filter: DeviceFilter) {
		self.last_filter = filter;
	}

	pub fn want_chat(&mut self, chat_id: impl Into<String>) -> Vec<FeedRequest> {
		let chat_id = chat_id.into();
		self.active_chat_id = Some(chat_id.clone());
		vec![FeedRequest::JoinChat(chat_id)]
	}

	pub fn unwant_chat(&mut self) {
		self.active_chat_id = None;
		self.fulfilled.remove(&FeedKey::ChatRoom);
	}

	/// Record that a request reached the socket.
	pub fn mark_sent(&mut self, req: &FeedRequest) {
		match req {
			FeedRequest::Unsubscribe(key) => {
				self.fulfilled.remove(&FeedKey::Device(key.clone()));
			}
			other => {
				self.fulfilled.insert(other.feed());
			}
		}
	}

	/// Requests that rebuild the want-set on a fresh connection.
	pub fn on_connection_restored(&mut self) -> Vec<FeedRequest> {
		self.fulfilled.clear();

		let mut out = Vec::new();
		match self.mode {
			StreamingMode::All => out.push(FeedRequest::AllDevices(self.last_filter.clone())),
			StreamingMode::Single => {
				out.extend(self.active_device_ids.iter().cloned().map(FeedRequest::Subscribe));
			}
			StreamingMode::None => {}
		}
		if let Some(chat_id) = &self.active_chat_id {
			out.push(FeedRequest::JoinChat(chat_id.clone()));
		}
		out
	}

	pub fn on_disconnected(&mut self) {
		self.fulfilled.clear();
	}

	/// Drop every want but keep the last filter.
	pub fn teardown(&mut self) {
		self.mode = StreamingMode::None;
		self.active_device_ids.clear();
		self.active_chat_id = None;
		self.fulfilled.clear();
	}

	pub fn reset(&mut self, default_filter: DeviceFilter) {
		*self = Self::new(default_filter);
	}
}
