#![forbid(unsafe_code)]

use core::fmt;

use fleetlive_domain::{Chat, DeviceFilter, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events;

/// Messages the client sends to the backend.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
	Authenticate {
		token: String,
	},
	RequestAllDevices(DeviceFilter),
	SubscribeDevice {
		id: String,
	},
	UnsubscribeDevice {
		id: String,
	},
	FetchChatList,
	JoinChat {
		#[serde(rename = "chatId")]
		chat_id: String,
	},
	SendMessage {
		#[serde(rename = "chatId")]
		chat_id: String,
		text: String,
	},
}

impl ClientMessage {
	/// Wire discriminator.
	pub const fn event_name(&self) -> &'static str {
		match self {
			ClientMessage::Authenticate { .. } => events::AUTHENTICATE,
			ClientMessage::RequestAllDevices(_) => events::REQUEST_ALL_DEVICES,
			ClientMessage::SubscribeDevice { .. } => events::SUBSCRIBE_DEVICE,
			ClientMessage::UnsubscribeDevice { .. } => events::UNSUBSCRIBE_DEVICE,
			ClientMessage::FetchChatList => events::FETCH_CHAT_LIST,
			ClientMessage::JoinChat { .. } => events::JOIN_CHAT,
			ClientMessage::SendMessage { .. } => events::SEND_MESSAGE,
		}
	}
}

impl fmt::Debug for ClientMessage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ClientMessage::Authenticate { .. } => write!(f, "ClientMessage::Authenticate {{ token: <redacted> }}"),
			ClientMessage::RequestAllDevices(filter) => {
				write!(
					f,
					"ClientMessage::RequestAllDevices {{ page: {}, limit: {}, filter: {}, search_term: {:?} }}",
					filter.page, filter.limit, filter.filter, filter.search_term
				)
			}
			ClientMessage::SubscribeDevice { id } => write!(f, "ClientMessage::SubscribeDevice {{ id: {} }}", id),
			ClientMessage::UnsubscribeDevice { id } => write!(f, "ClientMessage::UnsubscribeDevice {{ id: {} }}", id),
			ClientMessage::FetchChatList => write!(f, "ClientMessage::FetchChatList"),
			ClientMessage::JoinChat { chat_id } => write!(f, "ClientMessage::JoinChat {{ chat_id: {} }}", chat_id),
			ClientMessage::SendMessage { chat_id, text } => {
				write!(
					f,
					"ClientMessage::SendMessage {{ chat_id: {}, text_len: {} }}",
					chat_id,
					text.len()
				)
			}
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthSuccessPayload {
	#[serde(default)]
	pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthErrorPayload {
	#[serde(default)]
	pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatListPayload {
	#[serde(default)]
	pub chats: Vec<Chat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatHistoryPayload {
	#[serde(rename = "chatId", default)]
	pub chat_id: Option<String>,
	#[serde(default)]
	pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewMessagePayload {
	pub message: Message,
}

/// Generic `error` event. A device id, when present, scopes the error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorPayload {
	#[serde(default)]
	pub message: String,
	#[serde(default)]
	pub id: Option<Value>,
	#[serde(rename = "deviceId", default)]
	pub device_id: Option<Value>,
}

impl ErrorPayload {
	/// Raw device id, `deviceId` taking precedence over `id`.
	pub fn device_id(&self) -> Option<&Value> {
		self.device_id.as_ref().or(self.id.as_ref()).filter(|v| !v.is_null())
	}
}
