use fleetlive_domain::{Chat, DeviceKey, DeviceSnapshot, Message};
use fleetlive_protocol::{
	AuthErrorPayload, AuthSuccessPayload, ChatHistoryPayload, ChatListPayload, ErrorPayload, Frame, NewMessagePayload,
	ProtocolError, decode_frame, events,
};
use serde_json::{Map, Value};

/// Device id fields, in lookup order.
const DEVICE_KEY_FIELDS: [&str; 2] = ["uniqueId", "imei"];

/// One inbound server event, decoded and normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
	AuthSuccess {
		role: Option<String>,
	},
	AuthError {
		message: String,
	},
	AllDevicesData(DeviceSnapshot),
	SingleDeviceData {
		key: DeviceKey,
		fields: Map<String, Value>,
	},
	ChatList(Vec<Chat>),
	ChatHistory {
		chat_id: Option<String>,
		messages: Vec<Message>,
	},
	NewMessage(Message),
	Error {
		message: String,
		device: Option<DeviceKey>,
	},
}

impl FeedEvent {
	pub fn name(&self) -> &'static str {
		match self {
			FeedEvent::AuthSuccess { .. } => events::AUTH_SUCCESS,
			FeedEvent::AuthError { .. } => events::AUTH_ERROR,
			FeedEvent::AllDevicesData(_) => events::ALL_DEVICES_DATA,
			FeedEvent::SingleDeviceData { .. } => events::SINGLE_DEVICE_DATA,
			FeedEvent::ChatList(_) => events::CHAT_LIST,
			FeedEvent::ChatHistory { .. } => events::CHAT_HISTORY,
			FeedEvent::NewMessage(_) => events::NEW_MESSAGE,
			FeedEvent::Error { .. } => events::ERROR,
		}
	}
}

/// Decode and route one text frame.
pub fn decode(text: &str, max_frame_size: usize) -> Result<FeedEvent, ProtocolError> {
	dispatch(decode_frame(text, max_frame_size)?)
}

/// Route a frame to exactly one event kind.
pub fn dispatch(frame: Frame) -> Result<FeedEvent, ProtocolError> {
	let event = match frame.event.as_str() {
		events::AUTH_SUCCESS => {
			let p: AuthSuccessPayload = frame.payload()?;
			FeedEvent::AuthSuccess { role: p.role }
		}
		events::AUTH_ERROR => {
			let p: AuthErrorPayload = frame.payload()?;
			FeedEvent::AuthError { message: p.message }
		}
		events::ALL_DEVICES_DATA => FeedEvent::AllDevicesData(frame.payload()?),
		events::SINGLE_DEVICE_DATA => {
			let fields = frame.object()?;
			let key = device_key(&fields).ok_or_else(|| ProtocolError::MissingDeviceKey {
				event: frame.event.clone(),
			})?;
			FeedEvent::SingleDeviceData { key, fields }
		}
		events::CHAT_LIST => {
			let p: ChatListPayload = frame.payload()?;
			FeedEvent::ChatList(p.chats)
		}
		events::CHAT_HISTORY => {
			let p: ChatHistoryPayload = frame.payload()?;
			FeedEvent::ChatHistory {
				chat_id: p.chat_id,
				messages: p.messages,
			}
		}
		events::NEW_MESSAGE => {
			let p: NewMessagePayload = frame.payload()?;
			FeedEvent::NewMessage(p.message)
		}
		events::ERROR => {
			let p: ErrorPayload = frame.payload()?;
			let device = p.device_id().and_then(|v| DeviceKey::from_json(v).ok());
			FeedEvent::Error {
				message: p.message,
				device,
			}
		}
		_ => return Err(ProtocolError::UnknownEvent(frame.event)),
	};
	Ok(event)
}

fn device_key(fields: &Map<String, Value>) -> Option<DeviceKey> {
	DEVICE_KEY_FIELDS
		.iter()
		.filter_map(|name| fields.get(*name))
		.find_map(|v| DeviceKey::from_json(v).ok())
}
