#![forbid(unsafe_code)]

pub mod codec;
pub mod messages;

pub use codec::{DEFAULT_MAX_FRAME_SIZE, Frame, ProtocolError, decode_frame, encode_message, encode_message_default};
pub use messages::{
	AuthErrorPayload, AuthSuccessPayload, ChatHistoryPayload, ChatListPayload, ClientMessage, ErrorPayload,
	NewMessagePayload,
};

/// Event discriminators used on the wire.
pub mod events {
	pub const AUTHENTICATE: &str = "authenticate";
	pub const AUTH_SUCCESS: &str = "auth-success";
	pub const AUTH_ERROR: &str = "auth-error";
	pub const REQUEST_ALL_DEVICES: &str = "request-all-devices";
	pub const ALL_DEVICES_DATA: &str = "all-devices-data";
	pub const SUBSCRIBE_DEVICE: &str = "subscribe-device";
	pub const UNSUBSCRIBE_DEVICE: &str = "unsubscribe-device";
	pub const SINGLE_DEVICE_DATA: &str = "single-device-data";
	pub const FETCH_CHAT_LIST: &str = "fetch-chat-list";
	pub const CHAT_LIST: &str = "chat-list";
	pub const JOIN_CHAT: &str = "join-chat";
	pub const CHAT_HISTORY: &str = "chat-history";
	pub const SEND_MESSAGE: &str = "send-message";
	pub const NEW_MESSAGE: &str = "new-message";
	pub const ERROR: &str = "error";
}
