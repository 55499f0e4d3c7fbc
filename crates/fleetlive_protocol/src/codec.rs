#![forbid(unsafe_code)]

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::messages::ClientMessage;

/// Default maximum text frame size.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 2 * 1024 * 1024; // 2 MiB

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},

	#[error("malformed frame: {0}")]
	Malformed(String),

	#[error("unknown event: {0}")]
	UnknownEvent(String),

	#[error("invalid {event} payload: {detail}")]
	InvalidPayload {
		event: String,
		detail: String,
	},

	#[error("{event} payload carries no device id")]
	MissingDeviceKey {
		event: String,
	},

	#[error("encode error: {0}")]
	Encode(String),
}

/// One inbound event: discriminator plus an untyped payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Frame {
	pub event: String,
	#[serde(default)]
	pub data: Value,
}

impl Frame {
	pub fn new(event: impl Into<String>, data: Value) -> Self {
		Self {
			event: event.into(),
			data,
		}
	}

	/// Decode the payload into `T`. A missing payload decodes as `{}`.
	pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
		let data = match &self.data {
			Value::Null => Value::Object(Map::new()),
			other => other.clone(),
		};
		serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
			event: self.event.clone(),
			detail: e.to_string(),
		})
	}

	/// Payload as a JSON object (single-device feeds are schemaless).
	pub fn object(&self) -> Result<Map<String, Value>, ProtocolError> {
		match &self.data {
			Value::Object(map) => Ok(map.clone()),
			other => Err(ProtocolError::InvalidPayload {
				event: self.event.clone(),
				detail: format!("expected object, got {}", json_kind(other)),
			}),
		}
	}
}

fn json_kind(v: &Value) -> &'static str {
	match v {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

/// Decode one text frame.
pub fn decode_frame(text: &str, max_frame_size: usize) -> Result<Frame, ProtocolError> {
	if text.len() > max_frame_size {
		return Err(ProtocolError::FrameTooLarge {
			len: text.len(),
			max: max_frame_size,
		});
	}

	let frame: Frame = serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
	if frame.event.trim().is_empty() {
		return Err(ProtocolError::Malformed("empty event discriminator".to_string()));
	}
	Ok(frame)
}

/// Encode an outbound message into a text frame.
pub fn encode_message(msg: &ClientMessage, max_frame_size: usize) -> Result<String, ProtocolError> {
	let text = serde_json::to_string(msg).map_err(|e| ProtocolError::Encode(e.to_string()))?;
	if text.len() > max_frame_size {
		return Err(ProtocolError::FrameTooLarge {
			len: text.len(),
			max: max_frame_size,
		});
	}
	Ok(text)
}

/// Encode using `DEFAULT_MAX_FRAME_SIZE`.
pub fn encode_message_default(msg: &ClientMessage) -> Result<String, ProtocolError> {
	encode_message(msg, DEFAULT_MAX_FRAME_SIZE)
}
