use fleetlive_domain::{DeviceFilter, StatusFilter};
use fleetlive_protocol::{
	AuthSuccessPayload, ChatHistoryPayload, ClientMessage, DEFAULT_MAX_FRAME_SIZE, ErrorPayload, ProtocolError,
	decode_frame, encode_message, encode_message_default,
};
use proptest::prelude::*;
use serde_json::{Value, json};

#[test]
fn request_all_devices_encodes_filter_fields() {
	let msg = ClientMessage::RequestAllDevices(DeviceFilter {
		page: 2,
		limit: 10,
		filter: StatusFilter::Overspeed,
		search_term: "KA-01".to_string(),
	});

	let text = encode_message_default(&msg).expect("encode");
	let v: Value = serde_json::from_str(&text).expect("json");
	assert_eq!(
		v,
		json!({
			"event": "request-all-devices",
			"data": {"page": 2, "limit": 10, "filter": "overspeed", "searchTerm": "KA-01"}
		})
	);
}

#[test]
fn unit_and_renamed_messages_use_kebab_case_discriminators() {
	let text = encode_message_default(&ClientMessage::FetchChatList).expect("encode");
	let v: Value = serde_json::from_str(&text).expect("json");
	assert_eq!(v["event"], "fetch-chat-list");

	let text = encode_message_default(&ClientMessage::SendMessage {
		chat_id: "c9".to_string(),
		text: "on my way".to_string(),
	})
	.expect("encode");
	let v: Value = serde_json::from_str(&text).expect("json");
	assert_eq!(v, json!({"event": "send-message", "data": {"chatId": "c9", "text": "on my way"}}));
}

#[test]
fn authenticate_debug_output_hides_token() {
	let msg = ClientMessage::Authenticate {
		token: "super-secret".to_string(),
	};
	let dbg = format!("{msg:?}");
	assert!(!dbg.contains("super-secret"));
	assert_eq!(msg.event_name(), "authenticate");
}

#[test]
fn encode_rejects_oversized_frames() {
	let msg = ClientMessage::SendMessage {
		chat_id: "c".to_string(),
		text: "x".repeat(64),
	};
	match encode_message(&msg, 16) {
		Err(ProtocolError::FrameTooLarge { len, max }) => {
			assert!(len > max);
			assert_eq!(max, 16);
		}
		other => panic!("unexpected result: {other:?}"),
	}
}

#[test]
fn decode_rejects_oversized_and_malformed_frames() {
	let big = format!("{{\"event\":\"error\",\"data\":{{\"message\":\"{}\"}}}}", "y".repeat(64));
	assert!(matches!(decode_frame(&big, 32), Err(ProtocolError::FrameTooLarge { .. })));
	assert!(matches!(
		decode_frame("not json", DEFAULT_MAX_FRAME_SIZE),
		Err(ProtocolError::Malformed(_))
	));
	assert!(matches!(
		decode_frame(r#"{"event":"  "}"#, DEFAULT_MAX_FRAME_SIZE),
		Err(ProtocolError::Malformed(_))
	));
}

#[test]
fn missing_payload_decodes_as_empty_object() {
	let frame = decode_frame(r#"{"event":"auth-success"}"#, DEFAULT_MAX_FRAME_SIZE).expect("decode");
	let p: AuthSuccessPayload = frame.payload().expect("payload");
	assert_eq!(p.role, None);
}

#[test]
fn payload_errors_name_the_event() {
	let frame = decode_frame(r#"{"event":"chat-history","data":{"messages":5}}"#, DEFAULT_MAX_FRAME_SIZE)
		.expect("decode");
	match frame.payload::<ChatHistoryPayload>() {
		Err(ProtocolError::InvalidPayload { event, .. }) => assert_eq!(event, "chat-history"),
		other => panic!("unexpected result: {other:?}"),
	}
}

#[test]
fn error_payload_prefers_device_id_over_id() {
	let frame = decode_frame(
		r#"{"event":"error","data":{"message":"no such device","id":1,"deviceId":"42"}}"#,
		DEFAULT_MAX_FRAME_SIZE,
	)
	.expect("decode");
	let p: ErrorPayload = frame.payload().expect("payload");
	assert_eq!(p.device_id(), Some(&json!("42")));

	let frame = decode_frame(r#"{"event":"error","data":{"message":"boom"}}"#, DEFAULT_MAX_FRAME_SIZE).expect("decode");
	let p: ErrorPayload = frame.payload().expect("payload");
	assert_eq!(p.device_id(), None);
}

proptest! {
	#[test]
	fn decode_never_panics_on_arbitrary_text(s in ".{0,256}") {
		let _ = decode_frame(&s, DEFAULT_MAX_FRAME_SIZE);
	}
}
