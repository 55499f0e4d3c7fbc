#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use fleetlive_client_core::{ClientCoreError, Transport};
use fleetlive_domain::DeviceKey;
use fleetlive_protocol::ClientMessage;

static LOG_INIT: OnceLock<()> = OnceLock::new();

pub fn init_test_logging() {
	LOG_INIT.get_or_init(|| {
		if std::env::var_os("FLEETLIVE_TEST_LOG").is_none() {
			return;
		}

		let _ = tracing_subscriber::fmt()
			.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
			.with_target(false)
			.try_init();
	});
}

/// What a fake socket saw the client write.
#[derive(Clone)]
pub struct Wire {
	sent: Arc<Mutex<Vec<ClientMessage>>>,
	open: Arc<AtomicBool>,
}

impl Wire {
	pub fn new() -> Self {
		Self {
			sent: Arc::new(Mutex::new(Vec::new())),
			open: Arc::new(AtomicBool::new(true)),
		}
	}

	pub fn transport(&self) -> Box<dyn Transport> {
		Box::new(FakeTransport(self.clone()))
	}

	/// Drain everything sent so far.
	pub fn take(&self) -> Vec<ClientMessage> {
		std::mem::take(&mut *self.sent.lock().unwrap())
	}

	pub fn sent(&self) -> Vec<ClientMessage> {
		self.sent.lock().unwrap().clone()
	}

	pub fn is_open(&self) -> bool {
		self.open.load(Ordering::Acquire)
	}
}

struct FakeTransport(Wire);

impl Transport for FakeTransport {
	fn send(&self, msg: &ClientMessage) -> Result<(), ClientCoreError> {
		if !self.0.is_open() {
			return Err(ClientCoreError::Connection("closed".into()));
		}
		self.0.sent.lock().unwrap().push(msg.clone());
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.0.is_open()
	}

	fn close(&self, _reason: &str) {
		self.0.open.store(false, Ordering::Release);
	}
}

pub fn key(s: &str) -> DeviceKey {
	DeviceKey::new(s).expect("valid key")
}

pub fn subscribe(id: &str) -> ClientMessage {
	ClientMessage::SubscribeDevice { id: id.to_string() }
}

pub fn unsubscribe(id: &str) -> ClientMessage {
	ClientMessage::UnsubscribeDevice { id: id.to_string() }
}
