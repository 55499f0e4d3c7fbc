#![forbid(unsafe_code)]

use fleetlive_domain::{DeviceKey, ParseIdError};
use fleetlive_protocol::ProtocolError;

pub mod arrival;
pub mod backend;
pub mod collab;
pub mod config;
pub mod controller;
pub mod gate;
pub mod hub;
pub mod mux;
pub mod reconnect;
pub mod registry;
pub mod store;
pub mod transport;

pub use arrival::{ArrivalTracker, infer_stop_statuses};
pub use backend::{NetworkTask, build_networking, spawn_network_task, start_networking};
pub use config::{ClientConfig, load_client_config, load_client_config_from_path};
pub use controller::{DeviceService, Intent, NetCommand, ShutdownHandle};
pub use gate::{Admission, AuthGate, AuthState};
pub use hub::{HubOutcome, TelemetryHub};
pub use mux::FeedEvent;
pub use registry::{FeedKey, FeedRequest, StreamingMode, SubscriptionRegistry};
pub use store::chat::{ChatState, ChatStore};
pub use store::telemetry::{ConnectionStatus, TelemetryState, TelemetryStore};
pub use transport::{BoxedTransport, Connection, Inbound, Transport};

/// Errors for client core operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientCoreError {
	/// Socket could not be opened or was lost. Retried by the network task.
	#[error("connection error: {0}")]
	Connection(String),

	/// Credentials rejected or missing. Terminal until `connect()` is called again.
	#[error("authentication failed: {0}")]
	Auth(String),

	/// Malformed or unknown inbound frame; dropped.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	/// Server rejected one device subscription.
	#[error("subscription error for device {device}: {message}")]
	Subscription { device: DeviceKey, message: String },

	/// Invalid device id or filter value.
	#[error(transparent)]
	InvalidId(#[from] ParseIdError),

	/// Invalid configuration.
	#[error("config error: {0}")]
	Config(String),

	/// The network task has stopped.
	#[error("network task is not running")]
	NotRunning,
}

impl ClientCoreError {
	/// Auth failures are not retried automatically.
	pub fn is_terminal(&self) -> bool {
		matches!(self, ClientCoreError::Auth(_) | ClientCoreError::Config(_))
	}
}

impl From<anyhow::Error> for ClientCoreError {
	fn from(e: anyhow::Error) -> Self {
		ClientCoreError::Config(format!("{e:#}"))
	}
}

/// True when an error string refers to authentication.
pub fn is_auth_error_message(message: &str) -> bool {
	let m = message.to_ascii_lowercase();
	["auth", "forbidden", "token", "jwt"].iter().any(|p| m.contains(p))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auth_patterns_match_common_backend_messages() {
		assert!(is_auth_error_message("Authentication failed"));
		assert!(is_auth_error_message("Unauthorized"));
		assert!(is_auth_error_message("jwt expired"));
		assert!(is_auth_error_message("Invalid token"));
		assert!(!is_auth_error_message("device 42 not found"));
	}

	#[test]
	fn only_auth_and_config_errors_are_terminal() {
		assert!(ClientCoreError::Auth("x".into()).is_terminal());
		assert!(!ClientCoreError::Connection("x".into()).is_terminal());
	}
}
