#![forbid(unsafe_code)]

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use fleetlive_client_core::backend::ConnectFuture;
use fleetlive_client_core::{
	ClientConfig, ClientCoreError, Connection, ConnectionStatus, DeviceService, Inbound, StreamingMode, build_networking,
};
use fleetlive_protocol::ClientMessage;
use fleetlive_util::secret::SecretString;
use support::{Wire, init_test_logging, subscribe};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const AUTH_OK: &str = r#"{"event":"auth-success","data":{"role":"viewer"}}"#;

/// Client side of one accepted fake connection.
struct Peer {
	wire: Wire,
	inbound: mpsc::UnboundedSender<Inbound>,
}

impl Peer {
	fn push(&self, text: &str) {
		self.inbound.send(Inbound::Text(text.to_string())).expect("client reader alive");
	}
}

struct Harness {
	service: DeviceService,
	peers: mpsc::UnboundedReceiver<Peer>,
	shutdown: Option<oneshot::Sender<()>>,
	task: JoinHandle<()>,
}

impl Harness {
	/// Network task whose first `fail_first` connect attempts are refused.
	fn start(cfg: &ClientConfig, fail_first: u32) -> Self {
		init_test_logging();
		let (service, task, shutdown) = build_networking(cfg);
		let (peer_tx, peers) = mpsc::unbounded_channel();
		let failures = Arc::new(AtomicU32::new(fail_first));

		let connector = move |_cfg: Box<ClientConfig>| -> ConnectFuture {
			let peer_tx = peer_tx.clone();
			let failures = failures.clone();
			Box::pin(async move {
				if failures
					.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
					.is_ok()
				{
					return Err(ClientCoreError::Connection("connection refused".into()));
				}
				let wire = Wire::new();
				let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
				let transport = wire.transport();
				let _ = peer_tx.send(Peer {
					wire,
					inbound: inbound_tx,
				});
				Ok(Connection {
					transport,
					inbound: inbound_rx,
				})
			})
		};

		let task = tokio::spawn(task.run_with_connector(connector));
		Self {
			service,
			peers,
			shutdown: Some(shutdown),
			task,
		}
	}

	async fn next_peer(&mut self) -> Peer {
		timeout(Duration::from_secs(2), self.peers.recv())
			.await
			.expect("timed out waiting for a connection")
			.expect("connector dropped")
	}

	async fn no_peer_within(&mut self, d: Duration) {
		if let Ok(Some(_)) = timeout(d, self.peers.recv()).await {
			panic!("unexpected connection attempt");
		}
	}

	fn connect_in_background(&self, cfg: &ClientConfig) -> JoinHandle<Result<(), ClientCoreError>> {
		let service = self.service.clone();
		let cfg = cfg.clone();
		tokio::spawn(async move { service.connect(cfg).await })
	}

	async fn stop(mut self) {
		if let Some(tx) = self.shutdown.take() {
			let _ = tx.send(());
		}
		timeout(Duration::from_secs(2), self.task)
			.await
			.expect("network task did not stop")
			.expect("network task panicked");
	}
}

fn test_config() -> ClientConfig {
	ClientConfig {
		auth_token: Some(SecretString::new("test-token")),
		auth_token_path: None,
		reconnect_min_delay: Duration::from_millis(10),
		reconnect_max_delay: Duration::from_millis(40),
		..ClientConfig::default()
	}
}

async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
	for _ in 0..200 {
		if cond() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("condition not met: {what}");
}

fn sent_auth(wire: &Wire) -> bool {
	wire.sent()
		.first()
		.is_some_and(|m| matches!(m, ClientMessage::Authenticate { token } if token == "test-token"))
}

#[tokio::test]
async fn connect_resolves_after_auth_success() {
	let cfg = test_config();
	let mut h = Harness::start(&cfg, 0);
	let pending = h.connect_in_background(&cfg);

	let peer = h.next_peer().await;
	wait_for("credentials sent", || sent_auth(&peer.wire)).await;
	assert!(!pending.is_finished());

	peer.push(AUTH_OK);
	pending.await.unwrap().unwrap();

	let state = h.service.telemetry_snapshot();
	assert!(state.is_authenticated);
	assert_eq!(state.role.as_deref(), Some("viewer"));
	assert_eq!(state.status, ConnectionStatus::Connected);

	h.service.connect(cfg.clone()).await.unwrap();
	h.no_peer_within(Duration::from_millis(100)).await;
	h.stop().await;
}

#[tokio::test]
async fn dropped_socket_reconnects_and_replays_devices() {
	let cfg = test_config();
	let mut h = Harness::start(&cfg, 0);
	let pending = h.connect_in_background(&cfg);
	let peer = h.next_peer().await;
	peer.push(AUTH_OK);
	pending.await.unwrap().unwrap();

	h.service.start_single_device_stream("42").await.unwrap();
	wait_for("subscribe sent", || peer.wire.sent().contains(&subscribe("42"))).await;

	peer.inbound
		.send(Inbound::Closed {
			reason: "reset by peer".into(),
		})
		.unwrap();

	let peer = h.next_peer().await;
	wait_for("credentials resent", || sent_auth(&peer.wire)).await;
	assert_eq!(peer.wire.sent().len(), 1);

	peer.push(AUTH_OK);
	wait_for("subscription replayed", || peer.wire.sent().contains(&subscribe("42"))).await;
	assert!(!peer.wire.sent().iter().any(|m| matches!(m, ClientMessage::RequestAllDevices(_))));

	let state = h.service.telemetry_snapshot();
	assert!(state.active_single_devices.iter().any(|k| k.as_str() == "42"));
	h.stop().await;
}

#[tokio::test]
async fn auth_error_fails_connect_and_stops_retrying() {
	let cfg = test_config();
	let mut h = Harness::start(&cfg, 0);
	let pending = h.connect_in_background(&cfg);
	let peer = h.next_peer().await;

	peer.push(r#"{"event":"auth-error","data":{"message":"invalid token"}}"#);
	let err = pending.await.unwrap().unwrap_err();
	assert!(matches!(err, ClientCoreError::Auth(ref m) if m == "invalid token"));
	assert!(err.is_terminal());

	h.no_peer_within(Duration::from_millis(150)).await;
	assert!(!peer.wire.is_open());
	let state = h.service.telemetry_snapshot();
	assert!(!state.is_authenticated);
	assert_eq!(state.error.as_deref(), Some("invalid token"));
	h.stop().await;
}

#[tokio::test]
async fn refused_connect_is_reported_then_retried() {
	let cfg = test_config();
	let mut h = Harness::start(&cfg, 1);

	let err = h.service.connect(cfg.clone()).await.unwrap_err();
	assert!(matches!(err, ClientCoreError::Connection(_)));

	let peer = h.next_peer().await;
	wait_for("credentials sent", || sent_auth(&peer.wire)).await;
	peer.push(AUTH_OK);
	let service = h.service.clone();
	wait_for("authenticated after retry", move || service.telemetry_snapshot().is_authenticated).await;
	h.stop().await;
}

#[tokio::test]
async fn disconnect_answers_a_pending_connect() {
	let cfg = test_config();
	let mut h = Harness::start(&cfg, 0);
	let pending = h.connect_in_background(&cfg);
	let peer = h.next_peer().await;
	wait_for("credentials sent", || sent_auth(&peer.wire)).await;

	h.service.disconnect("user").await.unwrap();
	let err = pending.await.unwrap().unwrap_err();
	assert!(matches!(err, ClientCoreError::Connection(_)));
	assert!(!peer.wire.is_open());

	h.no_peer_within(Duration::from_millis(100)).await;
	assert!(!h.service.telemetry_snapshot().is_connected);
	h.stop().await;
}

#[tokio::test]
async fn missing_token_fails_without_dialing() {
	let cfg = ClientConfig {
		auth_token: None,
		..test_config()
	};
	let mut h = Harness::start(&cfg, 0);
	h.service.start_single_device_stream("9").await.unwrap();

	let err = h.service.connect(cfg.clone()).await.unwrap_err();
	assert!(matches!(err, ClientCoreError::Auth(_)));
	h.no_peer_within(Duration::from_millis(100)).await;

	let state = h.service.telemetry_snapshot();
	assert!(!state.is_authenticated);
	assert_eq!(state.streaming_mode, StreamingMode::None);
	assert!(state.active_single_devices.is_empty());
	assert!(state.error.as_deref().is_some_and(|e| e.contains("no auth token")));
	h.stop().await;
}

async fn wait_for_reconnect_attempt(service: &DeviceService) -> u32 {
	let mut attempt = None;
	wait_for("reconnect scheduled", || {
		if let ConnectionStatus::Reconnecting { attempt: a, .. } = service.telemetry_snapshot().status {
			attempt = Some(a);
		}
		attempt.is_some()
	})
	.await;
	attempt.unwrap_or_default()
}

#[tokio::test]
async fn backoff_restarts_after_each_authenticated_session() {
	let cfg = ClientConfig {
		reconnect_min_delay: Duration::from_millis(300),
		reconnect_max_delay: Duration::from_secs(2),
		..test_config()
	};
	let mut h = Harness::start(&cfg, 0);
	let pending = h.connect_in_background(&cfg);
	let mut peer = h.next_peer().await;
	peer.push(AUTH_OK);
	pending.await.unwrap().unwrap();

	for _ in 0..3 {
		peer.inbound
			.send(Inbound::Closed {
				reason: "reset by peer".into(),
			})
			.unwrap();
		assert_eq!(wait_for_reconnect_attempt(&h.service).await, 1);

		peer = h.next_peer().await;
		peer.push(AUTH_OK);
		let service = h.service.clone();
		wait_for("authenticated again", move || service.telemetry_snapshot().is_authenticated).await;
	}
	h.stop().await;
}
