use std::future::Future;
use std::pin::Pin;

use metrics::counter;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ClientCoreError;
use crate::config::ClientConfig;
use crate::controller::{DeviceService, NetCommand, ShutdownHandle};
use crate::hub::{HubOutcome, TelemetryHub};
use crate::reconnect::{next_attempt, schedule_reconnect};
use crate::transport::{Connection, Inbound, connect_websocket};

pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Connection, ClientCoreError>> + Send>>;

type ConnectReply = oneshot::Sender<Result<(), ClientCoreError>>;

/// The network task: owns the hub and drives it from one `select!` loop.
pub struct NetworkTask {
	cmd_rx: mpsc::Receiver<NetCommand>,
	hub: TelemetryHub,
	shutdown_rx: oneshot::Receiver<()>,
}

/// Channels plus a task that still has to be spawned.
pub fn build_networking(cfg: &ClientConfig) -> (DeviceService, NetworkTask, oneshot::Sender<()>) {
	let (cmd_tx, cmd_rx) = mpsc::channel::<NetCommand>(128);
	let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

	let hub = TelemetryHub::new(cfg.default_filter(), cfg.max_frame_bytes);
	let service = DeviceService::new(cmd_tx, hub.telemetry().subscribe(), hub.chat().subscribe());

	(
		service,
		NetworkTask {
			cmd_rx,
			hub,
			shutdown_rx,
		},
		shutdown_tx,
	)
}

/// Run the network task on the caller's runtime.
pub fn spawn_network_task(cfg: &ClientConfig) -> (DeviceService, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
	let (service, task, shutdown_tx) = build_networking(cfg);
	let handle = tokio::spawn(task.run());
	(service, shutdown_tx, handle)
}

/// Run the network task on a dedicated thread with its own runtime.
pub fn start_networking(cfg: &ClientConfig) -> Result<(DeviceService, ShutdownHandle), ClientCoreError> {
	let (service, task, shutdown_tx) = build_networking(cfg);

	let rt = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.worker_threads(2)
		.thread_name("fleetlive-network-worker")
		.build()
		.map_err(|e| ClientCoreError::Connection(format!("failed to build tokio runtime for networking: {e}")))?;

	let join_handle = std::thread::Builder::new()
		.name("fleetlive-network".to_string())
		.spawn(move || rt.block_on(task.run()))
		.map_err(|e| ClientCoreError::Connection(format!("failed to spawn network thread: {e}")))?;

	Ok((service, ShutdownHandle::new(shutdown_tx, join_handle)))
}

impl NetworkTask {
	pub fn new(cmd_rx: mpsc::Receiver<NetCommand>, hub: TelemetryHub, shutdown_rx: oneshot::Receiver<()>) -> Self {
		Self {
			cmd_rx,
			hub,
			shutdown_rx,
		}
	}

	pub async fn run(self) {
		self.run_with_connector(|cfg| Box::pin(async move { connect_websocket(&cfg).await }))
			.await;
	}

	/// Same loop with an injectable socket factory.
	pub async fn run_with_connector<F>(self, connect_fn: F)
	where
		F: FnMut(Box<ClientConfig>) -> ConnectFuture,
	{
		let NetworkTask {
			mut cmd_rx,
			hub,
			mut shutdown_rx,
		} = self;

		let mut backend = Backend {
			hub,
			connect_fn,
			inbound: None,
			last_connect_cfg: None,
			reconnect_attempt: 0,
			reconnect_deadline: None,
			last_successful_connect_time: None,
			pending_connect: Vec::new(),
		};

		loop {
			let deadline = backend.reconnect_deadline;
			tokio::select! {
				_ = &mut shutdown_rx => {
					backend.stop("shutdown");
					break;
				}

				cmd = cmd_rx.recv() => {
					let Some(cmd) = cmd else {
						backend.stop("controller dropped");
						break;
					};
					backend.handle_command(cmd).await;
				}

				inbound = recv_inbound(&mut backend.inbound) => {
					backend.handle_inbound(inbound);
				}

				_ = async {
					if let Some(deadline) = deadline {
						tokio::time::sleep_until(deadline).await;
					}
				}, if deadline.is_some() => {
					backend.reconnect_deadline = None;
					backend.open().await;
				}
			}
		}
	}
}

async fn recv_inbound(rx: &mut Option<mpsc::UnboundedReceiver<Inbound>>) -> Inbound {
	match rx {
		Some(rx) => rx.recv().await.unwrap_or_else(|| Inbound::Closed {
			reason: "reader stopped".to_string(),
		}),
		None => std::future::pending().await,
	}
}

struct Backend<F> {
	hub: TelemetryHub,
	connect_fn: F,
	inbound: Option<mpsc::UnboundedReceiver<Inbound>>,
	last_connect_cfg: Option<ClientConfig>,
	reconnect_attempt: u32,
	reconnect_deadline: Option<Instant>,
	last_successful_connect_time: Option<Instant>,
	pending_connect: Vec<ConnectReply>,
}

impl<F> Backend<F>
where
	F: FnMut(Box<ClientConfig>) -> ConnectFuture,
{
	async fn handle_command(&mut self, cmd: NetCommand) {
		match cmd {
			NetCommand::Connect { cfg, reply } => {
				let same_target = self.last_connect_cfg.as_ref() == Some(cfg.as_ref());
				if same_target && self.hub.is_connected() {
					if self.hub.gate().is_authenticated() {
						let _ = reply.send(Ok(()));
					} else {
						self.pending_connect.push(reply);
					}
					return;
				}

				self.last_connect_cfg = Some(*cfg);
				self.reconnect_attempt = 0;
				self.reconnect_deadline = None;
				self.pending_connect.push(reply);
				self.open().await;
			}

			NetCommand::Disconnect { reason } => {
				self.reply_pending(Err(ClientCoreError::Connection(format!("disconnected: {reason}"))));
				self.close();
				self.hub.disconnect(&reason);
			}

			NetCommand::Logout => {
				self.reply_pending(Err(ClientCoreError::Connection("logged out".to_string())));
				self.close();
				self.hub.logout();
			}

			NetCommand::Intent(intent) => self.hub.apply_intent(intent),
		}
	}

	fn handle_inbound(&mut self, inbound: Inbound) {
		match inbound {
			Inbound::Text(text) => match self.hub.handle_text(&text) {
				HubOutcome::None => {}
				HubOutcome::AuthSucceeded => {
					self.last_successful_connect_time = Some(Instant::now());
					self.reconnect_attempt = 0;
					self.reply_pending(Ok(()));
				}
				HubOutcome::AuthFailed(message) => {
					self.reply_pending(Err(ClientCoreError::Auth(message)));
					self.close();
					self.hub.close_connection("authentication failed");
				}
			},

			Inbound::Closed { reason } => {
				warn!(%reason, "connection lost");
				self.inbound = None;
				self.hub.on_connection_lost(&reason);
				self.reply_pending(Err(ClientCoreError::Connection(reason)));
				self.schedule_reconnect();
			}
		}
	}

	/// Open a socket for the remembered config and authenticate on it.
	async fn open(&mut self) {
		let Some(cfg) = self.last_connect_cfg.clone() else {
			return;
		};

		let token = match cfg.resolve_auth_token() {
			Ok(token) => token,
			Err(e) => {
				warn!(error = %e, "cannot connect without credentials");
				self.hub.fail_auth(&e.to_string());
				self.reply_pending(Err(e));
				self.close();
				return;
			}
		};

		if self.hub.is_connected() {
			self.hub.close_connection("reconnect");
		}
		self.inbound = None;
		self.hub.on_connecting();

		match (self.connect_fn)(Box::new(cfg)).await {
			Ok(conn) => {
				info!(attempt = self.reconnect_attempt, "connected; authenticating");
				self.inbound = Some(conn.inbound);
				self.hub.on_connected(conn.transport, token.expose());
			}
			Err(e) => {
				warn!(error = %e, attempt = self.reconnect_attempt, "connect failed");
				self.hub.on_connect_failed(&e);
				self.hub.on_connection_lost(&e.to_string());
				self.reply_pending(Err(e));
				self.schedule_reconnect();
			}
		}
	}

	fn schedule_reconnect(&mut self) {
		let Some(cfg) = self.last_connect_cfg.as_ref() else {
			return;
		};
		if !cfg.auto_reconnect {
			debug!("auto reconnect disabled");
			return;
		}

		self.reconnect_attempt = next_attempt(
			self.reconnect_attempt,
			self.last_successful_connect_time.take(),
			Instant::now(),
		);
		let (deadline, ms) = schedule_reconnect(self.reconnect_attempt, cfg.reconnect_min_delay, cfg.reconnect_max_delay);
		self.reconnect_deadline = Some(deadline);
		self.hub.on_reconnect_scheduled(self.reconnect_attempt, ms);
		counter!("fleetlive_client_reconnects_total").increment(1);
		info!(attempt = self.reconnect_attempt, next_retry_in_ms = ms, "reconnect scheduled");
	}

	/// Stop connecting: forget the target and cancel any pending retry.
	fn close(&mut self) {
		self.last_connect_cfg = None;
		self.inbound = None;
		self.reconnect_attempt = 0;
		self.reconnect_deadline = None;
		self.last_successful_connect_time = None;
	}

	fn stop(&mut self, reason: &str) {
		info!(%reason, "network task stopping");
		self.reply_pending(Err(ClientCoreError::NotRunning));
		self.close();
		self.hub.disconnect(reason);
	}

	fn reply_pending(&mut self, result: Result<(), ClientCoreError>) {
		for reply in self.pending_connect.drain(..) {
			let _ = reply.send(result.clone());
		}
	}
}
