use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fleetlive_protocol::{ClientMessage, encode_message};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::ClientCoreError;
use crate::config::ClientConfig;

/// Outbound half of a live socket.
pub trait Transport: Send {
	fn send(&self, msg: &ClientMessage) -> Result<(), ClientCoreError>;

	fn is_open(&self) -> bool;

	fn close(&self, reason: &str);
}

pub type BoxedTransport = Box<dyn Transport>;

/// What the reader side hands to the network task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
	Text(String),
	/// Always the last item of a connection.
	Closed { reason: String },
}

/// A freshly opened socket.
pub struct Connection {
	pub transport: BoxedTransport,
	pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

enum Outbound {
	Text(String),
	Close(String),
}

/// Websocket transport; the socket itself lives in a writer and a reader task.
pub struct WsTransport {
	tx: mpsc::UnboundedSender<Outbound>,
	closed: Arc<AtomicBool>,
	max_frame_bytes: usize,
}

impl Transport for WsTransport {
	fn send(&self, msg: &ClientMessage) -> Result<(), ClientCoreError> {
		if !self.is_open() {
			return Err(ClientCoreError::Connection("socket is closed".to_string()));
		}
		let text = encode_message(msg, self.max_frame_bytes)?;
		self.tx
			.send(Outbound::Text(text))
			.map_err(|_| ClientCoreError::Connection("socket writer stopped".to_string()))
	}

	fn is_open(&self) -> bool {
		!self.closed.load(Ordering::Acquire) && !self.tx.is_closed()
	}

	fn close(&self, reason: &str) {
		self.closed.store(true, Ordering::Release);
		let _ = self.tx.send(Outbound::Close(reason.to_string()));
	}
}

/// Open the websocket described by `cfg`, bounded by `connect_timeout`.
pub async fn connect_websocket(cfg: &ClientConfig) -> Result<Connection, ClientCoreError> {
	let endpoint = cfg.endpoint()?;
	info!(server = %endpoint.hostport(), secure = endpoint.is_secure(), "connecting");

	let (ws, _resp) = tokio::time::timeout(cfg.connect_timeout, tokio_tungstenite::connect_async(endpoint.as_str()))
		.await
		.map_err(|_| {
			ClientCoreError::Connection(format!(
				"connect to {} timed out after {}ms",
				endpoint.hostport(),
				cfg.connect_timeout.as_millis()
			))
		})?
		.map_err(|e| ClientCoreError::Connection(format!("connect to {} failed: {e}", endpoint.hostport())))?;

	info!(server = %endpoint.hostport(), "websocket open");

	let (mut sink, mut stream) = ws.split();
	let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
	let (in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();
	let closed = Arc::new(AtomicBool::new(false));

	let keepalive = cfg.keepalive_interval;
	tokio::spawn(async move {
		let mut tick = tokio::time::interval(keepalive);
		tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
		tick.tick().await;

		loop {
			tokio::select! {
				out = out_rx.recv() => match out {
					Some(Outbound::Text(text)) => {
						if let Err(e) = sink.send(Message::Text(text.into())).await {
							warn!(error = %e, "websocket send failed");
							break;
						}
					}
					Some(Outbound::Close(reason)) => {
						debug!(%reason, "closing websocket");
						let _ = sink.send(Message::Close(None)).await;
						break;
					}
					None => {
						let _ = sink.close().await;
						break;
					}
				},
				_ = tick.tick() => {
					if let Err(e) = sink.send(Message::Ping(Vec::<u8>::new().into())).await {
						warn!(error = %e, "keepalive ping failed");
						break;
					}
				}
			}
		}
	});

	let idle_timeout = cfg.idle_timeout;
	let reader_closed = Arc::clone(&closed);
	tokio::spawn(async move {
		let reason = loop {
			match tokio::time::timeout(idle_timeout, stream.next()).await {
				Err(_) => break format!("no inbound frames for {}ms", idle_timeout.as_millis()),
				Ok(None) => break "socket closed".to_string(),
				Ok(Some(Ok(Message::Text(t)))) => {
					if in_tx.send(Inbound::Text(t.as_str().to_owned())).is_err() {
						break "network task dropped the connection".to_string();
					}
				}
				Ok(Some(Ok(Message::Close(frame)))) => {
					break match frame {
						Some(f) if !f.reason.is_empty() => format!("closed by server: {}", f.reason.as_str()),
						_ => "closed by server".to_string(),
					};
				}
				// Pings, pongs and binary frames only prove liveness.
				Ok(Some(Ok(_))) => {}
				Ok(Some(Err(e))) => break format!("websocket error: {e}"),
			}
		};
		reader_closed.store(true, Ordering::Release);
		let _ = in_tx.send(Inbound::Closed { reason });
	});

	Ok(Connection {
		transport: Box::new(WsTransport {
			tx: out_tx,
			closed,
			max_frame_bytes: cfg.max_frame_bytes,
		}),
		inbound: in_rx,
	})
}
