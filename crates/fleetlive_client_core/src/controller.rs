use fleetlive_domain::{DeviceFilter, DeviceKey, StatusFilter};
use tokio::sync::{mpsc, oneshot, watch};

use crate::ClientCoreError;
use crate::config::ClientConfig;
use crate::store::chat::ChatState;
use crate::store::telemetry::TelemetryState;

/// A UI intent, applied by the hub in the order received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
	StartAllDevices { filter: Option<DeviceFilter> },
	SetStatusFilter(StatusFilter),
	SetSearchTerm(String),
	SetLimit(u32),
	SetPage(u32),
	NextPage,
	PrevPage,
	Refresh,
	StartSingleDevice(DeviceKey),
	StopSingleDevice(DeviceKey),
	StopAllSingleDevices,
	ClearError,
	ClearDeviceError(DeviceKey),
	FetchChatList,
	JoinChat(String),
	LeaveChat,
	SendMessage { chat_id: String, text: String },
}

#[derive(Debug)]
pub enum NetCommand {
	Connect {
		cfg: Box<ClientConfig>,
		reply: oneshot::Sender<Result<(), ClientCoreError>>,
	},
	Disconnect {
		reason: String,
	},
	Logout,
	Intent(Intent),
}

/// Cloneable handle to the network task.
#[derive(Clone)]
pub struct DeviceService {
	cmd_tx: mpsc::Sender<NetCommand>,
	telemetry: watch::Receiver<TelemetryState>,
	chat: watch::Receiver<ChatState>,
}

impl DeviceService {
	pub fn new(
		cmd_tx: mpsc::Sender<NetCommand>,
		telemetry: watch::Receiver<TelemetryState>,
		chat: watch::Receiver<ChatState>,
	) -> Self {
		Self { cmd_tx, telemetry, chat }
	}

	pub fn telemetry(&self) -> watch::Receiver<TelemetryState> {
		self.telemetry.clone()
	}

	pub fn chat(&self) -> watch::Receiver<ChatState> {
		self.chat.clone()
	}

	pub fn telemetry_snapshot(&self) -> TelemetryState {
		self.telemetry.borrow().clone()
	}

	pub fn chat_snapshot(&self) -> ChatState {
		self.chat.borrow().clone()
	}

	async fn send(&self, cmd: NetCommand) -> Result<(), ClientCoreError> {
		self.cmd_tx.send(cmd).await.map_err(|_| ClientCoreError::NotRunning)
	}

	async fn intent(&self, intent: Intent) -> Result<(), ClientCoreError> {
		self.send(NetCommand::Intent(intent)).await
	}

	/// Resolves once the server accepted our credentials.
	///
	/// Resolves immediately when already authenticated.
	pub async fn connect(&self, cfg: ClientConfig) -> Result<(), ClientCoreError> {
		let (reply, rx) = oneshot::channel();
		self.send(NetCommand::Connect {
			cfg: Box::new(cfg),
			reply,
		})
		.await?;
		rx.await.map_err(|_| ClientCoreError::NotRunning)?
	}

	pub async fn disconnect(&self, reason: impl Into<String>) -> Result<(), ClientCoreError> {
		self.send(NetCommand::Disconnect { reason: reason.into() }).await
	}

	pub async fn logout(&self) -> Result<(), ClientCoreError> {
		self.send(NetCommand::Logout).await
	}

	pub async fn start_all_devices_stream(&self, filter: Option<DeviceFilter>) -> Result<(), ClientCoreError> {
		self.intent(Intent::StartAllDevices { filter }).await
	}

	pub async fn set_status_filter(&self, status: StatusFilter) -> Result<(), ClientCoreError> {
		self.intent(Intent::SetStatusFilter(status)).await
	}

	pub async fn set_search_term(&self, term: impl Into<String>) -> Result<(), ClientCoreError> {
		self.intent(Intent::SetSearchTerm(term.into())).await
	}

	pub async fn set_limit(&self, limit: u32) -> Result<(), ClientCoreError> {
		self.intent(Intent::SetLimit(limit)).await
	}

	pub async fn set_page(&self, page: u32) -> Result<(), ClientCoreError> {
		self.intent(Intent::SetPage(page)).await
	}

	pub async fn next_page(&self) -> Result<(), ClientCoreError> {
		self.intent(Intent::NextPage).await
	}

	pub async fn prev_page(&self) -> Result<(), ClientCoreError> {
		self.intent(Intent::PrevPage).await
	}

	pub async fn refresh(&self) -> Result<(), ClientCoreError> {
		self.intent(Intent::Refresh).await
	}

	pub async fn start_single_device_stream(&self, id: &str) -> Result<(), ClientCoreError> {
		let key = DeviceKey::new(id)?;
		self.intent(Intent::StartSingleDevice(key)).await
	}

	pub async fn stop_single_device_stream(&self, id: &str) -> Result<(), ClientCoreError> {
		let key = DeviceKey::new(id)?;
		self.intent(Intent::StopSingleDevice(key)).await
	}

	pub async fn stop_all_single_device_streams(&self) -> Result<(), ClientCoreError> {
		self.intent(Intent::StopAllSingleDevices).await
	}

	pub async fn clear_error(&self) -> Result<(), ClientCoreError> {
		self.intent(Intent::ClearError).await
	}

	pub async fn clear_device_error(&self, id: &str) -> Result<(), ClientCoreError> {
		let key = DeviceKey::new(id)?;
		self.intent(Intent::ClearDeviceError(key)).await
	}

	pub async fn fetch_chat_list(&self) -> Result<(), ClientCoreError> {
		self.intent(Intent::FetchChatList).await
	}

	pub async fn join_chat(&self, chat_id: impl Into<String>) -> Result<(), ClientCoreError> {
		self.intent(Intent::JoinChat(chat_id.into())).await
	}

	pub async fn leave_chat(&self) -> Result<(), ClientCoreError> {
		self.intent(Intent::LeaveChat).await
	}

	pub async fn send_message(
		&self,
		chat_id: impl Into<String>,
		text: impl Into<String>,
	) -> Result<(), ClientCoreError> {
		self.intent(Intent::SendMessage {
			chat_id: chat_id.into(),
			text: text.into(),
		})
		.await
	}
}

pub struct ShutdownHandle {
	shutdown_tx: oneshot::Sender<()>,
	join_handle: std::thread::JoinHandle<()>,
}

impl ShutdownHandle {
	pub fn new(shutdown_tx: oneshot::Sender<()>, join_handle: std::thread::JoinHandle<()>) -> Self {
		Self {
			shutdown_tx,
			join_handle,
		}
	}

	pub fn shutdown(self) {
		let _ = self.shutdown_tx.send(());
		let _ = self.join_handle.join();
	}
}
