use std::collections::{BTreeMap, BTreeSet};

use fleetlive_domain::{DeviceFilter, DeviceKey, DeviceSnapshot, PageInfo, SingleDeviceRecord};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::debug;

use crate::is_auth_error_message;
use crate::registry::StreamingMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
	Disconnected { reason: Option<String> },
	Connecting,
	Reconnecting { attempt: u32, next_retry_in_ms: u64 },
	Connected,
}

impl Default for ConnectionStatus {
	fn default() -> Self {
		Self::Disconnected { reason: None }
	}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryState {
	pub status: ConnectionStatus,
	pub is_connected: bool,
	pub is_authenticated: bool,
	pub role: Option<String>,
	pub streaming_mode: StreamingMode,
	pub filter: DeviceFilter,
	pub snapshot: DeviceSnapshot,
	pub page_info: PageInfo,
	pub single_device_data: BTreeMap<DeviceKey, SingleDeviceRecord>,
	pub single_device_loading: BTreeSet<DeviceKey>,
	/// Per-device subscription failures; never mirrored into `error`.
	pub device_errors: BTreeMap<DeviceKey, String>,
	pub active_single_devices: BTreeSet<DeviceKey>,
	pub loading: bool,
	pub error: Option<String>,
}

impl TelemetryState {
	pub fn device(&self, key: &DeviceKey) -> Option<&SingleDeviceRecord> {
		self.single_device_data.get(key)
	}

	pub fn is_device_loading(&self, key: &DeviceKey) -> bool {
		self.single_device_loading.contains(key)
	}

	fn clear_tracking(&mut self) {
		self.active_single_devices.clear();
		self.single_device_data.clear();
		self.single_device_loading.clear();
		self.device_errors.clear();
	}

	fn enter_all_devices(&mut self, filter: DeviceFilter) {
		self.clear_tracking();
		self.page_info = PageInfo::compute(self.snapshot.total, filter.page, filter.limit);
		self.filter = filter;
		self.streaming_mode = StreamingMode::All;
		self.loading = true;
	}

	fn fail_auth(&mut self, message: String) {
		self.is_authenticated = false;
		self.role = None;
		self.streaming_mode = StreamingMode::None;
		self.clear_tracking();
		self.loading = false;
		self.error = Some(message);
	}
}

/// Telemetry state container. Only the hub mutates it.
#[derive(Debug)]
pub struct TelemetryStore {
	tx: watch::Sender<TelemetryState>,
}

impl Default for TelemetryStore {
	fn default() -> Self {
		Self::new(DeviceFilter::default())
	}
}

impl TelemetryStore {
	pub fn new(filter: DeviceFilter) -> Self {
		let (tx, _rx) = watch::channel(TelemetryState {
			filter,
			..TelemetryState::default()
		});
		Self { tx }
	}

	pub fn subscribe(&self) -> watch::Receiver<TelemetryState> {
		self.tx.subscribe()
	}

	pub fn state(&self) -> TelemetryState {
		self.tx.borrow().clone()
	}

	/// Read without cloning.
	pub fn with<R>(&self, f: impl FnOnce(&TelemetryState) -> R) -> R {
		f(&self.tx.borrow())
	}

	pub fn set_status(&self, status: ConnectionStatus) {
		self.tx.send_if_modified(|s| {
			if s.status == status {
				return false;
			}
			s.status = status;
			true
		});
	}

	pub fn connection_established(&self) {
		self.tx.send_modify(|s| {
			s.status = ConnectionStatus::Connected;
			s.is_connected = true;
			s.is_authenticated = false;
		});
	}

	/// Received data stays visible (possibly stale) until fresh data arrives.
	pub fn connection_lost(&self, status: ConnectionStatus) {
		self.tx.send_modify(|s| {
			s.status = status;
			s.is_connected = false;
			s.is_authenticated = false;
			s.loading = false;
			s.single_device_loading.clear();
		});
	}

	/// Explicit disconnect: drop every received record and error. Mode, filter
	/// and tracked ids mirror the want-set and survive for the next connect.
	pub fn disconnected(&self, reason: impl Into<String>) {
		let reason = reason.into();
		self.tx.send_modify(|s| {
			*s = TelemetryState {
				status: ConnectionStatus::Disconnected { reason: Some(reason) },
				streaming_mode: s.streaming_mode,
				filter: std::mem::take(&mut s.filter),
				active_single_devices: std::mem::take(&mut s.active_single_devices),
				..TelemetryState::default()
			};
		});
	}

	/// Non-fatal connection problem; the network task keeps retrying.
	pub fn connection_error(&self, message: impl Into<String>) {
		let message = message.into();
		self.tx.send_modify(|s| s.error = Some(message));
	}

	pub fn authenticated(&self, role: Option<String>) {
		self.tx.send_modify(|s| {
			s.is_authenticated = true;
			s.role = role;
			if s.error.as_deref().is_some_and(is_auth_error_message) {
				s.error = None;
			}
		});
	}

	/// Terminal auth failure: every subscription is now invalid server-side.
	pub fn auth_failed(&self, message: impl Into<String>) {
		let message = message.into();
		self.tx.send_modify(|s| s.fail_auth(message));
	}

	/// Global error. Auth-looking messages tear subscriptions down; returns true in that case.
	pub fn set_error(&self, message: impl Into<String>) -> bool {
		let message = message.into();
		let is_auth = is_auth_error_message(&message);
		self.tx.send_modify(|s| {
			if is_auth {
				s.fail_auth(message);
			} else {
				s.loading = false;
				s.error = Some(message);
			}
		});
		is_auth
	}

	pub fn clear_error(&self) {
		self.tx.send_if_modified(|s| s.error.take().is_some());
	}

	pub fn begin_all_devices(&self, filter: DeviceFilter) {
		self.tx.send_modify(|s| s.enter_all_devices(filter));
	}

	/// Store a new filter without touching the streaming mode.
	pub fn set_filter(&self, filter: DeviceFilter) {
		self.tx.send_modify(|s| {
			s.page_info = PageInfo::compute(s.snapshot.total, filter.page, filter.limit);
			s.filter = filter;
		});
	}

	pub fn begin_single_device(&self, key: DeviceKey) {
		self.tx.send_modify(|s| {
			s.streaming_mode = StreamingMode::Single;
			s.loading = false;
			s.device_errors.remove(&key);
			s.single_device_loading.insert(key.clone());
			s.active_single_devices.insert(key);
		});
	}

	/// Remove one tracked device in a single transaction, optionally switching
	/// back to the all-devices feed.
	pub fn stop_single_device(&self, key: &DeviceKey, fallback: Option<DeviceFilter>) -> bool {
		self.tx.send_if_modified(|s| {
			let was_active = s.active_single_devices.remove(key);
			let had_data = s.single_device_data.remove(key).is_some();
			s.single_device_loading.remove(key);
			s.device_errors.remove(key);

			if let Some(filter) = fallback {
				s.enter_all_devices(filter);
				return true;
			}
			was_active || had_data
		})
	}

	/// Mark every wanted feed as loading again after a reconnect.
	pub fn begin_resync(&self) {
		self.tx.send_modify(|s| match s.streaming_mode {
			StreamingMode::All => s.loading = true,
			StreamingMode::Single => {
				let keys: Vec<DeviceKey> = s.active_single_devices.iter().cloned().collect();
				s.single_device_loading.extend(keys);
			}
			StreamingMode::None => {}
		});
	}

	/// Replace the current page. Ignored unless streaming all devices.
	pub fn apply_snapshot(&self, snapshot: DeviceSnapshot) -> bool {
		self.tx.send_if_modified(|s| {
			if s.streaming_mode != StreamingMode::All {
				debug!(mode = ?s.streaming_mode, "ignoring all-devices page outside all mode");
				return false;
			}
			s.page_info = PageInfo::compute(snapshot.total, s.filter.page, s.filter.limit);
			s.snapshot = snapshot;
			s.loading = false;
			true
		})
	}

	/// Replace one device record. Ignored for devices that are not tracked.
	pub fn apply_single_device(&self, key: DeviceKey, fields: Map<String, Value>) -> bool {
		self.tx.send_if_modified(|s| {
			if !s.active_single_devices.contains(&key) {
				debug!(device = %key, "ignoring update for untracked device");
				return false;
			}
			s.single_device_loading.remove(&key);
			s.device_errors.remove(&key);
			s.single_device_data
				.insert(key.clone(), SingleDeviceRecord::new(key, fields));
			true
		})
	}

	/// Scoped subscription failure for one tracked device.
	pub fn record_device_error(&self, key: &DeviceKey, message: impl Into<String>) -> bool {
		let message = message.into();
		self.tx.send_if_modified(|s| {
			if !s.active_single_devices.contains(key) {
				return false;
			}
			s.single_device_loading.remove(key);
			s.device_errors.insert(key.clone(), message);
			true
		})
	}

	pub fn clear_device_error(&self, key: &DeviceKey) {
		self.tx.send_if_modified(|s| s.device_errors.remove(key).is_some());
	}

	/// Back to a pristine state (logout).
	pub fn reset(&self, filter: DeviceFilter) {
		self.tx.send_replace(TelemetryState {
			filter,
			..TelemetryState::default()
		});
	}
}
