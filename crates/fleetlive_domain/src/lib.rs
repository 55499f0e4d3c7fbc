#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors for parsing identifiers and filter values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown status filter: {0}")]
	UnknownFilter(String),
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Canonical device identifier.
///
/// The backend reports device ids as either JSON numbers or strings (`uniqueId`
/// or `imei`). Both collapse into one string form here so that maps keyed by
/// `DeviceKey` never hold the same device twice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
	/// Create a non-empty key; surrounding whitespace is dropped.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		let trimmed = id.trim();
		if trimmed.is_empty() {
			return Err(ParseIdError::Empty);
		}
		if trimmed.len() == id.len() {
			Ok(Self(id))
		} else {
			Ok(Self(trimmed.to_string()))
		}
	}

	/// Normalize a JSON id (number or string).
	pub fn from_json(value: &Value) -> Result<Self, ParseIdError> {
		match value {
			Value::String(s) => Self::new(s.as_str()),
			Value::Number(n) => Self::new(number_to_id(n)),
			Value::Null => Err(ParseIdError::Empty),
			other => Err(ParseIdError::InvalidFormat(format!("device id must be a number or string, got {other}"))),
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

fn number_to_id(n: &serde_json::Number) -> String {
	if let Some(i) = n.as_i64() {
		return i.to_string();
	}
	if let Some(u) = n.as_u64() {
		return u.to_string();
	}
	match n.as_f64() {
		Some(f) if f.is_finite() && f.fract() == 0.0 => format!("{f:.0}"),
		_ => n.to_string(),
	}
}

impl fmt::Display for DeviceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for DeviceKey {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		DeviceKey::new(s)
	}
}

/// Deserialize an id that may arrive as a JSON number or string.
pub fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;
	match value {
		Value::String(s) => Ok(s),
		Value::Number(n) => Ok(number_to_id(&n)),
		other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
	}
}

/// Status bucket of the all-devices feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
	#[default]
	All,
	Running,
	Overspeed,
	Idle,
	Stopped,
	Inactive,
	New,
}

impl StatusFilter {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			StatusFilter::All => "all",
			StatusFilter::Running => "running",
			StatusFilter::Overspeed => "overspeed",
			StatusFilter::Idle => "idle",
			StatusFilter::Stopped => "stopped",
			StatusFilter::Inactive => "inactive",
			StatusFilter::New => "new",
		}
	}
}

impl fmt::Display for StatusFilter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for StatusFilter {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"all" => Ok(StatusFilter::All),
			"running" => Ok(StatusFilter::Running),
			"overspeed" => Ok(StatusFilter::Overspeed),
			"idle" => Ok(StatusFilter::Idle),
			"stopped" => Ok(StatusFilter::Stopped),
			"inactive" => Ok(StatusFilter::Inactive),
			"new" => Ok(StatusFilter::New),
			other => Err(ParseIdError::UnknownFilter(other.to_string())),
		}
	}
}

/// Parameters of the paginated all-devices feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFilter {
	pub page: u32,
	pub limit: u32,
	pub filter: StatusFilter,
	#[serde(default)]
	pub search_term: String,
}

impl Default for DeviceFilter {
	fn default() -> Self {
		Self {
			page: 1,
			limit: 10,
			filter: StatusFilter::All,
			search_term: String::new(),
		}
	}
}

impl DeviceFilter {
	/// Default filter with a custom page size.
	pub fn with_limit(limit: u32) -> Self {
		Self {
			limit: limit.max(1),
			..Self::default()
		}
	}

	/// Move to `page`; the only change that keeps the rest of the filter.
	pub fn set_page(&mut self, page: u32) {
		self.page = page.max(1);
	}

	/// Changing the status bucket restarts pagination.
	pub fn set_status(&mut self, filter: StatusFilter) {
		self.filter = filter;
		self.page = 1;
	}

	pub fn set_search_term(&mut self, term: impl Into<String>) {
		self.search_term = term.into().trim().to_string();
		self.page = 1;
	}

	pub fn set_limit(&mut self, limit: u32) {
		self.limit = limit.max(1);
		self.page = 1;
	}

	/// Clamp page and limit to sane values.
	pub fn normalized(mut self) -> Self {
		self.page = self.page.max(1);
		self.limit = self.limit.max(1);
		self.search_term = self.search_term.trim().to_string();
		self
	}
}

/// One device row of an all-devices page. Columns are owned by the backend.
pub type DeviceRow = Map<String, Value>;

/// One page of the all-devices feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
	#[serde(default)]
	pub devices: Vec<DeviceRow>,
	#[serde(default)]
	pub total: u64,
}

/// Pagination fields derived from `total` and the current filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageInfo {
	pub total_pages: u64,
	pub has_next_page: bool,
	pub has_prev_page: bool,
}

impl PageInfo {
	pub fn compute(total: u64, page: u32, limit: u32) -> Self {
		let limit = u64::from(limit.max(1));
		let page = u64::from(page.max(1));
		let total_pages = total.div_ceil(limit);
		Self {
			total_pages,
			has_next_page: page < total_pages,
			has_prev_page: page > 1,
		}
	}
}

/// Latest detail payload of one tracked device.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleDeviceRecord {
	pub key: DeviceKey,
	pub fields: Map<String, Value>,
	pub received_at: SystemTime,
}

impl SingleDeviceRecord {
	pub fn new(key: DeviceKey, fields: Map<String, Value>) -> Self {
		Self {
			key,
			fields,
			received_at: SystemTime::now(),
		}
	}

	/// Numeric field accessor (`speed`, `latitude`, ...).
	pub fn number(&self, field: &str) -> Option<f64> {
		self.fields.get(field).and_then(Value::as_f64)
	}
}

/// A chat room summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
	#[serde(rename = "_id", deserialize_with = "id_from_string_or_number")]
	pub id: String,
	#[serde(rename = "lastMessage", default, skip_serializing_if = "Option::is_none")]
	pub last_message: Option<Message>,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	#[serde(rename = "_id", deserialize_with = "id_from_string_or_number")]
	pub id: String,
	#[serde(rename = "chatId", deserialize_with = "id_from_string_or_number")]
	pub chat_id: String,
	#[serde(default)]
	pub text: String,
	#[serde(rename = "createdAt", default)]
	pub created_at: String,
}

/// Direction of a geofence crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GeofenceEventType {
	Enter,
	Exit,
}

impl GeofenceEventType {
	pub const fn as_str(self) -> &'static str {
		match self {
			GeofenceEventType::Enter => "ENTER",
			GeofenceEventType::Exit => "EXIT",
		}
	}
}

/// One geofence crossing reported for a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceEvent {
	#[serde(deserialize_with = "id_from_string_or_number")]
	pub geofence_id: String,
	pub event_type: GeofenceEventType,
	pub created_at: String,
}

/// A bus stop on a route, identified by its geofence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
	#[serde(deserialize_with = "id_from_string_or_number")]
	pub geofence_id: String,
	#[serde(default)]
	pub name: String,
}

/// Arrival status of one stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopStatus {
	pub geofence_id: String,
	pub name: String,
	pub entered_at: Option<String>,
	pub exited_at: Option<String>,
	pub has_arrived: bool,
	pub is_current: bool,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn numeric_and_string_ids_normalize_to_one_key() {
		let a = DeviceKey::from_json(&json!(17)).unwrap();
		let b = DeviceKey::from_json(&json!("17")).unwrap();
		let c = DeviceKey::from_json(&json!(" 17 ")).unwrap();
		let d = DeviceKey::from_json(&json!(17.0)).unwrap();
		assert_eq!(a, b);
		assert_eq!(b, c);
		assert_eq!(c, d);
		assert_eq!(a.as_str(), "17");
	}

	#[test]
	fn empty_and_structured_ids_are_rejected() {
		assert_eq!(DeviceKey::new("   "), Err(ParseIdError::Empty));
		assert_eq!(DeviceKey::from_json(&Value::Null), Err(ParseIdError::Empty));
		assert!(matches!(
			DeviceKey::from_json(&json!({"id": 1})),
			Err(ParseIdError::InvalidFormat(_))
		));
	}

	#[test]
	fn status_filter_parses_case_insensitively() {
		assert_eq!("Overspeed".parse::<StatusFilter>().unwrap(), StatusFilter::Overspeed);
		assert_eq!(" new ".parse::<StatusFilter>().unwrap(), StatusFilter::New);
		assert!(matches!(
			"parked".parse::<StatusFilter>(),
			Err(ParseIdError::UnknownFilter(_))
		));
	}

	#[test]
	fn changing_filter_fields_resets_page() {
		let mut f = DeviceFilter::default();
		f.set_page(4);
		assert_eq!(f.page, 4);

		f.set_status(StatusFilter::Idle);
		assert_eq!(f.page, 1);

		f.set_page(3);
		f.set_search_term("  bus 12 ");
		assert_eq!(f.page, 1);
		assert_eq!(f.search_term, "bus 12");

		f.set_page(0);
		assert_eq!(f.page, 1);
	}

	#[test]
	fn filter_serializes_with_camel_case_search_term() {
		let f = DeviceFilter {
			page: 2,
			limit: 25,
			filter: StatusFilter::Running,
			search_term: "kl".to_string(),
		};
		let v = serde_json::to_value(&f).unwrap();
		assert_eq!(v, json!({"page": 2, "limit": 25, "filter": "running", "searchTerm": "kl"}));
	}

	#[test]
	fn page_info_from_total_and_limit() {
		let p = PageInfo::compute(95, 1, 10);
		assert_eq!(p.total_pages, 10);
		assert!(p.has_next_page);
		assert!(!p.has_prev_page);

		let p = PageInfo::compute(95, 10, 10);
		assert!(!p.has_next_page);
		assert!(p.has_prev_page);

		let p = PageInfo::compute(0, 1, 10);
		assert_eq!(p.total_pages, 0);
		assert!(!p.has_next_page);
	}

	#[test]
	fn chat_message_accepts_numeric_ids() {
		let m: Message = serde_json::from_value(json!({
			"_id": 5,
			"chatId": "c1",
			"text": "hi",
			"createdAt": "2024-05-01T08:00:00Z"
		}))
		.unwrap();
		assert_eq!(m.id, "5");
		assert_eq!(m.chat_id, "c1");
	}
}
