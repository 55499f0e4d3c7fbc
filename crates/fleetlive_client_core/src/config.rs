use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use fleetlive_domain::DeviceFilter;
use fleetlive_protocol::DEFAULT_MAX_FRAME_SIZE;
use fleetlive_util::endpoint::WsEndpoint;
use fleetlive_util::env::{env_nonempty, parse_env_bool};
use fleetlive_util::secret::SecretString;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::ClientCoreError;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:4000/ws";

pub const ENV_SERVER_URL: &str = "FLEETLIVE_SERVER_URL";
pub const ENV_AUTH_TOKEN: &str = "FLEETLIVE_AUTH_TOKEN";
pub const ENV_AUTH_TOKEN_FILE: &str = "FLEETLIVE_AUTH_TOKEN_FILE";

/// Default config path: `~/.fleetlive/client.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".fleetlive").join("client.toml"))
}

/// Default token path: `~/.fleetlive/token`.
pub fn default_token_path() -> Option<PathBuf> {
	dirs::home_dir().map(|home| home.join(".fleetlive").join("token"))
}

/// Load the client config from `~/.fleetlive/client.toml` and env overrides.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
	let path = default_config_path()?;
	load_client_config_from_path(&path)
}

/// Same as `load_client_config` but with an explicit config path.
pub fn load_client_config_from_path(path: &Path) -> anyhow::Result<ClientConfig> {
	load_client_config_with(path, env_nonempty)
}

/// Config loading with an injectable env lookup.
pub fn load_client_config_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<ClientConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ClientConfig::from_file(file_cfg);
	apply_env_overrides(&mut cfg, lookup);
	cfg.validate()?;
	Ok(cfg)
}

/// Client config.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
	/// `ws://` or `wss://` endpoint of the telemetry backend.
	pub server_url: String,
	pub client_name: String,
	/// Inline token; env and token file take precedence.
	pub auth_token: Option<SecretString>,
	pub auth_token_path: Option<PathBuf>,
	pub connect_timeout: Duration,
	pub keepalive_interval: Duration,
	/// Without any inbound frame for this long the socket counts as dropped.
	pub idle_timeout: Duration,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
	pub auto_reconnect: bool,
	pub max_frame_bytes: usize,
	pub page_limit: u32,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			server_url: DEFAULT_SERVER_URL.to_string(),
			client_name: format!("fleetlive-client/{}", env!("CARGO_PKG_VERSION")),
			auth_token: None,
			auth_token_path: default_token_path(),
			connect_timeout: Duration::from_secs(15),
			keepalive_interval: Duration::from_secs(20),
			idle_timeout: Duration::from_secs(60),
			reconnect_min_delay: Duration::from_millis(500),
			reconnect_max_delay: Duration::from_secs(30),
			auto_reconnect: true,
			max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
			page_limit: 10,
		}
	}
}

impl ClientConfig {
	pub fn endpoint(&self) -> Result<WsEndpoint, ClientCoreError> {
		WsEndpoint::parse(&self.server_url).map_err(ClientCoreError::Config)
	}

	/// Filter used until the user picks one.
	pub fn default_filter(&self) -> DeviceFilter {
		DeviceFilter::with_limit(self.page_limit)
	}

	pub fn validate(&self) -> anyhow::Result<()> {
		WsEndpoint::parse(&self.server_url).map_err(|e| anyhow!("server_url: {e}"))?;
		if self.max_frame_bytes == 0 {
			return Err(anyhow!("max_frame_bytes must be > 0"));
		}
		if self.keepalive_interval.is_zero() {
			return Err(anyhow!("keepalive_interval must be > 0"));
		}
		Ok(())
	}

	/// Token for the next connect: env, then token file, then the inline value.
	pub fn resolve_auth_token(&self) -> Result<SecretString, ClientCoreError> {
		self.resolve_auth_token_with(env_nonempty)
	}

	pub fn resolve_auth_token_with(
		&self,
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<SecretString, ClientCoreError> {
		if let Some(token) = lookup(ENV_AUTH_TOKEN) {
			debug!("auth token taken from env");
			return Ok(SecretString::new(token));
		}

		if let Some(path) = self.auth_token_path.as_ref() {
			match fs::read_to_string(path) {
				Ok(s) if !s.trim().is_empty() => {
					debug!(path = %path.display(), "auth token read from file");
					return Ok(SecretString::new(s.trim()));
				}
				Ok(_) => debug!(path = %path.display(), "token file is empty"),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => warn!(path = %path.display(), error = %e, "failed to read token file"),
			}
		}

		self.auth_token
			.clone()
			.ok_or_else(|| ClientCoreError::Auth("no auth token configured".to_string()))
	}

	fn from_file(file: FileConfig) -> Self {
		let d = Self::default();
		Self {
			server_url: file
				.server_url
				.filter(|s| !s.trim().is_empty())
				.unwrap_or(d.server_url),
			client_name: file
				.client_name
				.filter(|s| !s.trim().is_empty())
				.unwrap_or(d.client_name),
			auth_token: file.auth_token.filter(|s| !s.trim().is_empty()).map(SecretString::new),
			auth_token_path: file
				.auth_token_path
				.filter(|s| !s.trim().is_empty())
				.map(PathBuf::from)
				.or(d.auth_token_path),
			connect_timeout: file
				.connect_timeout_ms
				.map(Duration::from_millis)
				.unwrap_or(d.connect_timeout),
			keepalive_interval: file
				.keepalive_interval_ms
				.map(Duration::from_millis)
				.unwrap_or(d.keepalive_interval),
			idle_timeout: file
				.idle_timeout_ms
				.map(Duration::from_millis)
				.unwrap_or(d.idle_timeout),
			reconnect_min_delay: file
				.reconnect_min_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(d.reconnect_min_delay),
			reconnect_max_delay: file
				.reconnect_max_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(d.reconnect_max_delay),
			auto_reconnect: file.auto_reconnect.unwrap_or(d.auto_reconnect),
			max_frame_bytes: file.max_frame_bytes.unwrap_or(d.max_frame_bytes),
			page_limit: file.page_limit.filter(|v| *v > 0).unwrap_or(d.page_limit),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	server_url: Option<String>,
	client_name: Option<String>,
	auth_token: Option<String>,
	auth_token_path: Option<String>,
	connect_timeout_ms: Option<u64>,
	keepalive_interval_ms: Option<u64>,
	idle_timeout_ms: Option<u64>,
	reconnect_min_delay_ms: Option<u64>,
	reconnect_max_delay_ms: Option<u64>,
	auto_reconnect: Option<bool>,
	max_frame_bytes: Option<usize>,
	page_limit: Option<u32>,
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn env_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
	let v = lookup(key)?;
	match v.trim().parse::<u64>() {
		Ok(ms) => Some(Duration::from_millis(ms)),
		Err(_) => {
			warn!(key, value = %v, "ignoring non-numeric env override");
			None
		}
	}
}

fn apply_env_overrides(cfg: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
	if let Some(v) = lookup(ENV_SERVER_URL) {
		cfg.server_url = v;
		info!("client config: server_url overridden by env");
	}
	if let Some(v) = lookup(ENV_AUTH_TOKEN_FILE) {
		cfg.auth_token_path = Some(PathBuf::from(v));
		info!("client config: auth_token_path overridden by env");
	}
	if let Some(d) = env_millis(&lookup, "FLEETLIVE_CONNECT_TIMEOUT_MS") {
		cfg.connect_timeout = d;
		info!(ms = d.as_millis(), "client config: connect_timeout overridden by env");
	}
	if let Some(d) = env_millis(&lookup, "FLEETLIVE_KEEPALIVE_INTERVAL_MS") {
		cfg.keepalive_interval = d;
		info!(ms = d.as_millis(), "client config: keepalive_interval overridden by env");
	}
	if let Some(d) = env_millis(&lookup, "FLEETLIVE_IDLE_TIMEOUT_MS") {
		cfg.idle_timeout = d;
		info!(ms = d.as_millis(), "client config: idle_timeout overridden by env");
	}
	if let Some(d) = env_millis(&lookup, "FLEETLIVE_RECONNECT_MIN_DELAY_MS") {
		cfg.reconnect_min_delay = d;
		info!(ms = d.as_millis(), "client config: reconnect_min_delay overridden by env");
	}
	if let Some(d) = env_millis(&lookup, "FLEETLIVE_RECONNECT_MAX_DELAY_MS") {
		cfg.reconnect_max_delay = d;
		info!(ms = d.as_millis(), "client config: reconnect_max_delay overridden by env");
	}
	if let Some(v) = lookup("FLEETLIVE_AUTO_RECONNECT")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.auto_reconnect = enabled;
		info!(enabled, "client config: auto_reconnect overridden by env");
	}
	if let Some(v) = lookup("FLEETLIVE_PAGE_LIMIT")
		&& let Ok(limit) = v.trim().parse::<u32>()
		&& limit > 0
	{
		cfg.page_limit = limit;
		info!(limit, "client config: page_limit overridden by env");
	}
	if let Some(v) = lookup("FLEETLIVE_MAX_FRAME_BYTES")
		&& let Ok(max) = v.trim().parse::<usize>()
	{
		cfg.max_frame_bytes = max;
		info!(max, "client config: max_frame_bytes overridden by env");
	}

	if cfg.reconnect_min_delay > cfg.reconnect_max_delay {
		warn!(
			min_ms = cfg.reconnect_min_delay.as_millis(),
			max_ms = cfg.reconnect_max_delay.as_millis(),
			"client config: reconnect_min_delay > reconnect_max_delay; swapping"
		);
		std::mem::swap(&mut cfg.reconnect_min_delay, &mut cfg.reconnect_max_delay);
	}
}
