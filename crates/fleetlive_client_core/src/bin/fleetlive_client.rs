#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context as _;
use fleetlive_client_core::config::{default_config_path, load_client_config_from_path};
use fleetlive_client_core::{ConnectionStatus, StreamingMode, spawn_network_task};
use fleetlive_domain::{DeviceFilter, StatusFilter};
use fleetlive_util::endpoint::validate_ws_endpoint;
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: fleetlive_client [--connect ws://host:port/path] [--config path] [--device id]... [--filter status] [--search term] [--limit n]\n\
\n\
Options:\n\
	--connect   Telemetry endpoint (overrides server_url from the config file)\n\
	            Format: ws://host:port/path or wss://host/path\n\
	--config    Config file (default: ~/.fleetlive/client.toml)\n\
	--device    Track a single device (repeatable; default: all devices)\n\
	--filter    Status filter: all, running, overspeed, idle, stopped, inactive, new\n\
	--search    Search term for the all-devices feed\n\
	--limit     Page size for the all-devices feed\n\
	--help      Show this help\n\
\n\
The auth token is read from FLEETLIVE_AUTH_TOKEN, the token file, or the config file.\n\
\n\
Examples:\n\
	fleetlive_client --connect ws://127.0.0.1:4000/ws --filter running\n\
	fleetlive_client --device 8612 --device 8613\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,fleetlive_client_core=debug".to_string());
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[derive(Debug, Default)]
struct Args {
	endpoint: Option<String>,
	config: Option<PathBuf>,
	devices: Vec<String>,
	status: Option<StatusFilter>,
	search: Option<String>,
	limit: Option<u32>,
}

fn parse_args() -> Args {
	let mut args = Args::default();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--connect" | "--endpoint" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if let Err(e) = validate_ws_endpoint(&v) {
					eprintln!("Invalid --connect value: {v}\n{e}");
					usage_and_exit();
				}
				args.endpoint = Some(v);
			}
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				args.config = Some(PathBuf::from(v));
			}
			"--device" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--device must be non-empty");
					usage_and_exit();
				}
				args.devices.push(v);
			}
			"--filter" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				let status = v.parse::<StatusFilter>().unwrap_or_else(|e| {
					eprintln!("Invalid --filter value: {e}");
					usage_and_exit()
				});
				args.status = Some(status);
			}
			"--search" => {
				args.search = Some(it.next().unwrap_or_else(|| usage_and_exit()));
			}
			"--limit" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				let limit = v.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or_else(|| {
					eprintln!("Invalid --limit value: {v}");
					usage_and_exit()
				});
				args.limit = Some(limit);
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	args
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let args = parse_args();

	let path = match args.config.clone() {
		Some(p) => p,
		None => default_config_path()?,
	};
	let mut cfg = load_client_config_from_path(&path)?;
	if let Some(endpoint) = args.endpoint.clone() {
		cfg.server_url = endpoint;
	}
	if let Some(limit) = args.limit {
		cfg.page_limit = limit;
	}

	let (service, shutdown_tx, task) = spawn_network_task(&cfg);

	info!(server = %cfg.server_url, "connecting");
	service.connect(cfg.clone()).await.context("connect")?;

	if args.devices.is_empty() {
		let mut filter = DeviceFilter::with_limit(cfg.page_limit);
		if let Some(status) = args.status {
			filter.set_status(status);
		}
		if let Some(term) = args.search.as_deref() {
			filter.set_search_term(term);
		}
		service.start_all_devices_stream(Some(filter)).await?;
	} else {
		for id in &args.devices {
			service.start_single_device_stream(id).await?;
		}
	}

	let mut rx = service.telemetry();
	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			changed = rx.changed() => {
				if changed.is_err() {
					warn!("network task stopped");
					break;
				}
				let state = rx.borrow_and_update().clone();
				if let Some(err) = state.error.as_deref() {
					warn!(error = %err, "telemetry error");
				}
				match (&state.status, state.streaming_mode) {
					(ConnectionStatus::Reconnecting { attempt, next_retry_in_ms }, _) => {
						println!("reconnecting (attempt {attempt}, retry in {next_retry_in_ms}ms)");
					}
					(ConnectionStatus::Connected, StreamingMode::All) if !state.loading => {
						println!(
							"page {}/{} ({} devices total)",
							state.filter.page,
							state.page_info.total_pages.max(1),
							state.snapshot.total
						);
						for row in &state.snapshot.devices {
							println!("  {}", serde_json::Value::Object(row.clone()));
						}
					}
					(ConnectionStatus::Connected, StreamingMode::Single) => {
						for (key, record) in &state.single_device_data {
							println!("[{key}] {}", serde_json::Value::Object(record.fields.clone()));
						}
						for (key, err) in &state.device_errors {
							println!("[{key}] error: {err}");
						}
					}
					_ => {}
				}
			}
		}
	}

	service.disconnect("ctrl-c").await.ok();
	let _ = shutdown_tx.send(());
	let _ = task.await;
	Ok(())
}
