#![forbid(unsafe_code)]

pub mod endpoint {
	use url::Url;

	/// Parsed `ws://` / `wss://` endpoint.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct WsEndpoint {
		url: Url,
	}

	impl WsEndpoint {
		/// Parse a websocket endpoint in the form `ws[s]://host[:port][/path][?query]`.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("endpoint must be non-empty (expected ws://host:port/path)".to_string());
			}

			let url = Url::parse(s).map_err(|e| format!("invalid endpoint {s}: {e}"))?;

			match url.scheme() {
				"ws" | "wss" => {}
				other => {
					return Err(format!("invalid endpoint scheme {other:?} (expected ws:// or wss://): {s}"));
				}
			}

			if url.host_str().map(str::is_empty).unwrap_or(true) {
				return Err(format!("invalid endpoint host (expected ws://host:port): {s}"));
			}

			if url.fragment().is_some() {
				return Err(format!("invalid endpoint (fragments are not allowed): {s}"));
			}

			if url.port() == Some(0) {
				return Err(format!("invalid endpoint port (expected 1..=65535): {s}"));
			}

			Ok(Self { url })
		}

		pub fn as_str(&self) -> &str {
			self.url.as_str()
		}

		pub fn url(&self) -> &Url {
			&self.url
		}

		pub fn is_secure(&self) -> bool {
			self.url.scheme() == "wss"
		}

		/// Host as written (IPv6 stays bracketed).
		pub fn host(&self) -> String {
			match self.url.host() {
				Some(url::Host::Ipv6(addr)) => format!("[{addr}]"),
				Some(h) => h.to_string(),
				None => String::new(),
			}
		}

		/// Explicit port, else the scheme default.
		pub fn port(&self) -> u16 {
			self.url
				.port_or_known_default()
				.unwrap_or(if self.is_secure() { 443 } else { 80 })
		}

		/// Returns `host:port`.
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host(), self.port())
		}
	}

	/// Validate `ws[s]://host[:port]/path`.
	pub fn validate_ws_endpoint(s: &str) -> Result<(), String> {
		let _ = WsEndpoint::parse(s)?;
		Ok(())
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_dns_hostname_with_path() {
			let e = WsEndpoint::parse("wss://track.example.com/socket?v=2").unwrap();
			assert_eq!(e.host(), "track.example.com");
			assert_eq!(e.port(), 443);
			assert!(e.is_secure());
			assert_eq!(e.hostport(), "track.example.com:443");
			assert_eq!(e.url().path(), "/socket");
		}

		#[test]
		fn parses_ipv4_with_port() {
			let e = WsEndpoint::parse("ws://127.0.0.1:4000/ws").unwrap();
			assert_eq!(e.host(), "127.0.0.1");
			assert_eq!(e.port(), 4000);
			assert!(!e.is_secure());
		}

		#[test]
		fn parses_bracketed_ipv6() {
			let e = WsEndpoint::parse("ws://[::1]:4000").unwrap();
			assert_eq!(e.host(), "[::1]");
			assert_eq!(e.hostport(), "[::1]:4000");
		}

		#[test]
		fn rejects_other_schemes() {
			let err = WsEndpoint::parse("http://127.0.0.1:4000").unwrap_err();
			assert!(err.contains("scheme"));
			assert!(WsEndpoint::parse("quic://127.0.0.1:4000").is_err());
		}

		#[test]
		fn rejects_fragment_empty_and_port_zero() {
			assert!(WsEndpoint::parse("ws://127.0.0.1:4000/#frag").is_err());
			assert!(WsEndpoint::parse("   ").is_err());
			assert!(WsEndpoint::parse("ws://127.0.0.1:0").is_err());
		}
	}
}

pub mod env {
	/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
	pub fn parse_env_bool(v: &str) -> Option<bool> {
		match v.trim().to_ascii_lowercase().as_str() {
			"1" | "true" | "yes" | "on" => Some(true),
			"0" | "false" | "no" | "off" => Some(false),
			_ => None,
		}
	}

	/// Read an env var, trimmed; `None` when unset or blank.
	pub fn env_nonempty(key: &str) -> Option<String> {
		std::env::var(key).ok().and_then(|v| {
			let v = v.trim().to_string();
			(!v.is_empty()).then_some(v)
		})
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_bools() {
			assert_eq!(parse_env_bool(" YES "), Some(true));
			assert_eq!(parse_env_bool("off"), Some(false));
			assert_eq!(parse_env_bool("maybe"), None);
		}
	}
}

pub mod secret {
	use core::fmt;

	/// Wrapper that redacts in logs.
	#[derive(Clone, PartialEq, Eq)]
	pub struct SecretString(String);

	impl SecretString {
		pub fn new(s: impl Into<String>) -> Self {
			Self(s.into())
		}

		/// Access the inner secret string.
		pub fn expose(&self) -> &str {
			&self.0
		}
	}

	impl fmt::Debug for SecretString {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			f.write_str("SecretString(<redacted>)")
		}
	}

	impl fmt::Display for SecretString {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			f.write_str("<redacted>")
		}
	}
}
