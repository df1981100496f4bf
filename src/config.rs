//! Session configuration: API endpoints, look-ahead window, timeouts, and storage location.

// std
use std::path::{Path, PathBuf};
// self
use crate::{_prelude::*, auth::AccountKind, error::ConfigError};

/// Relative endpoint paths, resolved against the API base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointPaths {
	/// Student/teacher login.
	pub login: String,
	/// School-account login.
	pub school_login: String,
	/// Refresh-token exchange.
	pub refresh: String,
	/// Logout notification.
	pub logout: String,
}
impl Default for EndpointPaths {
	fn default() -> Self {
		Self {
			login: "auth/login".into(),
			school_login: "auth/school/login".into(),
			refresh: "auth/refresh-token".into(),
			logout: "auth/logout".into(),
		}
	}
}

/// Absolute endpoint URLs used by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
	/// Student/teacher login endpoint.
	pub login: Url,
	/// School-account login endpoint.
	pub school_login: Url,
	/// Refresh-token exchange endpoint.
	pub refresh: Url,
	/// Logout notification endpoint.
	pub logout: Url,
}
impl Endpoints {
	/// Resolves `paths` against `base`.
	///
	/// A missing trailing slash on the base is added so paths nest under it. Plain HTTP is only
	/// accepted for loopback hosts.
	pub fn resolve(base: &Url, paths: &EndpointPaths) -> Result<Self, ConfigError> {
		let mut base = base.clone();

		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());

			base.set_path(&path);
		}

		Ok(Self {
			login: Self::join(&base, "login", &paths.login)?,
			school_login: Self::join(&base, "school_login", &paths.school_login)?,
			refresh: Self::join(&base, "refresh", &paths.refresh)?,
			logout: Self::join(&base, "logout", &paths.logout)?,
		})
	}

	/// Resolves the default paths against `base`.
	pub fn from_base(base: &Url) -> Result<Self, ConfigError> {
		Self::resolve(base, &EndpointPaths::default())
	}

	/// Returns the login endpoint for the account kind.
	pub fn login_for(&self, account: AccountKind) -> &Url {
		match account {
			AccountKind::User => &self.login,
			AccountKind::School => &self.school_login,
		}
	}

	fn join(base: &Url, endpoint: &'static str, path: &str) -> Result<Url, ConfigError> {
		let url = base
			.join(path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidUrl { endpoint, source })?;

		Self::ensure_secure(endpoint, &url)?;

		Ok(url)
	}

	fn ensure_secure(endpoint: &'static str, url: &Url) -> Result<(), ConfigError> {
		let loopback = match url.host() {
			Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
			Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
			Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
			None => false,
		};

		if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
			Ok(())
		} else {
			Err(ConfigError::InsecureEndpoint { endpoint, url: url.to_string() })
		}
	}
}

/// Top-level session settings, typically loaded from a JSON file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
	/// Base URL of the Teacherrs REST API.
	pub api_base_url: Url,
	/// Seconds before expiry at which a token is treated as expired.
	#[serde(default = "SessionConfig::default_look_ahead_secs")]
	pub look_ahead_secs: u64,
	/// Per-request timeout in seconds.
	#[serde(default = "SessionConfig::default_request_timeout_secs")]
	pub request_timeout_secs: u64,
	/// Endpoint paths relative to `api_base_url`.
	#[serde(default)]
	pub endpoints: EndpointPaths,
	/// File backing the persistent tier; in-memory when absent.
	#[serde(default)]
	pub persistent_store_path: Option<PathBuf>,
}
impl SessionConfig {
	/// Default look-ahead window (five minutes).
	pub const DEFAULT_LOOK_AHEAD_SECS: u64 = 5 * 60;
	/// Default request timeout.
	pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

	/// Creates a config with defaults for everything but the base URL.
	pub fn new(api_base_url: Url) -> Self {
		Self {
			api_base_url,
			look_ahead_secs: Self::DEFAULT_LOOK_AHEAD_SECS,
			request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
			endpoints: EndpointPaths::default(),
			persistent_store_path: None,
		}
	}

	/// Parses a JSON document; errors carry the path of the offending field.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut de)?;

		config.validate()?;

		Ok(config)
	}

	/// Reads and parses a JSON config file.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path)?;

		Self::from_json_str(&raw)
	}

	/// Look-ahead window as a [`Duration`].
	pub fn look_ahead(&self) -> Duration {
		Duration::seconds(i64::try_from(self.look_ahead_secs).unwrap_or(i64::MAX))
	}

	/// Request timeout as a std duration.
	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.request_timeout_secs)
	}

	/// Resolves the configured endpoint URLs.
	pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
		Endpoints::resolve(&self.api_base_url, &self.endpoints)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.look_ahead_secs == 0 {
			return Err(ConfigError::NonPositiveLookAhead);
		}

		self.endpoints().map(|_| ())
	}

	fn default_look_ahead_secs() -> u64 {
		Self::DEFAULT_LOOK_AHEAD_SECS
	}

	fn default_request_timeout_secs() -> u64 {
		Self::DEFAULT_REQUEST_TIMEOUT_SECS
	}
}
