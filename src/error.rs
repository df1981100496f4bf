//! Session-level error types shared across the coordinator, transports, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure outside of a refresh (DNS, TCP, TLS, unexpected responses).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Refreshing the session failed.
	#[error(transparent)]
	Refresh(#[from] RefreshError),
	/// Credential could not be assembled from the server response.
	#[error("Unable to build session credential.")]
	Credential(#[from] crate::auth::CredentialBuilderError),

	/// Server declined the login attempt.
	#[error("Login was rejected: {reason}.")]
	LoginRejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Server- or client-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the only way forward is a fresh login.
	///
	/// UI layers use this to show "please log in again" instead of a generic network error.
	pub fn requires_login(&self) -> bool {
		match self {
			Self::Refresh(err) => err.is_terminal(),
			Self::LoginRejected { .. } => true,
			_ => false,
		}
	}
}

/// Failure shared by every caller attached to one refresh.
///
/// The type is cheap to clone so the single in-flight result can be handed to all waiters.
#[derive(Clone, Debug, ThisError)]
pub enum RefreshError {
	/// Nothing to refresh with; the caller must re-authenticate.
	#[error("No refresh token is available; the session must be re-established.")]
	NoRefreshTokenAvailable,
	/// Server declined the refresh token (expired or revoked); the session is cleared.
	#[error("Refresh token was rejected: {reason}.")]
	RefreshRejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Server-supplied reason string.
		reason: String,
	},
	/// Network or timeout failure; a later explicit refresh may succeed.
	#[error("Refresh request failed in transit.")]
	RefreshTransportError {
		/// Underlying transport failure.
		#[source]
		source: Arc<TransportError>,
	},
	/// Reading or writing the stored credential failed.
	#[error(transparent)]
	Storage(#[from] crate::store::StoreError),
}
impl RefreshError {
	/// Returns `true` when retrying cannot help without a new login.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::NoRefreshTokenAvailable | Self::RefreshRejected { .. })
	}
}
impl From<TransportError> for RefreshError {
	fn from(e: TransportError) -> Self {
		Self::RefreshTransportError { source: Arc::new(e) }
	}
}
impl From<crate::http::ExchangeError> for RefreshError {
	fn from(e: crate::http::ExchangeError) -> Self {
		match e {
			crate::http::ExchangeError::Rejected { status, reason } =>
				Self::RefreshRejected { status, reason },
			crate::http::ExchangeError::Transport(inner) => inner.into(),
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL or endpoint path cannot be parsed.
	#[error("Endpoint `{endpoint}` is not a valid URL.")]
	InvalidUrl {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoint would send credentials over plain HTTP to a non-loopback host.
	#[error("Endpoint `{endpoint}` must use https: {url}.")]
	InsecureEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Config file could not be read.
	#[error("Config file could not be read.")]
	Read(#[from] std::io::Error),
	/// Config document is malformed.
	#[error("Config field `{path}` is invalid.")]
	Parse {
		/// JSON path of the failing field.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// Look-ahead window must leave room for a refresh.
	#[error("The look-ahead window must be positive.")]
	NonPositiveLookAhead,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let path = e.path().to_string();

		Self::Parse { path, source: e.into_inner() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, unexpected status, malformed bodies).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure or timeout.
	#[error("Network error occurred while calling the session endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request body could not be encoded.
	#[error("Request body could not be encoded.")]
	Encode {
		/// Serializer failure.
		#[source]
		source: serde_json::Error,
	},
	/// Server answered with a status that is neither success nor a rejection.
	#[error("Session endpoint returned unexpected status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
	},
	/// Response body could not be decoded.
	#[error("Session endpoint returned malformed JSON.")]
	Malformed {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Response decoded but carries unusable values.
	#[error("Session endpoint returned an invalid response: {reason}.")]
	InvalidResponse {
		/// Description of the offending value.
		reason: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
