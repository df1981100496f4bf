//! Network boundary for session exchanges (login, refresh, logout).
//!
//! [`SessionTransport`] is the coordinator's only dependency on an HTTP stack, so tests and
//! downstream crates can substitute their own implementation. The default [`ReqwestTransport`]
//! posts JSON bodies to the endpoints resolved by [`Endpoints`] and classifies every
//! non-success answer through [`classify_failure`].

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{LoginRequest, TokenSecret},
	error::TransportError,
};
#[cfg(feature = "reqwest")]
use crate::{config::Endpoints, error::ConfigError};

/// Boxed future returned by [`SessionTransport`] operations.
pub type ExchangeFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, ExchangeError>> + 'a + Send>>;

/// Upper bound accepted for `expiresIn` (ten years).
const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Transport contract implemented by session backends.
pub trait SessionTransport
where
	Self: 'static + Send + Sync,
{
	/// Exchanges email/password for a new session.
	fn login<'a>(&'a self, request: &'a LoginRequest) -> ExchangeFuture<'a, SessionGrant>;

	/// Exchanges a refresh token for a new access token.
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a, RefreshGrant>;

	/// Notifies the server that the session ended.
	fn logout<'a>(&'a self, refresh_token: Option<&'a TokenSecret>) -> ExchangeFuture<'a, ()>;
}

/// Outcome of a failed exchange, before the caller maps it into its own taxonomy.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Server declined the submitted credential.
	#[error("Session endpoint rejected the request: {reason}.")]
	Rejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Server-supplied reason string.
		reason: String,
	},
	/// The exchange failed before a usable answer arrived.
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Tokens issued by a successful login.
#[derive(Clone, Debug)]
pub struct SessionGrant {
	/// New access token.
	pub access_token: TokenSecret,
	/// New refresh token, when the server issues one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime of the access token.
	pub expires_in: Duration,
}

/// Tokens issued by a successful refresh.
#[derive(Clone, Debug)]
pub struct RefreshGrant {
	/// New access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token, if the server rotates them.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime of the access token.
	pub expires_in: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionGrantBody {
	access_token: TokenSecret,
	#[serde(default)]
	refresh_token: Option<TokenSecret>,
	expires_in: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshGrantBody {
	#[serde(alias = "newAccessToken")]
	access_token: TokenSecret,
	#[serde(default)]
	refresh_token: Option<TokenSecret>,
	#[serde(alias = "expiresInSeconds")]
	expires_in: i64,
}

#[derive(Default, Deserialize)]
struct ErrorBody {
	#[serde(default)]
	message: Option<String>,
	#[serde(default)]
	error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
	refresh_token: &'a str,
}

/// Decodes a login response body.
pub fn decode_session_grant(bytes: &[u8]) -> Result<SessionGrant, TransportError> {
	let body: SessionGrantBody = decode_json(bytes)?;

	Ok(SessionGrant {
		access_token: body.access_token,
		refresh_token: body.refresh_token,
		expires_in: expires_in_from_secs(body.expires_in)?,
	})
}

/// Decodes a refresh response body.
pub fn decode_refresh_grant(bytes: &[u8]) -> Result<RefreshGrant, TransportError> {
	let body: RefreshGrantBody = decode_json(bytes)?;

	Ok(RefreshGrant {
		access_token: body.access_token,
		refresh_token: body.refresh_token,
		expires_in: expires_in_from_secs(body.expires_in)?,
	})
}

/// Maps a non-success status and its body onto an [`ExchangeError`].
///
/// `400`, `401`, and `403` mean the submitted credential was declined; everything else is a
/// transport-level failure the caller may retry later.
pub fn classify_failure(status: u16, body: &[u8]) -> ExchangeError {
	match status {
		400 | 401 | 403 => {
			let parsed = serde_json::from_slice::<ErrorBody>(body).unwrap_or_default();
			let reason = parsed
				.message
				.or(parsed.error)
				.filter(|reason| !reason.trim().is_empty())
				.unwrap_or_else(|| format!("status {status}"));

			ExchangeError::Rejected { status: Some(status), reason }
		},
		_ => TransportError::Status { status }.into(),
	}
}

fn decode_json<T>(bytes: &[u8]) -> Result<T, TransportError>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut de).map_err(|source| TransportError::Malformed { source })
}

fn encode_json<T>(body: &T) -> Result<Vec<u8>, TransportError>
where
	T: ?Sized + Serialize,
{
	serde_json::to_vec(body).map_err(|source| TransportError::Encode { source })
}

fn expires_in_from_secs(secs: i64) -> Result<Duration, TransportError> {
	if secs <= 0 {
		return Err(TransportError::InvalidResponse {
			reason: format!("expiresIn must be positive, got {secs}"),
		});
	}
	if secs > MAX_EXPIRES_IN_SECS {
		return Err(TransportError::InvalidResponse {
			reason: format!("expiresIn {secs} exceeds the supported range"),
		});
	}

	Ok(Duration::seconds(secs))
}

/// Default transport that posts JSON to the Teacherrs REST API with reqwest.
///
/// Redirects are disabled so credentials are never replayed to another origin. The request
/// timeout configured on the client bounds every exchange; a timed-out refresh surfaces as a
/// transport failure.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	endpoints: Endpoints,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Default per-request timeout.
	pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

	/// Builds a transport with its own client using [`Self::DEFAULT_TIMEOUT`].
	pub fn new(endpoints: Endpoints) -> Result<Self, ConfigError> {
		Self::with_timeout(endpoints, Self::DEFAULT_TIMEOUT)
	}

	/// Builds a transport with its own client and the provided request timeout.
	pub fn with_timeout(
		endpoints: Endpoints,
		timeout: std::time::Duration,
	) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.timeout(timeout)
			.build()?;

		Ok(Self::with_client(client, endpoints))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient, endpoints: Endpoints) -> Self {
		Self { client, endpoints }
	}

	/// Returns the underlying client, for reuse by [`crate::client::AuthorizedClient`].
	pub fn client(&self) -> &ReqwestClient {
		&self.client
	}

	/// Returns the resolved endpoints.
	pub fn endpoints(&self) -> &Endpoints {
		&self.endpoints
	}

	async fn post_json(&self, url: &Url, body: Vec<u8>) -> Result<Vec<u8>, ExchangeError> {
		use reqwest::header::{ACCEPT, CONTENT_TYPE};

		let response = self
			.client
			.post(url.clone())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.body(body)
			.send()
			.await
			.map_err(TransportError::from)?;
		let status = response.status();
		let bytes = response.bytes().await.map_err(TransportError::from)?;

		if status.is_success() {
			Ok(bytes.to_vec())
		} else {
			Err(classify_failure(status.as_u16(), &bytes))
		}
	}
}
#[cfg(feature = "reqwest")]
impl SessionTransport for ReqwestTransport {
	fn login<'a>(&'a self, request: &'a LoginRequest) -> ExchangeFuture<'a, SessionGrant> {
		Box::pin(async move {
			let body = encode_json(request)?;
			let bytes = self.post_json(self.endpoints.login_for(request.account), body).await?;

			Ok::<_, ExchangeError>(decode_session_grant(&bytes)?)
		})
	}

	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a, RefreshGrant> {
		Box::pin(async move {
			let body = encode_json(&RefreshBody { refresh_token: refresh_token.expose() })?;
			let bytes = self.post_json(&self.endpoints.refresh, body).await?;

			Ok::<_, ExchangeError>(decode_refresh_grant(&bytes)?)
		})
	}

	fn logout<'a>(&'a self, refresh_token: Option<&'a TokenSecret>) -> ExchangeFuture<'a, ()> {
		Box::pin(async move {
			let body = match refresh_token {
				Some(token) => encode_json(&RefreshBody { refresh_token: token.expose() })?,
				None => b"{}".to_vec(),
			};

			self.post_json(&self.endpoints.logout, body).await?;

			Ok::<_, ExchangeError>(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn refresh_grant_accepts_both_field_spellings() {
		let short = decode_refresh_grant(br#"{"accessToken":"T2","expiresIn":3600}"#)
			.expect("camelCase refresh body should decode.");

		assert_eq!(short.access_token.expose(), "T2");
		assert_eq!(short.expires_in, Duration::hours(1));
		assert!(short.refresh_token.is_none());

		let long = decode_refresh_grant(
			br#"{"newAccessToken":"T3","expiresInSeconds":60,"refreshToken":"R3"}"#,
		)
		.expect("Long-form refresh body should decode.");

		assert_eq!(long.access_token.expose(), "T3");
		assert_eq!(long.refresh_token.as_ref().map(TokenSecret::expose), Some("R3"));
	}

	#[test]
	fn malformed_bodies_report_the_failing_path() {
		let err = decode_session_grant(br#"{"accessToken":"a","expiresIn":"soon"}"#)
			.expect_err("String expiresIn should not decode.");

		assert!(
			matches!(&err, TransportError::Malformed { source } if source.path().to_string() == "expiresIn")
		);
	}

	#[test]
	fn expires_in_must_be_positive_and_bounded() {
		assert!(matches!(
			decode_refresh_grant(br#"{"accessToken":"a","expiresIn":0}"#),
			Err(TransportError::InvalidResponse { .. })
		));
		assert!(matches!(
			decode_refresh_grant(br#"{"accessToken":"a","expiresIn":999999999999}"#),
			Err(TransportError::InvalidResponse { .. })
		));
	}

	#[test]
	fn failures_split_into_rejections_and_transport_errors() {
		assert!(matches!(
			classify_failure(401, br#"{"message":"Refresh token expired"}"#),
			ExchangeError::Rejected { status: Some(401), reason } if reason == "Refresh token expired"
		));
		assert!(matches!(
			classify_failure(403, b"<html>forbidden</html>"),
			ExchangeError::Rejected { status: Some(403), reason } if reason == "status 403"
		));
		assert!(matches!(
			classify_failure(503, b""),
			ExchangeError::Transport(TransportError::Status { status: 503 })
		));
	}
}
