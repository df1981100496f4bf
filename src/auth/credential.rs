//! Session credential record, lifecycle helpers, and builder.

// self
use crate::{
	_prelude::*,
	auth::secret::TokenSecret,
	http::{RefreshGrant, SessionGrant},
};

/// Freshness of a credential relative to a look-ahead window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Access token is usable and outside the look-ahead window.
	Active,
	/// Access token is still valid but inside the look-ahead window.
	Expiring,
	/// Access token passed its expiry instant.
	Expired,
}

/// Errors produced by [`SessionCredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Access token, optional refresh token, and the instant the access token stops working.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
	/// Short-lived bearer token attached to API requests.
	pub access_token: TokenSecret,
	/// Longer-lived token exchanged for a new access token.
	pub refresh_token: Option<TokenSecret>,
	/// Instant after which the access token must be treated as unusable.
	pub expires_at: OffsetDateTime,
}
impl SessionCredential {
	/// Returns a builder for assembling credentials.
	pub fn builder() -> SessionCredentialBuilder {
		SessionCredentialBuilder::default()
	}

	/// Builds the credential issued by a successful login.
	pub fn from_grant(grant: SessionGrant, now: OffsetDateTime) -> Self {
		Self {
			access_token: grant.access_token,
			refresh_token: grant.refresh_token,
			expires_at: now + grant.expires_in,
		}
	}

	/// Produces the replacement credential after a refresh.
	///
	/// The refresh token is kept unless the server rotated it.
	pub fn rotated(&self, grant: RefreshGrant, now: OffsetDateTime) -> Self {
		Self {
			access_token: grant.access_token,
			refresh_token: grant.refresh_token.or_else(|| self.refresh_token.clone()),
			expires_at: now + grant.expires_in,
		}
	}

	/// Computes the status at `now` for the given look-ahead window.
	pub fn status_at(&self, now: OffsetDateTime, look_ahead: Duration) -> CredentialStatus {
		if now >= self.expires_at {
			return CredentialStatus::Expired;
		}
		if self.expires_at - now <= look_ahead {
			return CredentialStatus::Expiring;
		}

		CredentialStatus::Active
	}

	/// Returns `true` when the access token should be refreshed before use.
	pub fn needs_refresh_at(&self, now: OffsetDateTime, look_ahead: Duration) -> bool {
		!matches!(self.status_at(now, look_ahead), CredentialStatus::Active)
	}
}
impl Debug for SessionCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionCredential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`SessionCredential`].
#[derive(Clone, Debug, Default)]
pub struct SessionCredentialBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl SessionCredentialBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the instant `expires_in` is measured from (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`SessionCredential`].
	pub fn build(self) -> Result<SessionCredential, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => self.issued_at.unwrap_or_else(OffsetDateTime::now_utc) + delta,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		Ok(SessionCredential { access_token, refresh_token: self.refresh_token, expires_at })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn credential(expires_at: OffsetDateTime) -> SessionCredential {
		SessionCredential::builder()
			.access_token("access")
			.refresh_token("refresh")
			.expires_at(expires_at)
			.build()
			.expect("Credential fixture should build.")
	}

	#[test]
	fn status_respects_look_ahead_window() {
		let record = credential(macros::datetime!(2025-01-01 01:00 UTC));
		let window = Duration::minutes(5);

		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:30 UTC), window),
			CredentialStatus::Active
		);
		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:55 UTC), window),
			CredentialStatus::Expiring
		);
		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 01:00 UTC), window),
			CredentialStatus::Expired
		);
		assert!(record.needs_refresh_at(macros::datetime!(2025-01-01 00:56 UTC), window));
		assert!(!record.needs_refresh_at(macros::datetime!(2025-01-01 00:54 UTC), window));
		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 01:01 UTC), window),
			CredentialStatus::Expired
		);
	}

	#[test]
	fn builder_handles_relative_expiry_and_missing_fields() {
		let record = SessionCredential::builder()
			.access_token("secret")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Builder should support relative expiry calculations.");

		assert_eq!(record.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
		assert!(record.refresh_token.is_none());
		assert_eq!(
			SessionCredential::builder().expires_in(Duration::minutes(1)).build(),
			Err(CredentialBuilderError::MissingAccessToken)
		);
		assert_eq!(
			SessionCredential::builder().access_token("a").build(),
			Err(CredentialBuilderError::MissingExpiry)
		);
	}

	#[test]
	fn rotation_keeps_refresh_token_unless_replaced() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let current = credential(now);
		let kept = current.rotated(
			RefreshGrant {
				access_token: TokenSecret::new("next"),
				refresh_token: None,
				expires_in: Duration::hours(1),
			},
			now,
		);

		assert_eq!(kept.access_token.expose(), "next");
		assert_eq!(kept.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
		assert_eq!(kept.expires_at, macros::datetime!(2025-01-01 01:00 UTC));

		let rotated = current.rotated(
			RefreshGrant {
				access_token: TokenSecret::new("next"),
				refresh_token: Some(TokenSecret::new("refresh-2")),
				expires_in: Duration::hours(1),
			},
			now,
		);

		assert_eq!(rotated.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-2"));
	}

	#[test]
	fn debug_output_redacts_tokens() {
		let rendered = format!("{:?}", credential(macros::datetime!(2025-01-01 00:00 UTC)));

		assert!(!rendered.contains("access\""));
		assert!(rendered.contains("<redacted>"));
	}
}
