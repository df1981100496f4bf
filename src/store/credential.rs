//! Tiered credential store: persistent and session-scoped key-value areas behind one lock.
//!
//! Each tier holds the same three keys. Reads prefer the persistent tier whenever it holds an
//! access token and fall back to the session tier. A credential is written into exactly one
//! tier, and every multi-key read or write happens under a single mutex so readers never see a
//! half-replaced credential.

// self
use crate::{
	_prelude::*,
	auth::{SessionCredential, TokenSecret},
	obs::{self, SessionOp},
	store::{CompareAndSwapOutcome, KeyValueStore, KeyWrite, StorageTier, StoreError},
};

/// Key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Key holding the access-token expiry as unix seconds.
pub const TOKEN_EXPIRY_KEY: &str = "tokenExpiry";

/// Credential read back from storage, tagged with the tier it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSession {
	/// Tier the credential was read from.
	pub tier: StorageTier,
	/// Stored credential.
	pub credential: SessionCredential,
}

/// Credential storage over a persistent and a session-scoped [`KeyValueStore`].
pub struct CredentialStore {
	persistent: Arc<dyn KeyValueStore>,
	session: Arc<dyn KeyValueStore>,
	lock: Mutex<()>,
}
impl CredentialStore {
	/// Creates a store over the two tiers.
	pub fn new(persistent: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
		Self { persistent, session, lock: Mutex::new(()) }
	}

	/// Loads the credential using the tier precedence rule.
	pub fn load(&self) -> Result<Option<StoredSession>, StoreError> {
		let _guard = self.lock.lock();

		self.load_locked()
	}

	/// Replaces the session wholesale: writes `credential` into `tier` and clears the other tier.
	pub fn replace(
		&self,
		tier: StorageTier,
		credential: &SessionCredential,
	) -> Result<(), StoreError> {
		let _guard = self.lock.lock();

		self.clear_tier(tier.other())?;
		self.write_locked(tier, credential)
	}

	/// Replaces the stored credential if its refresh token still equals `expected_refresh`.
	///
	/// The replacement lands in the tier the current credential lives in.
	pub fn compare_and_swap_refresh(
		&self,
		expected_refresh: &str,
		replacement: &SessionCredential,
	) -> Result<CompareAndSwapOutcome, StoreError> {
		let _guard = self.lock.lock();
		let Some(current) = self.load_locked()? else {
			return Ok(CompareAndSwapOutcome::Missing);
		};

		if !Self::refresh_matches(current.credential.refresh_token.as_ref(), expected_refresh) {
			return Ok(CompareAndSwapOutcome::RefreshMismatch);
		}

		self.write_locked(current.tier, replacement)?;

		Ok(CompareAndSwapOutcome::Updated)
	}

	/// Clears both tiers if the stored refresh token still equals `expected_refresh`.
	///
	/// Returns `true` when the session was cleared.
	pub fn clear_if_refresh(&self, expected_refresh: &str) -> Result<bool, StoreError> {
		let _guard = self.lock.lock();
		let matches = match self.load_locked()? {
			Some(current) =>
				Self::refresh_matches(current.credential.refresh_token.as_ref(), expected_refresh),
			None => false,
		};

		if matches {
			self.clear_locked()?;
		}

		Ok(matches)
	}

	/// Removes every credential key from both tiers and returns what was stored.
	///
	/// Both tiers are cleared even when reading or clearing one of them fails; the first error
	/// is reported.
	pub fn take(&self) -> Result<Option<StoredSession>, StoreError> {
		let _guard = self.lock.lock();
		let loaded = self.load_locked();
		let cleared = self.clear_locked();

		match (loaded, cleared) {
			(Ok(previous), Ok(())) => Ok(previous),
			(Err(e), _) | (Ok(_), Err(e)) => Err(e),
		}
	}

	/// Removes every credential key from both tiers.
	pub fn clear(&self) -> Result<(), StoreError> {
		let _guard = self.lock.lock();

		self.clear_locked()
	}

	fn tier(&self, tier: StorageTier) -> &dyn KeyValueStore {
		match tier {
			StorageTier::Persistent => self.persistent.as_ref(),
			StorageTier::Session => self.session.as_ref(),
		}
	}

	fn load_locked(&self) -> Result<Option<StoredSession>, StoreError> {
		for tier in StorageTier::PRECEDENCE {
			let kv = self.tier(tier);
			let Some(access) = kv.get(ACCESS_TOKEN_KEY)? else {
				continue;
			};
			let refresh = kv.get(REFRESH_TOKEN_KEY)?;
			let expires_at = match kv.get(TOKEN_EXPIRY_KEY)? {
				Some(raw) => Self::decode_expiry(&raw)?,
				// No recorded expiry: force a refresh before the token is used.
				None => OffsetDateTime::UNIX_EPOCH,
			};
			let credential = SessionCredential {
				access_token: TokenSecret::new(access),
				refresh_token: refresh.map(TokenSecret::new),
				expires_at,
			};

			return Ok(Some(StoredSession { tier, credential }));
		}

		Ok(None)
	}

	fn write_locked(
		&self,
		tier: StorageTier,
		credential: &SessionCredential,
	) -> Result<(), StoreError> {
		let expiry = credential.expires_at.unix_timestamp().to_string();
		let refresh = match &credential.refresh_token {
			Some(refresh) => KeyWrite::Set(REFRESH_TOKEN_KEY, refresh.expose()),
			None => KeyWrite::Remove(REFRESH_TOKEN_KEY),
		};
		// The access token goes last: its presence is what marks a tier as holding a session.
		let written = self.tier(tier).apply(&[
			KeyWrite::Set(TOKEN_EXPIRY_KEY, &expiry),
			refresh,
			KeyWrite::Set(ACCESS_TOKEN_KEY, credential.access_token.expose()),
		]);

		if let Err(e) = written {
			// Never leave a mix of old and new fields behind.
			if let Err(rollback) = self.clear_tier(tier) {
				obs::record_absorbed_failure(SessionOp::Store, &rollback);

				return Err(StoreError::Backend {
					message: format!(
						"{e}; clearing the {tier} tier afterwards also failed ({rollback}), so it \
						 may hold a partial credential"
					),
				});
			}

			return Err(e);
		}

		Ok(())
	}

	fn clear_locked(&self) -> Result<(), StoreError> {
		let persistent = self.clear_tier(StorageTier::Persistent);
		let session = self.clear_tier(StorageTier::Session);

		persistent.and(session)
	}

	fn clear_tier(&self, tier: StorageTier) -> Result<(), StoreError> {
		self.tier(tier).apply(&[
			KeyWrite::Remove(ACCESS_TOKEN_KEY),
			KeyWrite::Remove(REFRESH_TOKEN_KEY),
			KeyWrite::Remove(TOKEN_EXPIRY_KEY),
		])
	}

	fn decode_expiry(raw: &str) -> Result<OffsetDateTime, StoreError> {
		let seconds = raw.trim().parse::<i64>().map_err(|e| StoreError::Serialization {
			message: format!("Stored {TOKEN_EXPIRY_KEY} `{raw}` is not an integer: {e}"),
		})?;

		OffsetDateTime::from_unix_timestamp(seconds).map_err(|e| StoreError::Serialization {
			message: format!("Stored {TOKEN_EXPIRY_KEY} `{raw}` is out of range: {e}"),
		})
	}

	fn refresh_matches(current: Option<&TokenSecret>, expected: &str) -> bool {
		current.is_some_and(|current| current.expose() == expected)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CredentialStore(..)")
	}
}
