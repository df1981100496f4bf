//! Token coordinator: single-flight refresh, login, and logout over a [`CredentialStore`].
//!
//! [`TokenCoordinator::get_valid_token`] hands out the stored access token until it enters the
//! look-ahead window, then delegates to [`TokenCoordinator::refresh`]. Every refresh runs
//! through one in-flight handle: callers that arrive while a refresh is outstanding attach to
//! it and receive the same token or the same [`RefreshError`], so the server sees exactly one
//! request per flight. The handle is dropped once the flight resolves, whatever the outcome.
//!
//! Results are written back with a compare-and-swap on the refresh token that was sent, so a
//! logout or a new login that lands while the request is in the air is never overwritten.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{CredentialStatus, LoginRequest, SessionCredential, TokenSecret},
	error::RefreshError,
	http::{ExchangeError, SessionTransport},
	obs::{self, OpOutcome, OpSpan, SessionOp},
	store::{CompareAndSwapOutcome, CredentialStore, StorageTier, StoreError},
};
#[cfg(feature = "reqwest")]
use crate::{
	config::SessionConfig,
	http::ReqwestTransport,
	store::{FileStore, KeyValueStore, MemoryStore},
};

type RefreshOutcome = Result<TokenSecret, RefreshError>;
type Flight = Arc<Shared<BoxFuture<'static, RefreshOutcome>>>;

#[cfg(feature = "reqwest")]
/// Coordinator specialized for the crate's default reqwest transport.
pub type ReqwestCoordinator = TokenCoordinator<ReqwestTransport>;

/// Coarse session state for routing guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
	/// Nothing stored (or the store is unreadable).
	NoSession,
	/// Access token is usable as is.
	Valid,
	/// Access token is inside the look-ahead window or expired; the next use refreshes it.
	NeedsRefresh,
}

/// Single point through which callers obtain a usable access token.
pub struct TokenCoordinator<T>
where
	T: ?Sized + SessionTransport,
{
	/// Transport used for login, refresh, and logout exchanges.
	pub transport: Arc<T>,
	/// Tiered credential storage.
	pub store: Arc<CredentialStore>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	look_ahead: Duration,
	in_flight: Arc<Mutex<Option<Flight>>>,
}
impl<T> TokenCoordinator<T>
where
	T: ?Sized + SessionTransport,
{
	/// Default look-ahead window.
	pub const DEFAULT_LOOK_AHEAD: Duration = Duration::minutes(5);

	/// Creates a coordinator over the provided store and transport.
	pub fn new(store: Arc<CredentialStore>, transport: Arc<T>) -> Self {
		Self {
			transport,
			store,
			refresh_metrics: Default::default(),
			look_ahead: Self::DEFAULT_LOOK_AHEAD,
			in_flight: Default::default(),
		}
	}

	/// Overrides the look-ahead window (defaults to five minutes).
	pub fn with_look_ahead(mut self, window: Duration) -> Self {
		self.look_ahead = if window.is_negative() { Duration::ZERO } else { window };

		self
	}

	/// Returns the look-ahead window.
	pub fn look_ahead(&self) -> Duration {
		self.look_ahead
	}

	/// Returns `true` while a refresh is outstanding.
	pub fn is_refreshing(&self) -> bool {
		self.in_flight.lock().is_some()
	}

	/// Returns a usable access token, refreshing it first when it is inside the look-ahead
	/// window.
	///
	/// Refresh and storage failures are absorbed into `None`; the caller should send the user
	/// back to the login screen.
	pub async fn get_valid_token(&self) -> Option<TokenSecret> {
		let session = match self.store.load() {
			Ok(session) => session?,
			Err(e) => {
				obs::record_absorbed_failure(SessionOp::Refresh, &e);

				return None;
			},
		};

		if !session.credential.needs_refresh_at(OffsetDateTime::now_utc(), self.look_ahead) {
			return Some(session.credential.access_token);
		}

		match self.refresh().await {
			Ok(token) => Some(token),
			Err(e) => {
				obs::record_absorbed_failure(SessionOp::Refresh, &e);

				None
			},
		}
	}

	/// Exchanges the stored refresh token for a new access token.
	///
	/// Concurrent callers share one request and one result. Failures are not retried.
	pub async fn refresh(&self) -> Result<TokenSecret, RefreshError> {
		const OP: SessionOp = SessionOp::Refresh;

		let span = OpSpan::new(OP, "refresh");

		obs::record_op_outcome(OP, OpOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let flight = self.join_flight();
		let result = span.instrument(Shared::clone(&flight)).await;

		self.finish_flight(&flight);

		match &result {
			Ok(_) => {
				self.refresh_metrics.record_success();
				obs::record_op_outcome(OP, OpOutcome::Success);
			},
			Err(_) => {
				self.refresh_metrics.record_failure();
				obs::record_op_outcome(OP, OpOutcome::Failure);
			},
		}

		result
	}

	/// Logs in and stores the new session in `tier`.
	pub async fn login(&self, request: &LoginRequest, tier: StorageTier) -> Result<TokenSecret> {
		const OP: SessionOp = SessionOp::Login;

		let span = OpSpan::new(OP, "login");

		obs::record_op_outcome(OP, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let grant = self.transport.login(request).await.map_err(|err| match err {
					ExchangeError::Rejected { status, reason } =>
						Error::LoginRejected { status, reason },
					ExchangeError::Transport(inner) => Error::Transport(inner),
				})?;
				let credential = SessionCredential::from_grant(grant, OffsetDateTime::now_utc());

				self.establish(credential.clone(), tier)?;

				Ok::<_, Error>(credential.access_token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_op_outcome(OP, OpOutcome::Success),
			Err(_) => obs::record_op_outcome(OP, OpOutcome::Failure),
		}

		result
	}

	/// Installs a credential obtained elsewhere, replacing any existing session.
	pub fn establish(
		&self,
		credential: SessionCredential,
		tier: StorageTier,
	) -> Result<(), StoreError> {
		self.detach_flight();
		self.store.replace(tier, &credential)
	}

	/// Ends the session.
	///
	/// Local state is cleared when this method is called, before the returned future is first
	/// polled. The future then notifies the server; that notification is best effort and its
	/// failure is only logged. The returned error reports a local storage failure.
	pub fn logout(&self) -> impl Future<Output = Result<(), StoreError>> + Send + '_ {
		const OP: SessionOp = SessionOp::Logout;

		let span = OpSpan::new(OP, "logout");

		obs::record_op_outcome(OP, OpOutcome::Attempt);
		self.detach_flight();

		let cleared = self.store.take();
		let refresh_token = match &cleared {
			Ok(Some(previous)) => previous.credential.refresh_token.clone(),
			_ => None,
		};

		async move {
			span.instrument(async {
				if let Err(e) = self.transport.logout(refresh_token.as_ref()).await {
					obs::record_absorbed_failure(OP, &e);
				}
			})
			.await;

			match &cleared {
				Ok(_) => obs::record_op_outcome(OP, OpOutcome::Success),
				Err(_) => obs::record_op_outcome(OP, OpOutcome::Failure),
			}

			cleared.map(|_| ())
		}
	}

	/// Reports whether a session exists and whether its token is usable as is.
	pub fn session_state(&self) -> SessionState {
		match self.store.load() {
			Ok(Some(session)) =>
				match session.credential.status_at(OffsetDateTime::now_utc(), self.look_ahead) {
					CredentialStatus::Active => SessionState::Valid,
					CredentialStatus::Expiring | CredentialStatus::Expired =>
						SessionState::NeedsRefresh,
				},
			Ok(None) => SessionState::NoSession,
			Err(e) => {
				obs::record_absorbed_failure(SessionOp::Refresh, &e);

				SessionState::NoSession
			},
		}
	}

	// Owns its handles so the request outlives any single waiter.
	async fn perform_refresh(
		store: Arc<CredentialStore>,
		transport: Arc<T>,
		metrics: Arc<RefreshMetrics>,
	) -> RefreshOutcome {
		let Some(current) = store.load()? else {
			return Err(RefreshError::NoRefreshTokenAvailable);
		};
		let Some(refresh_token) = current.credential.refresh_token.clone() else {
			// Nothing can renew this access token, so it is dropped with the session.
			store.clear()?;

			return Err(RefreshError::NoRefreshTokenAvailable);
		};

		metrics.record_network_call();

		let grant = match transport.refresh(&refresh_token).await {
			Ok(grant) => grant,
			Err(err) => {
				let err = RefreshError::from(err);

				if err.is_terminal() {
					if let Err(e) = store.clear_if_refresh(refresh_token.expose()) {
						obs::record_absorbed_failure(SessionOp::Refresh, &e);
					}
				}

				return Err(err);
			},
		};
		let replacement = current.credential.rotated(grant, OffsetDateTime::now_utc());

		match store.compare_and_swap_refresh(refresh_token.expose(), &replacement)? {
			CompareAndSwapOutcome::Updated => Ok(replacement.access_token),
			// A new login replaced the session mid-flight; its token wins.
			CompareAndSwapOutcome::RefreshMismatch => store
				.load()?
				.map(|session| session.credential.access_token)
				.ok_or(RefreshError::NoRefreshTokenAvailable),
			// Logged out mid-flight.
			CompareAndSwapOutcome::Missing => Err(RefreshError::NoRefreshTokenAvailable),
		}
	}

	fn join_flight(&self) -> Flight {
		let mut slot = self.in_flight.lock();

		match slot.as_ref() {
			Some(flight) => {
				obs::record_joined_flight();

				flight.clone()
			},
			None => {
				let flight = Arc::new(
					Self::perform_refresh(
						self.store.clone(),
						self.transport.clone(),
						self.refresh_metrics.clone(),
					)
					.boxed()
					.shared(),
				);

				*slot = Some(flight.clone());

				flight
			},
		}
	}

	fn finish_flight(&self, flight: &Flight) {
		let mut slot = self.in_flight.lock();

		if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, flight)) {
			*slot = None;
		}
	}

	fn detach_flight(&self) {
		self.in_flight.lock().take();
	}
}
#[cfg(feature = "reqwest")]
impl TokenCoordinator<ReqwestTransport> {
	/// Builds a reqwest-backed coordinator from configuration.
	///
	/// The persistent tier is file-backed when `persistent_store_path` is set and in-memory
	/// otherwise; the session tier is always in-memory.
	pub fn from_config(config: &SessionConfig) -> Result<Self> {
		let transport =
			ReqwestTransport::with_timeout(config.endpoints()?, config.request_timeout())?;
		let persistent: Arc<dyn KeyValueStore> = match &config.persistent_store_path {
			Some(path) => Arc::new(FileStore::open(path)?),
			None => Arc::new(MemoryStore::default()),
		};
		let store = Arc::new(CredentialStore::new(persistent, Arc::new(MemoryStore::default())));

		Ok(Self::new(store, Arc::new(transport)).with_look_ahead(config.look_ahead()))
	}
}
impl<T> Clone for TokenCoordinator<T>
where
	T: ?Sized + SessionTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			look_ahead: self.look_ahead,
			in_flight: self.in_flight.clone(),
		}
	}
}
impl<T> Debug for TokenCoordinator<T>
where
	T: ?Sized + SessionTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCoordinator")
			.field("look_ahead", &self.look_ahead)
			.field("refreshing", &self.is_refreshing())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{build_memory_coordinator, seed_credential},
		auth::LoginRequest,
		error::TransportError,
		http::{ExchangeFuture, RefreshGrant, SessionGrant},
	};

	struct Offline;
	impl Offline {
		fn unavailable<T>() -> ExchangeFuture<'static, T>
		where
			T: 'static,
		{
			Box::pin(async {
				Err::<T, ExchangeError>(TransportError::Status { status: 503 }.into())
			})
		}
	}
	impl SessionTransport for Offline {
		fn login<'a>(&'a self, _: &'a LoginRequest) -> ExchangeFuture<'a, SessionGrant> {
			Self::unavailable()
		}

		fn refresh<'a>(&'a self, _: &'a TokenSecret) -> ExchangeFuture<'a, RefreshGrant> {
			Self::unavailable()
		}

		fn logout<'a>(&'a self, _: Option<&'a TokenSecret>) -> ExchangeFuture<'a, ()> {
			Self::unavailable()
		}
	}

	#[test]
	fn negative_look_ahead_clamps_to_zero() {
		let (coordinator, _) = build_memory_coordinator(Arc::new(Offline));
		let coordinator = coordinator.with_look_ahead(Duration::minutes(-1));

		assert_eq!(coordinator.look_ahead(), Duration::ZERO);
	}

	#[test]
	fn session_state_follows_store() {
		let (coordinator, store) = build_memory_coordinator(Arc::new(Offline));

		assert_eq!(coordinator.session_state(), SessionState::NoSession);

		seed_credential(&store, StorageTier::Session, "a", Some("r"), Duration::hours(1));

		assert_eq!(coordinator.session_state(), SessionState::Valid);

		seed_credential(&store, StorageTier::Session, "a", Some("r"), Duration::minutes(1));

		assert_eq!(coordinator.session_state(), SessionState::NeedsRefresh);

		seed_credential(&store, StorageTier::Persistent, "a", Some("r"), Duration::minutes(-5));

		assert_eq!(coordinator.session_state(), SessionState::NeedsRefresh);
	}

	#[test]
	fn finished_flight_only_clears_itself() {
		let (coordinator, _) = build_memory_coordinator(Arc::new(Offline));
		let first = coordinator.join_flight();
		let joined = coordinator.join_flight();

		assert!(Arc::ptr_eq(&first, &joined));

		coordinator.finish_flight(&first);

		assert!(!coordinator.is_refreshing());

		let second = coordinator.join_flight();

		coordinator.finish_flight(&first);

		assert!(coordinator.is_refreshing());

		coordinator.finish_flight(&second);

		assert!(!coordinator.is_refreshing());
	}

	#[tokio::test]
	async fn transport_failure_keeps_credential_and_resets_flight() {
		let (coordinator, store) = build_memory_coordinator(Arc::new(Offline));

		seed_credential(&store, StorageTier::Persistent, "a-1", Some("r-1"), Duration::seconds(30));

		let err = coordinator.refresh().await.expect_err("Offline transport should fail.");

		assert!(matches!(err, RefreshError::RefreshTransportError { .. }));
		assert!(!coordinator.is_refreshing());

		let stored = store.load().expect("Load should succeed.").expect("Credential is kept.");

		assert_eq!(stored.credential.access_token.expose(), "a-1");
		assert_eq!(coordinator.refresh_metrics.failures(), 1);
	}

	#[tokio::test]
	async fn login_transport_failure_is_not_a_rejection() {
		let (coordinator, _) = build_memory_coordinator(Arc::new(Offline));
		let err = coordinator
			.login(&LoginRequest::new("a@b.test", "pw"), StorageTier::Session)
			.await
			.expect_err("Offline login should fail.");

		assert!(matches!(err, Error::Transport(TransportError::Status { status: 503 })));
		assert!(!err.requires_login());
	}
}
