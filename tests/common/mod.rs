#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use teacherrs_session::{
	auth::SessionCredential,
	config::Endpoints,
	coordinator::{ReqwestCoordinator, TokenCoordinator},
	http::{ReqwestTransport, SessionTransport},
	store::{CredentialStore, MemoryStore, StorageTier},
};

pub fn memory_store() -> Arc<CredentialStore> {
	Arc::new(CredentialStore::new(
		Arc::new(MemoryStore::default()),
		Arc::new(MemoryStore::default()),
	))
}

pub fn build_memory_coordinator<T>(transport: Arc<T>) -> (TokenCoordinator<T>, Arc<CredentialStore>)
where
	T: ?Sized + SessionTransport,
{
	let store = memory_store();

	(TokenCoordinator::new(store.clone(), transport), store)
}

pub fn build_reqwest_test_coordinator(base: &str) -> (ReqwestCoordinator, Arc<CredentialStore>) {
	build_reqwest_test_coordinator_with_timeout(base, ReqwestTransport::DEFAULT_TIMEOUT)
}

pub fn build_reqwest_test_coordinator_with_timeout(
	base: &str,
	timeout: std::time::Duration,
) -> (ReqwestCoordinator, Arc<CredentialStore>) {
	let base = Url::parse(base).expect("Failed to parse test base URL.");
	let endpoints = Endpoints::from_base(&base)
		.expect("Test endpoints should resolve against a loopback base.");
	let transport = ReqwestTransport::with_timeout(endpoints, timeout)
		.expect("Failed to build reqwest transport for tests.");

	build_memory_coordinator(Arc::new(transport))
}

pub fn credential_expiring_in(
	access: &str,
	refresh: Option<&str>,
	expires_in: Duration,
) -> SessionCredential {
	let mut builder = SessionCredential::builder()
		.access_token(access)
		.expires_at(OffsetDateTime::now_utc() + expires_in);

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().expect("Credential fixture should build successfully.")
}

pub fn seed_credential(
	store: &CredentialStore,
	tier: StorageTier,
	access: &str,
	refresh: Option<&str>,
	expires_in: Duration,
) {
	store
		.replace(tier, &credential_expiring_in(access, refresh, expires_in))
		.expect("Failed to seed credential into the store.");
}
