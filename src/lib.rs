//! Session layer for the Teacherrs platform: single-flight access-token refresh,
//! tiered credential storage, and an HTTP client that authorizes every request.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
#[cfg(feature = "reqwest")] pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod obs;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for unit tests and downstream suites; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::SessionCredential,
		coordinator::TokenCoordinator,
		http::SessionTransport,
		store::{CredentialStore, MemoryStore, StorageTier},
	};

	/// Builds a coordinator over two fresh in-memory tiers and returns the credential store
	/// alongside it so tests can seed and inspect state.
	pub fn build_memory_coordinator<T>(
		transport: Arc<T>,
	) -> (TokenCoordinator<T>, Arc<CredentialStore>)
	where
		T: ?Sized + SessionTransport,
	{
		let store = Arc::new(CredentialStore::new(
			Arc::new(MemoryStore::default()),
			Arc::new(MemoryStore::default()),
		));
		let coordinator = TokenCoordinator::new(store.clone(), transport);

		(coordinator, store)
	}

	/// Builds a credential that expires `expires_in` from now.
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

	/// Seeds `store` with a credential expiring `expires_in` from now in the given tier.
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
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError, StatusCode};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
