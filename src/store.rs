//! Storage contracts, the tiered credential store, and built-in key-value backends.

pub mod credential;
pub mod file;
pub mod memory;

pub use credential::*;
pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Key-value capability backing one storage tier.
///
/// Calls are synchronous so the coordinator's in-flight check and credential writes never
/// suspend.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Returns the value stored under `key`, if present.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores or replaces the value under `key`.
	fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Removes `key`; removing a missing key is not an error.
	fn remove(&self, key: &str) -> Result<(), StoreError>;

	/// Applies `writes` in order as one batch.
	///
	/// The default issues one call per write and stops at the first failure, so a failed batch
	/// may be partially applied. Backends that can commit several keys at once override it.
	fn apply(&self, writes: &[KeyWrite<'_>]) -> Result<(), StoreError> {
		for write in writes {
			match *write {
				KeyWrite::Set(key, value) => self.set(key, value)?,
				KeyWrite::Remove(key) => self.remove(key)?,
			}
		}

		Ok(())
	}
}

/// One mutation inside a [`KeyValueStore::apply`] batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyWrite<'a> {
	/// Store `value` under `key`.
	Set(&'a str, &'a str),
	/// Remove `key`.
	Remove(&'a str),
}
impl KeyWrite<'_> {
	fn apply_to(self, map: &mut HashMap<String, String>) {
		match self {
			Self::Set(key, value) => {
				map.insert(key.to_owned(), value.to_owned());
			},
			Self::Remove(key) => {
				map.remove(key);
			},
		}
	}
}

/// Storage area a session lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
	/// Survives restarts ("remember me").
	Persistent,
	/// Scoped to the current process or browser session.
	Session,
}
impl StorageTier {
	/// Read order: the persistent tier wins when both hold a session.
	pub const PRECEDENCE: [StorageTier; 2] = [StorageTier::Persistent, StorageTier::Session];

	/// Returns the other tier.
	pub const fn other(self) -> Self {
		match self {
			StorageTier::Persistent => StorageTier::Session,
			StorageTier::Session => StorageTier::Persistent,
		}
	}

	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StorageTier::Persistent => "persistent",
			StorageTier::Session => "session",
		}
	}
}
impl Display for StorageTier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched the expected value and the credential was replaced.
	Updated,
	/// A credential exists but carries a different refresh secret.
	RefreshMismatch,
	/// No credential is stored in either tier.
	Missing,
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Stored values could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
