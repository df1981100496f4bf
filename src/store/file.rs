//! File-backed [`KeyValueStore`] used as the persistent tier.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, KeyWrite, StoreError},
};

/// Persists a flat JSON object to disk after each mutation.
///
/// A batch passed to [`KeyValueStore::apply`] is written as one file replacement, so a crash
/// leaves either the old snapshot or the new one on disk.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, String>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Returns the backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, String>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, String>) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl KeyValueStore for FileStore {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.inner.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.apply(&[KeyWrite::Set(key, value)])
	}

	fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.apply(&[KeyWrite::Remove(key)])
	}

	fn apply(&self, writes: &[KeyWrite<'_>]) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		writes.iter().for_each(|write| write.apply_to(&mut next));

		if next == *guard {
			return Ok(());
		}

		// Memory only moves forward once the new snapshot is on disk.
		self.persist_locked(&next)?;

		*guard = next;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::{SystemTime, UNIX_EPOCH};
	// self
	use super::*;

	fn scratch_path(label: &str) -> PathBuf {
		let nanos = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.expect("System clock should be after the unix epoch.")
			.as_nanos();

		std::env::temp_dir()
			.join(format!("teacherrs-session-{label}-{}-{nanos}", std::process::id()))
			.join("session.json")
	}

	#[test]
	fn values_survive_reopen() {
		let path = scratch_path("reopen");
		let store = FileStore::open(&path).expect("Store should open at a fresh path.");

		store.set("refreshToken", "r-1").expect("Set should persist.");
		store.set("tokenExpiry", "1735689600").expect("Set should persist.");
		store.remove("tokenExpiry").expect("Remove should persist.");

		let reopened = FileStore::open(&path).expect("Store should reopen existing file.");

		assert_eq!(reopened.get("refreshToken").expect("Get should succeed."), Some("r-1".into()));
		assert_eq!(reopened.get("tokenExpiry").expect("Get should succeed."), None);

		let _ = fs::remove_dir_all(path.parent().expect("Scratch path should have a parent."));
	}

	#[test]
	fn failed_batch_leaves_memory_and_disk_untouched() {
		let path = scratch_path("batch");
		let store = FileStore::open(&path).expect("Store should open at a fresh path.");

		store.set("accessToken", "a-1").expect("Set should persist.");

		// A directory squatting on the temp path makes the next commit fail.
		fs::create_dir(path.with_extension("tmp")).expect("Scratch directory should be creatable.");

		let err = store
			.apply(&[
				KeyWrite::Set("tokenExpiry", "1735689600"),
				KeyWrite::Set("accessToken", "a-2"),
			])
			.expect_err("Blocked commit should fail.");

		assert!(matches!(err, StoreError::Backend { .. }));
		assert_eq!(store.get("accessToken").expect("Get should succeed."), Some("a-1".into()));
		assert_eq!(store.get("tokenExpiry").expect("Get should succeed."), None);

		let reopened = FileStore::open(&path).expect("Store should reopen existing file.");

		assert_eq!(reopened.get("accessToken").expect("Get should succeed."), Some("a-1".into()));
		assert_eq!(reopened.get("tokenExpiry").expect("Get should succeed."), None);

		let _ = fs::remove_dir_all(path.parent().expect("Scratch path should have a parent."));
	}

	#[test]
	fn corrupt_file_is_a_serialization_error() {
		let path = scratch_path("corrupt");

		FileStore::ensure_parent_exists(&path).expect("Scratch directory should be creatable.");
		fs::write(&path, b"not json").expect("Scratch file should be writable.");

		let err = FileStore::open(&path).expect_err("Corrupt file should not load.");

		assert!(matches!(err, StoreError::Serialization { .. }));

		let _ = fs::remove_dir_all(path.parent().expect("Scratch path should have a parent."));
	}
}
