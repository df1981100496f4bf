//! Thread-safe in-memory [`KeyValueStore`] for session-scoped tiers and tests.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, KeyWrite, StoreError},
};

/// Storage backend that keeps values in-process; cloning shares the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<String, String>>>);
impl MemoryStore {
	/// Returns the number of stored keys.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl KeyValueStore for MemoryStore {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.0.write().remove(key);

		Ok(())
	}

	fn apply(&self, writes: &[KeyWrite<'_>]) -> Result<(), StoreError> {
		let mut guard = self.0.write();

		writes.iter().for_each(|write| write.apply_to(&mut guard));

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn clones_share_state() {
		let store = MemoryStore::default();
		let alias = store.clone();

		store.set("accessToken", "a").expect("Memory set should succeed.");

		assert_eq!(alias.get("accessToken").expect("Memory get should succeed."), Some("a".into()));
		assert_eq!(alias.len(), 1);

		alias.remove("accessToken").expect("Memory remove should succeed.");
		alias.remove("accessToken").expect("Removing a missing key should succeed.");

		assert!(store.is_empty());
	}

	#[test]
	fn batch_applies_in_order() {
		let store = MemoryStore::default();

		store
			.apply(&[
				KeyWrite::Set("tokenExpiry", "1"),
				KeyWrite::Set("accessToken", "a"),
				KeyWrite::Remove("tokenExpiry"),
			])
			.expect("Memory batch should succeed.");

		assert_eq!(store.get("accessToken").expect("Memory get should succeed."), Some("a".into()));
		assert_eq!(store.get("tokenExpiry").expect("Memory get should succeed."), None);
		assert_eq!(store.len(), 1);
	}
}
