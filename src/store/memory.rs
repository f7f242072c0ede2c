//! Thread-safe in-memory [`TokenStore`] implementation for tests and short-lived processes.

// self
use crate::{
	_prelude::*,
	store::{StoreError, StoreFuture, StoreKey, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<StoreKey, String>>>;

/// Storage backend that keeps the session keys in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Creates a store pre-populated with `entries`.
	pub fn seeded<I, V>(entries: I) -> Self
	where
		I: IntoIterator<Item = (StoreKey, V)>,
		V: Into<String>,
	{
		let map = entries.into_iter().map(|(key, value)| (key, value.into())).collect();

		Self(Arc::new(RwLock::new(map)))
	}

	/// Returns the current value for `key` without going through the async contract.
	pub fn value(&self, key: StoreKey) -> Option<String> {
		self.0.read().get(&key).cloned()
	}

	/// Returns a copy of every stored entry.
	pub fn snapshot(&self) -> HashMap<StoreKey, String> {
		self.0.read().clone()
	}

	fn replace_now(
		map: StoreMap,
		entries: Vec<(StoreKey, String)>,
		removed: &[StoreKey],
	) -> Result<(), StoreError> {
		let mut guard = map.write();

		for key in removed {
			guard.remove(key);
		}

		guard.extend(entries);

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn get(&self, key: StoreKey) -> StoreFuture<'_, Option<String>> {
		let value = self.value(key);

		Box::pin(async move { Ok(value) })
	}

	fn replace<'a>(
		&'a self,
		entries: Vec<(StoreKey, String)>,
		removed: &'a [StoreKey],
	) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::replace_now(map, entries, removed) })
	}
}
