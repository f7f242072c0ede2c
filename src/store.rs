//! Storage contract and built-in backends for the persisted session keys.
//!
//! The session persists three string values: `access-token`, `refresh-token`, and `user`
//! (a JSON [`IdentitySnapshot`]). Backends apply every [`TokenStore::set`] and
//! [`TokenStore::clear`] call atomically, which is what lets the session replace or clear
//! the credential pair as a whole.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{IdentitySnapshot, TokenPair, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Every key owned by the session, in the order they are cleared.
pub const SESSION_KEYS: [StoreKey; 3] = [StoreKey::AccessToken, StoreKey::RefreshToken, StoreKey::User];

/// Key/value backend holding the session state.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get(&self, key: StoreKey) -> StoreFuture<'_, Option<String>>;

	/// Removes `removed`, then writes `entries`, as one atomic step. Absent keys are ignored.
	fn replace<'a>(
		&'a self,
		entries: Vec<(StoreKey, String)>,
		removed: &'a [StoreKey],
	) -> StoreFuture<'a, ()>;

	/// Writes every entry in one atomic step.
	fn set(&self, entries: Vec<(StoreKey, String)>) -> StoreFuture<'_, ()> {
		self.replace(entries, &[])
	}

	/// Removes every listed key in one atomic step; absent keys are ignored.
	fn clear<'a>(&'a self, keys: &'a [StoreKey]) -> StoreFuture<'a, ()> {
		self.replace(Vec::new(), keys)
	}
}

/// Persisted session keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StoreKey {
	/// Current access JWT.
	#[serde(rename = "access-token")]
	AccessToken,
	/// Current refresh JWT.
	#[serde(rename = "refresh-token")]
	RefreshToken,
	/// JSON-serialized [`IdentitySnapshot`].
	#[serde(rename = "user")]
	User,
}
impl StoreKey {
	/// Returns the persisted key name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AccessToken => "access-token",
			Self::RefreshToken => "refresh-token",
			Self::User => "user",
		}
	}
}
impl Display for StoreKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend or by stored values.
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

/// Reads a token stored under `key`; empty values count as absent.
pub async fn read_secret(
	store: &dyn TokenStore,
	key: StoreKey,
) -> Result<Option<TokenSecret>, StoreError> {
	let value = store.get(key).await?;

	Ok(value.filter(|token| !token.is_empty()).map(TokenSecret::new))
}

/// Reads and parses the cached identity snapshot.
pub async fn read_identity(store: &dyn TokenStore) -> Result<Option<IdentitySnapshot>, StoreError> {
	let Some(raw) = store.get(StoreKey::User).await? else {
		return Ok(None);
	};

	serde_json::from_str(&raw).map(Some).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse the stored `{}` value: {e}", StoreKey::User),
	})
}

/// Replaces the credential pair and identity snapshot in one write.
///
/// Without an `identity` the stale `user` entry is removed in the same step, so the
/// snapshot never describes a different token than the stored pair.
pub async fn save_session(
	store: &dyn TokenStore,
	pair: &TokenPair,
	identity: Option<&IdentitySnapshot>,
) -> Result<(), StoreError> {
	let mut entries = vec![
		(StoreKey::AccessToken, pair.access_token.expose().to_owned()),
		(StoreKey::RefreshToken, pair.refresh_token.expose().to_owned()),
	];
	let removed: &[StoreKey] = match identity {
		Some(identity) => {
			let user = serde_json::to_string(identity).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize the identity snapshot: {e}"),
			})?;

			entries.push((StoreKey::User, user));

			&[]
		},
		None => &[StoreKey::User],
	};

	store.replace(entries, removed).await
}

/// Removes the credential pair and identity snapshot in one write.
pub async fn clear_session(store: &dyn TokenStore) -> Result<(), StoreError> {
	store.clear(&SESSION_KEYS).await
}
