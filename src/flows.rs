//! Session components wired to one store, one transport, and one refresh slot.

pub mod fetch;
pub mod refresh;
pub mod session;

pub use fetch::*;
pub use refresh::*;
pub use session::*;

// self
use crate::{
	_prelude::*, config::ClientConfig, http::HttpTransport, oauth::TokenEndpoint, store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport.
pub type ReqwestBroker = Broker<ReqwestHttpClient>;

/// Owns the shared pieces of a session and hands out the components built on them.
///
/// Every component produced by one broker shares its store, transport, refresh slot, and
/// refresh metrics, so a refresh triggered through the authenticated client is joined by a
/// concurrent [`SessionPolicy::check_error`] call instead of racing it. Components from
/// different brokers never share an in-flight refresh.
pub struct Broker<C>
where
	C: ?Sized + HttpTransport,
{
	/// HTTP transport used for token, revocation, and API requests.
	pub http_client: Arc<C>,
	/// Store holding the session keys.
	pub store: Arc<dyn TokenStore>,
	/// Validated client configuration.
	pub config: Arc<ClientConfig>,
	/// Shared counters for refresh operations.
	pub refresh_metrics: Arc<RefreshMetrics>,
	refresh_slot: Arc<RefreshSlot>,
}
impl<C> Broker<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a broker that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		config: ClientConfig,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			store,
			config: Arc::new(config),
			refresh_metrics: Default::default(),
			refresh_slot: Default::default(),
		}
	}

	/// Client for the token and revocation endpoints.
	pub fn token_endpoint(&self) -> TokenEndpoint<C> {
		TokenEndpoint::new(self.config.clone(), self.http_client.clone())
	}

	/// Refresh coordinator bound to this broker's slot.
	pub fn coordinator(&self) -> RefreshCoordinator<C> {
		RefreshCoordinator::new(
			self.store.clone(),
			self.token_endpoint(),
			self.refresh_slot.clone(),
			self.refresh_metrics.clone(),
		)
	}

	/// Client that attaches the current access token to API requests.
	pub fn client(&self) -> AuthenticatedClient<C> {
		AuthenticatedClient::new(self.coordinator(), self.store.clone(), self.http_client.clone())
	}

	/// Session policy for login, logout, and error classification.
	pub fn session(&self) -> SessionPolicy<C> {
		SessionPolicy::new(
			self.coordinator(),
			self.token_endpoint(),
			self.store.clone(),
			self.config.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient> {
	/// Creates a broker with its own reqwest transport honoring
	/// [`ClientConfig::request_timeout`].
	pub fn new(store: Arc<dyn TokenStore>, config: ClientConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.request_timeout)?;

		Ok(Self::with_http_client(store, config, http_client))
	}
}
impl<C> Clone for Broker<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			store: self.store.clone(),
			config: self.config.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			refresh_slot: self.refresh_slot.clone(),
		}
	}
}
impl<C> Debug for Broker<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("config", &self.config)
			.field("refresh_slot", &self.refresh_slot)
			.finish()
	}
}
