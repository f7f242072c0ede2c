//! Session lifecycle hooks: login, logout, access checks, error classification, and the
//! permission and identity queries an admin shell performs on every navigation.

// crates.io
use futures_util::FutureExt;
// self
use crate::{
	_prelude::*,
	auth::{Claims, Identity, IdentitySnapshot, Permission, TokenPair},
	config::ClientConfig,
	error::ConfigError,
	flows::RefreshCoordinator,
	http::HttpTransport,
	oauth::{TokenEndpoint, TokenGrant},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{self, StoreError, StoreKey, TokenStore},
};

/// Credentials accepted by [`SessionPolicy::login`].
#[derive(Clone, PartialEq, Eq)]
pub enum LoginCredentials {
	/// Username and password, optionally with a one-time second-factor code.
	Password {
		/// Account name.
		username: String,
		/// Account password.
		password: String,
		/// Second-factor code sent as `totp`.
		one_time_code: Option<String>,
	},
	/// Authorization code returned to the redirect URI.
	AuthorizationCode {
		/// Code issued by the authorization server.
		code: String,
		/// Redirect URI that received the code; defaults to [`ClientConfig::redirect_uri`].
		redirect_uri: Option<Url>,
	},
}
impl LoginCredentials {
	/// Password credentials without a second factor.
	pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self::Password { username: username.into(), password: password.into(), one_time_code: None }
	}

	/// Authorization code using the configured redirect URI.
	pub fn authorization_code(code: impl Into<String>) -> Self {
		Self::AuthorizationCode { code: code.into(), redirect_uri: None }
	}

	/// Attaches a one-time code to password credentials; other variants are unchanged.
	pub fn with_one_time_code(mut self, code: impl Into<String>) -> Self {
		if let Self::Password { one_time_code, .. } = &mut self {
			*one_time_code = Some(code.into());
		}

		self
	}
}
impl Debug for LoginCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Password { username, one_time_code, .. } => f
				.debug_struct("Password")
				.field("username", username)
				.field("password", &"<redacted>")
				.field("one_time_code", &one_time_code.as_ref().map(|_| "<redacted>"))
				.finish(),
			Self::AuthorizationCode { redirect_uri, .. } => f
				.debug_struct("AuthorizationCode")
				.field("code", &"<redacted>")
				.field("redirect_uri", redirect_uri)
				.finish(),
		}
	}
}

/// Clears the session when a `logout` future is dropped before its final clear.
struct ClearOnDrop<'a> {
	store: &'a dyn TokenStore,
	armed: bool,
}
impl<'a> ClearOnDrop<'a> {
	fn new(store: &'a dyn TokenStore) -> Self {
		Self { store, armed: true }
	}

	fn disarm(mut self) {
		self.armed = false;
	}
}
impl Drop for ClearOnDrop<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		match store::clear_session(self.store).now_or_never() {
			Some(Ok(())) => {},
			Some(Err(e)) => obs::warn_swallowed(FlowKind::Logout, "clear_on_drop", &e.into()),
			None => obs::warn_swallowed(
				FlowKind::Logout,
				"clear_on_drop",
				&StoreError::Backend { message: "Store could not clear without suspending".into() }
					.into(),
			),
		}
	}
}

/// How [`SessionPolicy::check_error`] classified a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorDisposition {
	/// There was no error to classify.
	NoError,
	/// An authentication failure was repaired by refreshing; the caller may retry.
	Recovered,
	/// Not an authentication failure; the caller keeps handling the original error.
	Ignored,
}

/// Authentication policy consumed by the surrounding application shell.
pub struct SessionPolicy<C>
where
	C: ?Sized + HttpTransport,
{
	coordinator: RefreshCoordinator<C>,
	endpoint: TokenEndpoint<C>,
	store: Arc<dyn TokenStore>,
	config: Arc<ClientConfig>,
}
impl<C> SessionPolicy<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a policy sharing the coordinator's store and transport.
	pub fn new(
		coordinator: RefreshCoordinator<C>,
		endpoint: TokenEndpoint<C>,
		store: Arc<dyn TokenStore>,
		config: Arc<ClientConfig>,
	) -> Self {
		Self { coordinator, endpoint, store, config }
	}

	/// Exchanges `credentials` for a credential pair and persists it with the identity
	/// snapshot.
	///
	/// An access token that is already expired yields [`Error::TokenExpired`] and nothing is
	/// stored.
	pub async fn login(&self, credentials: LoginCredentials) -> Result<IdentitySnapshot> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let pair = self.exchange(&credentials).await?;

				if !pair.access_token.is_fresh() {
					return Err(Error::TokenExpired);
				}

				let identity = IdentitySnapshot::from_token(pair.access_token.expose())?;

				store::save_session(&*self.store, &pair, Some(&identity)).await?;

				Ok(identity)
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Revokes the stored refresh token (best effort) and clears the session.
	///
	/// Only a failure to clear the store is returned. If the returned future is dropped
	/// before it finishes, the session is still cleared on drop as long as the store
	/// completes the clear without suspending (true for [`MemoryStore`] and [`FileStore`]).
	///
	/// [`MemoryStore`]: crate::store::MemoryStore
	/// [`FileStore`]: crate::store::FileStore
	pub async fn logout(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let cleanup = ClearOnDrop::new(&*self.store);

				self.revoke_stored().await;

				let cleared = store::clear_session(&*self.store).await.map_err(Error::from);

				cleanup.disarm();

				cleared
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Resolves when the session holds (or can obtain) a fresh access token.
	pub async fn check_auth(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::CheckAuth;

		let span = FlowSpan::new(KIND, "check_auth");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.coordinator.ensure_fresh()).await;

		obs::record_result(KIND, result)
	}

	/// Classifies a failed API call.
	///
	/// A 401 or 403 drops the access token and refreshes; if the refresh fails, the rest
	/// of the session is cleared and the refresh error is returned. Anything else,
	/// including transport failures without a status, is [`ErrorDisposition::Ignored`].
	pub async fn check_error(&self, error: Option<&Error>) -> Result<ErrorDisposition> {
		match error {
			None => Ok(ErrorDisposition::NoError),
			Some(error) => match error.status() {
				Some(status) => self.check_status(status).await,
				None => Ok(ErrorDisposition::Ignored),
			},
		}
	}

	/// Applies the [`check_error`](Self::check_error) policy to a bare HTTP status.
	pub async fn check_status(&self, status: u16) -> Result<ErrorDisposition> {
		const KIND: FlowKind = FlowKind::CheckError;

		if !matches!(status, 401 | 403) {
			return Ok(ErrorDisposition::Ignored);
		}

		let span = FlowSpan::new(KIND, "check_status");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.recover()).await;

		obs::record_result(KIND, result)
	}

	/// Returns the coarse permission granted by the stored access token.
	pub async fn get_permissions(&self) -> Result<Permission> {
		let access_token = store::read_secret(&*self.store, StoreKey::AccessToken)
			.await?
			.ok_or(Error::NoCredentials)?;
		let claims = Claims::decode(access_token.expose()).map_err(|_| Error::NoPermissions)?;

		Permission::from_claims(&claims).ok_or(Error::NoPermissions)
	}

	/// Returns the identity cached at the last login or refresh.
	pub async fn get_identity(&self) -> Result<Identity> {
		store::read_identity(&*self.store).await?.map(Identity::from).ok_or(Error::NoCredentials)
	}

	async fn exchange(&self, credentials: &LoginCredentials) -> Result<TokenPair> {
		let grant = match credentials {
			LoginCredentials::Password { username, password, one_time_code } =>
				TokenGrant::Password { username, password, one_time_code: one_time_code.as_deref() },
			LoginCredentials::AuthorizationCode { code, redirect_uri } => {
				let redirect_uri = redirect_uri
					.as_ref()
					.or(self.config.redirect_uri.as_ref())
					.ok_or(ConfigError::MissingRedirectUri)?;

				TokenGrant::AuthorizationCode { code, redirect_uri }
			},
		};

		self.endpoint.exchange(grant).await
	}

	async fn revoke_stored(&self) {
		const KIND: FlowKind = FlowKind::Logout;

		match store::read_secret(&*self.store, StoreKey::RefreshToken).await {
			Ok(Some(refresh_token)) =>
				if let Err(e) = self.endpoint.revoke(&refresh_token).await {
					obs::warn_swallowed(KIND, "revoke", &e);
				},
			Ok(None) => {},
			Err(e) => obs::warn_swallowed(KIND, "read_refresh_token", &e.into()),
		}
	}

	async fn recover(&self) -> Result<ErrorDisposition> {
		self.store.clear(&[StoreKey::AccessToken]).await?;

		match self.coordinator.refresh().await {
			Ok(_) => Ok(ErrorDisposition::Recovered),
			Err(e) => {
				if let Err(clear_err) =
					self.store.clear(&[StoreKey::RefreshToken, StoreKey::User]).await
				{
					obs::warn_swallowed(FlowKind::CheckError, "clear_session", &clear_err.into());
				}

				Err(e)
			},
		}
	}
}
impl<C> Clone for SessionPolicy<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			coordinator: self.coordinator.clone(),
			endpoint: self.endpoint.clone(),
			store: self.store.clone(),
			config: self.config.clone(),
		}
	}
}
impl<C> Debug for SessionPolicy<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionPolicy")
			.field("client_id", &self.config.client_id)
			.field("coordinator", &self.coordinator)
			.finish()
	}
}
