//! Single-flight refresh of the stored credential pair.
//!
//! [`RefreshCoordinator::refresh`] either joins the operation already held in the
//! coordinator's [`RefreshSlot`] or starts a new one. An operation reads the stored refresh
//! token, performs a `grant_type=refresh_token` call, and atomically writes the new pair plus
//! the identity snapshot (dropped when the new access token cannot be decoded). Any failure
//! clears every session key instead (fail-closed). The
//! operation empties the slot itself once the store has been updated, so a caller arriving
//! after that point starts a fresh operation while every earlier caller observes the same
//! settled result.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{IdentitySnapshot, TokenPair, TokenSecret},
	http::HttpTransport,
	oauth::{TokenEndpoint, TokenGrant},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{self, StoreKey, TokenStore},
};

/// Handle to an in-flight refresh; every clone resolves to the same result.
pub type RefreshFuture = Shared<BoxFuture<'static, Result<TokenPair>>>;

/// Holder for at most one in-flight refresh operation.
///
/// Each operation is tagged with a generation so a settled operation can only ever clear
/// its own entry.
#[derive(Default)]
pub struct RefreshSlot(Mutex<SlotState>);
impl RefreshSlot {
	/// Returns `true` while an operation is held in the slot.
	pub fn is_pending(&self) -> bool {
		self.0.lock().in_flight.is_some()
	}

	/// Returns the held operation, or stores the one built by `start`.
	///
	/// The boolean is `true` when the caller joined an existing operation.
	fn join_or_start<F>(&self, start: F) -> (RefreshFuture, bool)
	where
		F: FnOnce(u64) -> BoxFuture<'static, Result<TokenPair>>,
	{
		let mut state = self.0.lock();

		if let Some((_, operation)) = &state.in_flight {
			return (operation.clone(), true);
		}

		state.generation = state.generation.wrapping_add(1);

		let generation = state.generation;
		let operation = start(generation).shared();

		state.in_flight = Some((generation, operation.clone()));

		(operation, false)
	}

	fn release(&self, generation: u64) {
		let mut state = self.0.lock();

		if state.in_flight.as_ref().is_some_and(|(held, _)| *held == generation) {
			state.in_flight = None;
		}
	}
}
impl Debug for RefreshSlot {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.0.lock();

		f.debug_struct("RefreshSlot")
			.field("generation", &state.generation)
			.field("pending", &state.in_flight.is_some())
			.finish()
	}
}

#[derive(Default)]
struct SlotState {
	generation: u64,
	in_flight: Option<(u64, RefreshFuture)>,
}

/// Keeps the stored access token usable, refreshing it at most once at a time.
pub struct RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	store: Arc<dyn TokenStore>,
	endpoint: TokenEndpoint<C>,
	slot: Arc<RefreshSlot>,
	metrics: Arc<RefreshMetrics>,
}
impl<C> RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a coordinator that shares `slot` with every other coordinator built from it.
	pub fn new(
		store: Arc<dyn TokenStore>,
		endpoint: TokenEndpoint<C>,
		slot: Arc<RefreshSlot>,
		metrics: Arc<RefreshMetrics>,
	) -> Self {
		Self { store, endpoint, slot, metrics }
	}

	/// Counters for operations started through this coordinator's slot.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Resolves when the stored access token is fresh, refreshing it first if needed.
	///
	/// Fails with [`Error::NoCredentials`] without touching the network when neither
	/// stored token is fresh.
	pub async fn ensure_fresh(&self) -> Result<()> {
		let access = store::read_secret(&*self.store, StoreKey::AccessToken).await?;

		if access.as_ref().is_some_and(TokenSecret::is_fresh) {
			return Ok(());
		}

		let refresh = store::read_secret(&*self.store, StoreKey::RefreshToken).await?;

		if refresh.as_ref().is_some_and(TokenSecret::is_fresh) {
			self.refresh().await.map(|_| ())
		} else {
			Err(Error::NoCredentials)
		}
	}

	/// Refreshes the stored credential pair, joining the in-flight operation if one exists.
	pub async fn refresh(&self) -> Result<TokenPair> {
		let (operation, joined) = self.slot.join_or_start(|generation| self.start(generation));

		if joined {
			self.metrics.record_join();
		}

		operation.await
	}

	fn start(&self, generation: u64) -> BoxFuture<'static, Result<TokenPair>> {
		const KIND: FlowKind = FlowKind::Refresh;

		let store = self.store.clone();
		let endpoint = self.endpoint.clone();
		let slot = self.slot.clone();
		let metrics = self.metrics.clone();
		let span = FlowSpan::new(KIND, "refresh");

		span.instrument(async move {
			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
			metrics.record_attempt();

			let result = match rotate(&*store, &endpoint).await {
				Ok(pair) => {
					metrics.record_success();

					Ok(pair)
				},
				Err(e) => {
					if let Err(clear_err) = store::clear_session(&*store).await {
						obs::warn_swallowed(KIND, "clear_session", &clear_err.into());
					}

					metrics.record_failure();

					Err(e)
				},
			};

			slot.release(generation);

			obs::record_result(KIND, result)
		})
		.boxed()
	}
}
impl<C> Clone for RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			store: self.store.clone(),
			endpoint: self.endpoint.clone(),
			slot: self.slot.clone(),
			metrics: self.metrics.clone(),
		}
	}
}
impl<C> Debug for RefreshCoordinator<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("endpoint", &self.endpoint)
			.field("slot", &self.slot)
			.finish()
	}
}

async fn rotate<C>(store: &dyn TokenStore, endpoint: &TokenEndpoint<C>) -> Result<TokenPair>
where
	C: ?Sized + HttpTransport,
{
	let refresh_token =
		store::read_secret(store, StoreKey::RefreshToken).await?.ok_or(Error::NoCredentials)?;
	let pair = endpoint
		.exchange(TokenGrant::RefreshToken { refresh_token: refresh_token.expose() })
		.await?;
	let identity = match IdentitySnapshot::from_token(pair.access_token.expose()) {
		Ok(identity) => Some(identity),
		Err(e) => {
			obs::warn_swallowed(FlowKind::Refresh, "decode_identity", &e.into());

			None
		},
	};

	store::save_session(store, &pair, identity.as_ref()).await?;

	Ok(pair)
}
