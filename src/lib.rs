//! Client-side OAuth 2.0 session keeper: keeps a bearer-token pair valid, refreshes it
//! through a single-flight coordinator, attaches it to outbound API calls, and classifies
//! authentication failures for the surrounding application.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod store;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for unit and integration tests.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::{config::ClientConfig, flows::Broker, http::ReqwestHttpClient, store::MemoryStore};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`Broker`] backed by an in-memory store and the reqwest transport used
	/// across integration tests.
	pub fn build_reqwest_test_broker(config: ClientConfig) -> (ReqwestTestBroker, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let broker = Broker::with_http_client(store.clone(), config, test_reqwest_http_client());

		(broker, store)
	}

	/// Encodes `claims` as an unsigned JWT (`alg: none`) suitable for decoding tests.
	pub fn unsigned_jwt(claims: &serde_json::Value) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

		format!("{header}.{payload}.signature")
	}

	/// Builds an unsigned JWT for `subject` that expires `lifetime` from now (negative
	/// lifetimes produce already-expired tokens).
	pub fn jwt_expiring_in(subject: &str, lifetime: Duration, roles: &[&str]) -> String {
		let exp = (OffsetDateTime::now_utc() + lifetime).unix_timestamp();

		unsigned_jwt(&serde_json::json!({
			"sub": subject,
			"exp": exp,
			"name": format!("{subject} display"),
			"roles": roles,
		}))
	}

	/// Shorthand for a token that stays fresh for the next hour.
	pub fn fresh_jwt(subject: &str) -> String {
		jwt_expiring_in(subject, Duration::hours(1), &[])
	}

	/// Shorthand for a token that expired a minute ago.
	pub fn expired_jwt(subject: &str) -> String {
		jwt_expiring_in(subject, Duration::minutes(-1), &[])
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
