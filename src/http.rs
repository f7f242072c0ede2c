//! Transport primitives shared by the token endpoint client and the authenticated client.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. Requests and
//! responses use the `oauth2` crate's [`HttpRequest`]/[`HttpResponse`] aliases (plain
//! `http` types), so custom transports plug in by implementing [`AsyncHttpClient`] on a
//! cheap handle. Non-2xx responses are normalized into [`HttpError`] here; transport
//! failures never carry a status.

pub use oauth2::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

// std
#[cfg(feature = "reqwest")] use std::{ops::Deref, time::Duration as StdDuration};
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::header::RETRY_AFTER};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, HttpError, TransportError},
};

/// Abstraction over HTTP transports able to execute token and API requests.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// refresh coordinator, the authenticated client, and the session policy. The handles they
/// return must own whatever state they need so request futures stay `Send` while a refresh
/// is shared between callers.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle used for a single exchange.
	///
	/// The request future returned by [`AsyncHttpClient::call`] must be `Send` so the
	/// coordinator's shared refresh future inherits the same guarantee.
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle for the next exchange.
	fn handle(&self) -> Self::Handle;

	/// Converts a transport failure into a session error.
	///
	/// The default treats every transport-specific error as a network failure.
	fn map_transport_error(&self, error: HttpClientError<Self::TransportError>) -> Error {
		map_client_error(error, |inner| TransportError::network(inner).into())
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client that aborts any exchange running longer than `timeout`.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(timeout).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	type Handle = ReqwestHandle;
	type TransportError = ReqwestError;

	fn handle(&self) -> Self::Handle {
		ReqwestHandle(self.0.clone())
	}

	fn map_transport_error(&self, error: HttpClientError<ReqwestError>) -> Error {
		map_client_error(error, |inner| {
			if inner.is_builder() {
				ConfigError::from(inner).into()
			} else {
				TransportError::from(inner).into()
			}
		})
	}
}

/// [`AsyncHttpClient`] handle returned by [`ReqwestHttpClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHandle(ReqwestClient);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ReqwestHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Parses a `Retry-After` header given either as delta-seconds or as an HTTP date.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(i64::from(secs)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

/// Sends `request` through `transport`, mapping transport failures into [`Error`].
pub(crate) async fn dispatch<C>(transport: &C, request: HttpRequest) -> Result<HttpResponse>
where
	C: ?Sized + HttpTransport,
{
	let handle = transport.handle();

	handle.call(request).await.map_err(|e| transport.map_transport_error(e))
}

/// Passes 2xx responses through and normalizes everything else into [`HttpError`].
pub(crate) fn ensure_success(response: HttpResponse) -> Result<HttpResponse> {
	if response.status().is_success() {
		return Ok(response);
	}

	let (parts, body) = response.into_parts();

	Err(HttpError::from_parts(parts.status, parts.headers, &body).into())
}

fn map_client_error<E>(error: HttpClientError<E>, map_inner: impl FnOnce(E) -> Error) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match error {
		HttpClientError::Reqwest(inner) => map_inner(*inner),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::from(inner).into(),
		HttpClientError::Other(message) => TransportError::Other { message }.into(),
		_ => TransportError::Other { message: "unknown transport failure".into() }.into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: StatusCode, body: &[u8]) -> HttpResponse {
		let mut response = HttpResponse::new(body.to_vec());

		*response.status_mut() = status;

		response
	}

	#[test]
	fn retry_after_accepts_seconds_and_rejects_garbage() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(120)));

		headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(parse_retry_after(&headers), None);
		assert_eq!(parse_retry_after(&HeaderMap::new()), None);
	}

	#[test]
	fn ensure_success_normalizes_error_statuses() {
		let ok = ensure_success(response(StatusCode::NO_CONTENT, b""))
			.expect("2xx responses should pass through.");

		assert_eq!(ok.status(), StatusCode::NO_CONTENT);

		let err = ensure_success(response(StatusCode::BAD_REQUEST, br#"{"error":"bad"}"#))
			.expect_err("4xx responses should be rejected.");

		match err {
			Error::Http(http) => {
				assert_eq!(http.status, StatusCode::BAD_REQUEST);
				assert_eq!(http.data(), Some(&serde_json::json!({ "error": "bad" })));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn client_errors_map_to_transport_and_config_classes() {
		let other = map_client_error::<std::io::Error>(
			HttpClientError::Other("connection reset".into()),
			|inner| TransportError::network(inner).into(),
		);

		assert!(matches!(other, Error::Transport(TransportError::Other { .. })));
		assert_eq!(other.status(), None);

		let io = map_client_error::<std::io::Error>(
			HttpClientError::Io(std::io::Error::other("broken pipe")),
			|inner| TransportError::network(inner).into(),
		);

		assert!(matches!(io, Error::Transport(TransportError::Io(_))));
	}
}
