//! Session-level error types shared across the coordinator, the authenticated client, and
//! the session policy.

// crates.io
use oauth2::http::{HeaderMap, StatusCode};
// self
use crate::{_prelude::*, auth::DecodeError, store::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Canonical session error exposed by public APIs.
///
/// The type is `Clone` so every caller that joined the same in-flight refresh observes an
/// identical failure.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration or request-construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS); no response was received.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Upstream answered with a non-2xx status.
	#[error(transparent)]
	Http(#[from] HttpError),
	/// A bearer token could not be decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Token endpoint answered without a complete credential pair.
	#[error("Invalid token response.")]
	InvalidTokenResponse,
	/// Neither stored token is usable; the user must authenticate again.
	#[error("No usable credentials are stored.")]
	NoCredentials,
	/// Token endpoint issued an access token that is already expired.
	#[error("Token expired.")]
	TokenExpired,
	/// Access token carries no role that maps to a permission.
	#[error("Access token grants no recognized permission.")]
	NoPermissions,
	/// A successful response carried a non-empty body that is not valid JSON.
	#[error("Response body with status {status} is not valid JSON.")]
	ResponseBody {
		/// HTTP status code of the response.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
}
impl Error {
	/// Returns the HTTP status carried by [`Error::Http`] or [`Error::ResponseBody`].
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Http(err) => Some(err.status.as_u16()),
			Self::ResponseBody { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Returns a stable snake_case label for the error class.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Storage(_) => "storage",
			Self::Config(_) => "config",
			Self::Transport(_) => "network_error",
			Self::Http(_) => "http_error",
			Self::Decode(_) => "decode_error",
			Self::InvalidTokenResponse => "invalid_token_response",
			Self::NoCredentials => "no_credentials",
			Self::TokenExpired => "token_expired",
			Self::NoPermissions => "no_permissions",
			Self::ResponseBody { .. } => "response_body",
		}
	}
}

/// Configuration and request-construction failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying `http` crate failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// A header value contains characters HTTP does not allow.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeaderValue {
		/// Header name that failed validation.
		name: String,
	},
	/// A request body could not be serialized to JSON.
	#[error("Request body could not be serialized.")]
	RequestBody {
		/// Serialization failure.
		#[source]
		source: Arc<serde_json::Error>,
	},
	/// Authorization code login requires a redirect URI.
	#[error("Authorization code login requires a redirect URI.")]
	MissingRedirectUri,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO). These never carry an HTTP status.
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[source] Arc<std::io::Error>),
	/// Transport failed without a structured error.
	#[error("HTTP client error occurred while sending the request: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Normalized non-2xx response.
#[derive(Clone, Debug, ThisError)]
#[error("Request failed with HTTP status {status}.")]
pub struct HttpError {
	/// Response status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body, parsed when possible.
	pub body: HttpErrorBody,
}
impl HttpError {
	/// Builds the normalized error from raw response parts.
	///
	/// A body that parses as JSON is kept as data; anything else (including an empty body)
	/// is replaced by the canonical reason phrase of the status.
	pub fn from_parts(status: StatusCode, headers: HeaderMap, body: &[u8]) -> Self {
		let body = match serde_json::from_slice(body) {
			Ok(data) => HttpErrorBody::Json(data),
			Err(_) => HttpErrorBody::Unparsed {
				status_text: status.canonical_reason().unwrap_or_default().to_owned(),
			},
		};

		Self { status, headers, body }
	}

	/// Returns the parsed JSON body, if any.
	pub fn data(&self) -> Option<&serde_json::Value> {
		match &self.body {
			HttpErrorBody::Json(data) => Some(data),
			HttpErrorBody::Unparsed { .. } => None,
		}
	}

	/// Returns the `Retry-After` hint sent with the response, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		crate::http::parse_retry_after(&self.headers)
	}

	/// Returns the reason phrase used when the body was not JSON.
	pub fn status_text(&self) -> Option<&str> {
		match &self.body {
			HttpErrorBody::Json(_) => None,
			HttpErrorBody::Unparsed { status_text } => Some(status_text),
		}
	}
}

/// Body shape of an [`HttpError`].
#[derive(Clone, Debug, PartialEq)]
pub enum HttpErrorBody {
	/// Body parsed as JSON.
	Json(serde_json::Value),
	/// Body missing or not JSON.
	Unparsed {
		/// Canonical reason phrase for the status.
		status_text: String,
	},
}
