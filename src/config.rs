//! Client configuration: identity, endpoints, and transport settings.

// std
use std::{net::IpAddr, time::Duration as StdDuration};
// crates.io
use url::Host;
// self
use crate::_prelude::*;

/// Request timeout applied when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Errors raised while constructing or validating a [`ClientConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ClientConfigError {
	/// Client identifier is empty.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// Client identifier contains whitespace.
	#[error("Client identifier cannot contain whitespace.")]
	ClientIdWhitespace,
	/// Token endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The revocation endpoint cannot be derived from a token endpoint without a path.
	#[error("Cannot derive a revocation endpoint from {url}; set one explicitly.")]
	TokenEndpointWithoutPath {
		/// Token endpoint URL that failed derivation.
		url: String,
	},
	/// Request timeout must be positive.
	#[error("Request timeout must be greater than zero.")]
	ZeroTimeout,
}

/// Validated client configuration shared by every component of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClientConfigBuilder")]
pub struct ClientConfig {
	/// Public client identifier sent with every grant.
	pub client_id: String,
	/// Token endpoint used for logins and refreshes.
	pub token_endpoint: Url,
	/// Endpoint that accepts refresh-token revocations on logout.
	pub revocation_endpoint: Url,
	/// Default redirect URI for authorization code logins.
	pub redirect_uri: Option<Url>,
	/// Upper bound for a single HTTP exchange.
	pub request_timeout: StdDuration,
}
impl ClientConfig {
	/// Creates a new builder for the provided client identifier.
	pub fn builder(client_id: impl Into<String>) -> ClientConfigBuilder {
		ClientConfigBuilder::new(client_id)
	}
}
impl TryFrom<ClientConfigBuilder> for ClientConfig {
	type Error = ClientConfigError;

	fn try_from(builder: ClientConfigBuilder) -> Result<Self, Self::Error> {
		builder.build()
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfigBuilder {
	/// Client identifier for the configuration being constructed.
	pub client_id: String,
	/// Token endpoint used for logins and refreshes.
	pub token_endpoint: Option<Url>,
	/// Optional explicit revocation endpoint.
	#[serde(default)]
	pub revocation_endpoint: Option<Url>,
	/// Optional default redirect URI.
	#[serde(default)]
	pub redirect_uri: Option<Url>,
	/// Timeout applied to each HTTP exchange.
	#[serde(default = "default_request_timeout")]
	pub request_timeout: StdDuration,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with the provided client identifier.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			token_endpoint: None,
			revocation_endpoint: None,
			redirect_uri: None,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets an explicit revocation endpoint instead of deriving one.
	pub fn revocation_endpoint(mut self, url: Url) -> Self {
		self.revocation_endpoint = Some(url);

		self
	}

	/// Sets the default redirect URI for authorization code logins.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Overrides the request timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		if self.client_id.is_empty() {
			return Err(ClientConfigError::EmptyClientId);
		}
		if self.client_id.chars().any(char::is_whitespace) {
			return Err(ClientConfigError::ClientIdWhitespace);
		}
		if self.request_timeout.is_zero() {
			return Err(ClientConfigError::ZeroTimeout);
		}

		let token_endpoint = self.token_endpoint.ok_or(ClientConfigError::MissingTokenEndpoint)?;

		validate_endpoint("token", &token_endpoint)?;

		let revocation_endpoint = match self.revocation_endpoint {
			Some(url) => url,
			None => derive_revocation_endpoint(&token_endpoint)?,
		};

		validate_endpoint("revocation", &revocation_endpoint)?;

		Ok(ClientConfig {
			client_id: self.client_id,
			token_endpoint,
			revocation_endpoint,
			redirect_uri: self.redirect_uri,
			request_timeout: self.request_timeout,
		})
	}
}

fn default_request_timeout() -> StdDuration {
	DEFAULT_REQUEST_TIMEOUT
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ClientConfigError> {
	if url.scheme() == "https" || (url.scheme() == "http" && is_loopback(url)) {
		Ok(())
	} else {
		Err(ClientConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}

/// `https://id.example.com/oauth/token` becomes `https://id.example.com/oauth/revoke`.
fn derive_revocation_endpoint(token_endpoint: &Url) -> Result<Url, ClientConfigError> {
	let without_path =
		|| ClientConfigError::TokenEndpointWithoutPath { url: token_endpoint.to_string() };
	let has_last_segment = token_endpoint
		.path_segments()
		.and_then(|mut segments| segments.next_back())
		.is_some_and(|segment| !segment.is_empty());

	if !has_last_segment {
		return Err(without_path());
	}

	let mut revocation = token_endpoint.clone();

	revocation.set_query(None);
	revocation.set_fragment(None);
	revocation.path_segments_mut().map_err(|_| without_path())?.pop().push("revoke");

	Ok(revocation)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Test URL should parse.")
	}

	#[test]
	fn builder_derives_revocation_endpoint_and_defaults() {
		let config = ClientConfig::builder("admin-panel")
			.token_endpoint(url("https://id.example.com/oauth/token?tenant=a"))
			.build()
			.expect("Configuration should build.");

		assert_eq!(config.revocation_endpoint.as_str(), "https://id.example.com/oauth/revoke");
		assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
		assert_eq!(config.redirect_uri, None);
	}

	#[test]
	fn explicit_revocation_endpoint_wins() {
		let config = ClientConfig::builder("admin-panel")
			.token_endpoint(url("https://id.example.com/token"))
			.revocation_endpoint(url("https://id.example.com/logout"))
			.build()
			.expect("Configuration should build.");

		assert_eq!(config.revocation_endpoint.as_str(), "https://id.example.com/logout");
	}

	#[test]
	fn loopback_http_is_allowed_but_remote_http_is_not() {
		for endpoint in ["http://localhost:8080/token", "http://127.0.0.1/token", "http://[::1]/t"] {
			ClientConfig::builder("admin-panel")
				.token_endpoint(url(endpoint))
				.build()
				.unwrap_or_else(|e| panic!("Loopback endpoint {endpoint} should be accepted: {e}"));
		}

		let err = ClientConfig::builder("admin-panel")
			.token_endpoint(url("http://id.example.com/token"))
			.build()
			.expect_err("Remote plain-HTTP endpoints should be rejected.");

		assert!(matches!(err, ClientConfigError::InsecureEndpoint { endpoint: "token", .. }));
	}

	#[test]
	fn invalid_inputs_are_rejected() {
		assert_eq!(
			ClientConfig::builder("").build().expect_err("Empty client id should fail."),
			ClientConfigError::EmptyClientId
		);
		assert_eq!(
			ClientConfig::builder("admin panel")
				.build()
				.expect_err("Whitespace client id should fail."),
			ClientConfigError::ClientIdWhitespace
		);
		assert_eq!(
			ClientConfig::builder("admin-panel")
				.build()
				.expect_err("Missing token endpoint should fail."),
			ClientConfigError::MissingTokenEndpoint
		);
		assert!(matches!(
			ClientConfig::builder("admin-panel")
				.token_endpoint(url("https://id.example.com/"))
				.build(),
			Err(ClientConfigError::TokenEndpointWithoutPath { .. })
		));
		assert_eq!(
			ClientConfig::builder("admin-panel")
				.token_endpoint(url("https://id.example.com/token"))
				.request_timeout(StdDuration::ZERO)
				.build()
				.expect_err("Zero timeout should fail."),
			ClientConfigError::ZeroTimeout
		);
	}

	#[test]
	fn deserialization_runs_validation() {
		let config: ClientConfig = serde_json::from_value(serde_json::json!({
			"client_id": "admin-panel",
			"token_endpoint": "https://id.example.com/oauth/token",
		}))
		.expect("Configuration should deserialize.");

		assert_eq!(config.revocation_endpoint.as_str(), "https://id.example.com/oauth/revoke");

		let round_trip: ClientConfig = serde_json::from_str(
			&serde_json::to_string(&config).expect("Configuration should serialize."),
		)
		.expect("Serialized configuration should deserialize.");

		assert_eq!(round_trip, config);

		let insecure = serde_json::from_value::<ClientConfig>(serde_json::json!({
			"client_id": "admin-panel",
			"token_endpoint": "http://id.example.com/oauth/token",
		}));

		assert!(insecure.is_err());
	}
}
