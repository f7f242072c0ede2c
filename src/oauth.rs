//! Token endpoint client: form-encoded grants and refresh-token revocation.

pub use oauth2;

// crates.io
use oauth2::{
	HttpRequest,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	config::ClientConfig,
	error::ConfigError,
	http::{self, HttpTransport},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// OAuth 2.0 grant types sent to the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Resource owner password credentials.
	Password,
	/// Authorization code exchange.
	AuthorizationCode,
	/// Refresh token grant.
	RefreshToken,
}
impl GrantType {
	/// Returns the wire value of the grant.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::Password => "password",
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Grant parameters for one token endpoint call.
#[derive(Clone, Copy)]
pub enum TokenGrant<'a> {
	/// `grant_type=password` with an optional one-time code sent as `totp`.
	Password {
		/// Account name.
		username: &'a str,
		/// Account password.
		password: &'a str,
		/// Second-factor code.
		one_time_code: Option<&'a str>,
	},
	/// `grant_type=authorization_code`.
	AuthorizationCode {
		/// Code returned by the authorization server.
		code: &'a str,
		/// Redirect URI that received the code.
		redirect_uri: &'a Url,
	},
	/// `grant_type=refresh_token`.
	RefreshToken {
		/// Stored refresh token.
		refresh_token: &'a str,
	},
}
impl TokenGrant<'_> {
	/// Returns the grant type carried by these parameters.
	pub const fn grant_type(&self) -> GrantType {
		match self {
			TokenGrant::Password { .. } => GrantType::Password,
			TokenGrant::AuthorizationCode { .. } => GrantType::AuthorizationCode,
			TokenGrant::RefreshToken { .. } => GrantType::RefreshToken,
		}
	}

	fn form_pairs<'p>(&'p self, client_id: &'p str) -> Vec<(&'static str, &'p str)> {
		let mut pairs = vec![("client_id", client_id), ("grant_type", self.grant_type().as_str())];

		match *self {
			TokenGrant::Password { username, password, one_time_code } => {
				pairs.push(("username", username));
				pairs.push(("password", password));

				if let Some(code) = one_time_code {
					pairs.push(("totp", code));
				}
			},
			TokenGrant::AuthorizationCode { code, redirect_uri } => {
				pairs.push(("code", code));
				pairs.push(("redirect_uri", redirect_uri.as_str()));
			},
			TokenGrant::RefreshToken { refresh_token } => {
				pairs.push(("refresh_token", refresh_token));
			},
		}

		pairs
	}
}
impl Debug for TokenGrant<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant").field("grant_type", &self.grant_type()).finish_non_exhaustive()
	}
}

/// Client for the configured token and revocation endpoints.
pub struct TokenEndpoint<C>
where
	C: ?Sized + HttpTransport,
{
	config: Arc<ClientConfig>,
	http_client: Arc<C>,
}
impl<C> TokenEndpoint<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a client sharing `config` and `http_client`.
	pub fn new(config: Arc<ClientConfig>, http_client: Arc<C>) -> Self {
		Self { config, http_client }
	}

	/// Posts `grant` to the token endpoint and returns the issued credential pair.
	///
	/// The response must carry non-empty `access_token` and `refresh_token` strings;
	/// anything else is [`Error::InvalidTokenResponse`].
	pub async fn exchange(&self, grant: TokenGrant<'_>) -> Result<TokenPair> {
		let pairs = grant.form_pairs(&self.config.client_id);
		let request = form_request(&self.config.token_endpoint, &pairs)?;
		let response = http::ensure_success(http::dispatch(&*self.http_client, request).await?)?;

		parse_token_pair(response.body())
	}

	/// Revokes `refresh_token` at the revocation endpoint.
	pub async fn revoke(&self, refresh_token: &TokenSecret) -> Result<()> {
		let pairs = [
			("client_id", self.config.client_id.as_str()),
			("token", refresh_token.expose()),
			("token_type_hint", "refresh_token"),
		];
		let request = form_request(&self.config.revocation_endpoint, &pairs)?;

		http::ensure_success(http::dispatch(&*self.http_client, request).await?)?;

		Ok(())
	}
}
impl<C> Clone for TokenEndpoint<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { config: self.config.clone(), http_client: self.http_client.clone() }
	}
}
impl<C> Debug for TokenEndpoint<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenEndpoint")
			.field("token_endpoint", &self.config.token_endpoint.as_str())
			.field("revocation_endpoint", &self.config.revocation_endpoint.as_str())
			.finish()
	}
}

#[derive(Deserialize)]
struct TokenResponse {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	refresh_token: Option<String>,
}

fn form_request(endpoint: &Url, pairs: &[(&str, &str)]) -> Result<HttpRequest> {
	let body = Serializer::new(String::new()).extend_pairs(pairs).finish();

	Request::builder()
		.method(Method::POST)
		.uri(endpoint.as_str())
		.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
		.header(ACCEPT, JSON_CONTENT_TYPE)
		.body(body.into_bytes())
		.map_err(|e| ConfigError::from(e).into())
}

fn parse_token_pair(body: &[u8]) -> Result<TokenPair> {
	let response: TokenResponse =
		serde_json::from_slice(body).map_err(|_| Error::InvalidTokenResponse)?;

	match (response.access_token, response.refresh_token) {
		(Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() =>
			Ok(TokenPair::new(access, refresh)),
		_ => Err(Error::InvalidTokenResponse),
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap as Form;
	// self
	use super::*;

	fn decoded_form(request: &HttpRequest) -> Form<String, String> {
		url::form_urlencoded::parse(request.body()).into_owned().collect()
	}

	#[test]
	fn password_grant_carries_optional_totp() {
		let endpoint =
			Url::parse("https://id.example.com/oauth/token").expect("Endpoint should parse.");
		let grant = TokenGrant::Password {
			username: "ada@example.com",
			password: "p@ss word",
			one_time_code: Some("123456"),
		};
		let request = form_request(&endpoint, &grant.form_pairs("admin-panel"))
			.expect("Request should build.");
		let form = decoded_form(&request);

		assert_eq!(*request.method(), Method::POST);
		assert_eq!(request.headers()[CONTENT_TYPE], FORM_CONTENT_TYPE);
		assert_eq!(form["client_id"], "admin-panel");
		assert_eq!(form["grant_type"], "password");
		assert_eq!(form["password"], "p@ss word");
		assert_eq!(form["totp"], "123456");

		let without_code =
			TokenGrant::Password { username: "ada", password: "pw", one_time_code: None };

		assert!(
			!without_code.form_pairs("admin-panel").iter().any(|(name, _)| *name == "totp"),
			"The totp field should be omitted without a one-time code."
		);
	}

	#[test]
	fn authorization_code_and_refresh_grants_encode_their_fields() {
		let redirect = Url::parse("https://admin.example.com/callback").expect("URL should parse.");
		let code = TokenGrant::AuthorizationCode { code: "abc", redirect_uri: &redirect };
		let pairs: Form<_, _> = code.form_pairs("admin-panel").into_iter().collect();

		assert_eq!(pairs["grant_type"], "authorization_code");
		assert_eq!(pairs["redirect_uri"], "https://admin.example.com/callback");

		let refresh = TokenGrant::RefreshToken { refresh_token: "r-1" };
		let pairs: Form<_, _> = refresh.form_pairs("admin-panel").into_iter().collect();

		assert_eq!(pairs["grant_type"], "refresh_token");
		assert_eq!(pairs["refresh_token"], "r-1");
	}

	#[test]
	fn token_responses_require_both_tokens() {
		let pair = parse_token_pair(br#"{"access_token":"a","refresh_token":"r","extra":1}"#)
			.expect("Complete responses should parse.");

		assert_eq!(pair.access_token.expose(), "a");
		assert_eq!(pair.refresh_token.expose(), "r");

		let incomplete: [&[u8]; 5] = [
			b"{}",
			br#"{"access_token":"a"}"#,
			br#"{"access_token":"","refresh_token":"r"}"#,
			b"[]",
			b"not json",
		];

		for body in incomplete {
			assert!(matches!(parse_token_pair(body), Err(Error::InvalidTokenResponse)));
		}
	}
}
