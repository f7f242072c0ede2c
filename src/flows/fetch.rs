//! Bearer-authenticated API requests.

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Request,
		header::{AUTHORIZATION, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	flows::RefreshCoordinator,
	http::{self, HeaderMap, HeaderName, HeaderValue, HttpTransport, Method, StatusCode},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{self, StoreKey, TokenStore},
};

/// Outbound API request; the bearer header is added when the request is sent.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Caller-supplied headers.
	pub headers: HeaderMap,
	/// Raw request body.
	pub body: Vec<u8>,
}
impl ApiRequest {
	/// Creates a body-less request.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(url: Url) -> Self {
		Self::new(Method::PUT, url)
	}

	/// Shorthand for a `PATCH` request.
	pub fn patch(url: Url) -> Self {
		Self::new(Method::PATCH, url)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(url: Url) -> Self {
		Self::new(Method::DELETE, url)
	}

	/// Sets one header, replacing any previous value.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Sets one header from strings, validating both parts.
	pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
		let invalid = || ConfigError::InvalidHeaderValue { name: name.to_owned() };
		let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
		let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;

		Ok(self.header(header_name, header_value))
	}

	/// Merges `headers` into the request, replacing values with the same name.
	pub fn headers(mut self, headers: HeaderMap) -> Self {
		self.headers.extend(headers);

		self
	}

	/// Serializes `body` as JSON and sets `Content-Type: application/json` unless the caller
	/// already chose a content type.
	pub fn json<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		self.body = serde_json::to_vec(body)
			.map_err(|e| ConfigError::RequestBody { source: Arc::new(e) })?;

		self.headers
			.entry(CONTENT_TYPE)
			.or_insert_with(|| HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Replaces the raw request body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	fn into_http(self, access_token: Option<&TokenSecret>) -> Result<HttpRequest> {
		let mut headers = self.headers;

		if let Some(token) = access_token {
			headers.insert(AUTHORIZATION, bearer(token)?);
		}

		let mut request = Request::builder()
			.method(self.method)
			.uri(self.url.as_str())
			.body(self.body)
			.map_err(ConfigError::from)?;

		*request.headers_mut() = headers;

		Ok(request)
	}
}

/// Successful API response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// Parsed JSON body; `None` when the body was empty.
	pub data: Option<Value>,
	/// Response status (always 2xx).
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
}
impl ApiResponse {
	/// Deserializes the body into `T`; an empty body is treated as JSON `null`.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		serde_path_to_error::deserialize(self.data.clone().unwrap_or(Value::Null)).map_err(|e| {
			Error::ResponseBody { status: self.status.as_u16(), source: Arc::new(e) }
		})
	}

	fn from_http(response: HttpResponse) -> Result<Self> {
		let (parts, body) = response.into_parts();
		let data = if body.iter().all(u8::is_ascii_whitespace) {
			None
		} else {
			let mut deserializer = serde_json::Deserializer::from_slice(&body);

			Some(serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
				Error::ResponseBody { status: parts.status.as_u16(), source: Arc::new(e) }
			})?)
		};

		Ok(Self { data, status: parts.status, headers: parts.headers })
	}
}

/// Sends API requests with the current access token attached.
pub struct AuthenticatedClient<C>
where
	C: ?Sized + HttpTransport,
{
	coordinator: RefreshCoordinator<C>,
	store: Arc<dyn TokenStore>,
	http_client: Arc<C>,
}
impl<C> AuthenticatedClient<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a client that keeps credentials fresh through `coordinator`.
	pub fn new(
		coordinator: RefreshCoordinator<C>,
		store: Arc<dyn TokenStore>,
		http_client: Arc<C>,
	) -> Self {
		Self { coordinator, store, http_client }
	}

	/// Ensures fresh credentials, then sends `request` with `Authorization: Bearer <token>`.
	///
	/// Non-2xx responses become [`Error::Http`]; transport failures stay
	/// [`Error::Transport`]. Nothing is sent when credentials cannot be made fresh.
	pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "request");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.coordinator.ensure_fresh().await?;

				let access_token = store::read_secret(&*self.store, StoreKey::AccessToken).await?;
				let request = request.into_http(access_token.as_ref())?;
				let response = http::dispatch(&*self.http_client, request).await?;

				ApiResponse::from_http(http::ensure_success(response)?)
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Shorthand for an authenticated `GET`.
	pub async fn get(&self, url: Url) -> Result<ApiResponse> {
		self.request(ApiRequest::get(url)).await
	}
}
impl<C> Clone for AuthenticatedClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			coordinator: self.coordinator.clone(),
			store: self.store.clone(),
			http_client: self.http_client.clone(),
		}
	}
}
impl<C> Debug for AuthenticatedClient<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticatedClient").field("coordinator", &self.coordinator).finish()
	}
}

fn bearer(token: &TokenSecret) -> Result<HeaderValue> {
	let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
		.map_err(|_| ConfigError::InvalidHeaderValue { name: AUTHORIZATION.to_string() })?;

	value.set_sensitive(true);

	Ok(value)
}
