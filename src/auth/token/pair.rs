//! Access/refresh credential pair.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Access and refresh tokens issued together; the session never stores one without the
/// other.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
	/// Short-lived bearer token attached to API calls.
	pub access_token: TokenSecret,
	/// Longer-lived token used only against the token endpoint.
	pub refresh_token: TokenSecret,
}
impl TokenPair {
	/// Pairs two token strings.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
		}
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.finish()
	}
}
