//! Bearer token secrets and the credential pair persisted by the session.

pub mod pair;
pub mod secret;
