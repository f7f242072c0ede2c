//! Auth-domain models: decoded JWT claims, identity snapshots, permissions, and token
//! secrets.

pub mod claims;
pub mod identity;
pub mod token;

pub use claims::{Claims, DecodeError};
pub use identity::*;
pub use token::{pair::*, secret::*};
