pub mod identity;
pub mod sync;

pub use identity::{bearer_token, IdentityError, IdentityVerifier, VerifiedIdentity};
