//! SAML 2.0 types and data structures.
//!
//! The assertion model that the validators judge, the protocol messages
//! exchanged with identity providers, and the key material types shared
//! with the trust layer.

mod artifact_resolve;
mod assertion;
mod authn_request;
mod constants;
mod key_info;
mod logout;
mod name_id;
mod response;
mod status;

pub use artifact_resolve::*;
pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use key_info::*;
pub use logout::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

pub(crate) use key_info::decode_base64;

/// Generates a message or assertion ID.
///
/// IDs must be valid `xs:ID` values, so they start with an underscore.
#[must_use]
pub fn generate_id() -> String {
    format!("_{}", uuid::Uuid::new_v4().simple())
}
