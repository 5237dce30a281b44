//! XML Signature, trust resolution and XML Encryption for SAML.
//!
//! Signing keys are never taken from the message itself. They come from the
//! identity provider's metadata through a [`TrustStore`], and each metadata
//! certificate must satisfy the configured [`CertificateSpecification`]s
//! before its key is used.
//!
//! # Signature profile
//!
//! Enveloped signatures are checked against a simplified profile:
//!
//! - the `ds:Signature` is a direct child of the signed element
//! - exactly one `ds:Reference`, whose URI is `#` followed by the element ID
//! - only the enveloped-signature and C14N transforms
//! - exclusive or inclusive canonicalization for both the reference digest
//!   and `ds:SignedInfo`, resolved against the whole document so inherited
//!   namespace declarations are rendered
//!
//! The digest is compared before any key is tried.

mod certificate;
mod decryption;
mod signer;
mod trust;
mod verifier;

pub use certificate::*;
pub use decryption::*;
pub use signer::*;
pub use trust::*;
pub use verifier::*;
