//! SAML 2.0 assertion validation and trust decisions for service providers.
//!
//! This crate decides whether an assertion received from an identity
//! provider can be believed:
//!
//! - **Assertion validation** - structural and semantic rules of SAML 2.0 core
//! - **Trust resolution** - signature verification against metadata keys
//! - **Decryption** - encrypted assertions and attributes
//! - **Replay protection** - InResponseTo matching and one-time assertions
//! - **Bindings** - HTTP-Redirect, HTTP-POST and HTTP-Artifact
//!
//! # Architecture
//!
//! - [`types`] - SAML data model
//! - [`xml`] - XML parsing and serialization
//! - [`validation`] - pure assertion validators
//! - [`signature`] - signing, verification, trust and decryption
//! - [`replay`] - anti-replay ledger over an expiring store
//! - [`artifact`] - the type 0x0004 artifact codec
//! - [`bindings`] - transport encodings
//! - [`consumer`] - end-to-end response and logout processing
//! - [`error`] - error types
//!
//! # Example
//!
//! ```rust,ignore
//! use saml_protocol::consumer::ResponseConsumer;
//!
//! let consumer = ResponseConsumer::new(config, trust_store, replay_guard, decryption_keys);
//! let consumed = consumer.consume(&decoded.xml, &relay_state)?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Profiles](https://docs.oasis-open.org/security/saml/v2.0/saml-profiles-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [XML Encryption](https://www.w3.org/TR/xmlenc-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod artifact;
pub mod bindings;
pub mod consumer;
pub mod error;
pub mod replay;
pub mod signature;
pub mod types;
pub mod validation;
pub mod xml;

pub use consumer::{ConsumedAssertion, LogoutConsumer, ResponseConsumer};
pub use error::{FormatError, ReplayError, SamlError, SamlResult, TrustError};
pub use replay::ReplayGuard;
pub use types::*;
pub use validation::AssertionValidator;
