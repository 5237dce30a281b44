//! # saml-cache
//!
//! Expiring key-value storage for the stateful parts of SAML processing:
//! outstanding request IDs, consumed one-time-use assertions and pending
//! artifact-binding messages.
//!
//! ## Stores
//!
//! - [`ExpiringStore`] - the storage trait the protocol crate is written against
//! - [`MemoryStore`] - concurrent in-process implementation
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use saml_cache::{ExpiringStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let expires = Utc::now() + Duration::minutes(5);
//! assert!(store.insert_if_absent("assertion:_abc", "", expires).unwrap());
//! assert!(!store.insert_if_absent("assertion:_abc", "", expires).unwrap());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryStore;
pub use store::ExpiringStore;
