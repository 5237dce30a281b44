//! XML reading and writing.
//!
//! Documents are parsed once into an [`XmlElement`] tree. The reader maps
//! trees onto the data model in [`crate::types`], and the writer turns the
//! model back into XML for outbound messages and signing.

mod c14n;
mod element;
pub mod reader;
pub mod writer;

pub use c14n::{C14nMethod, canonicalize};
pub use element::{XmlAttribute, XmlElement};
pub use reader::*;
pub use writer::*;
