//! `NameID` value rules per format.

use std::sync::LazyLock;

use regex::Regex;

use super::contains_non_whitespace;
use crate::error::{FormatError, FormatResult};
use crate::types::{NameId, NameIdFormat};

/// Permissive RFC 2822 address check.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("EMAIL_REGEX is a valid regex pattern")
});

const MAX_ENTITY_LENGTH: usize = 1024;
const MAX_PERSISTENT_LENGTH: usize = 256;
const TRANSIENT_LENGTH: std::ops::RangeInclusive<usize> = 16..=256;

/// Validates `NameID` (and `Issuer`) values against their format.
///
/// Values are never trimmed. Unknown formats are accepted as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameIdValidator;

impl NameIdValidator {
    /// Checks the value of a name ID against the rules of its format.
    pub fn validate(&self, name_id: &NameId) -> FormatResult {
        let Some(format) = name_id.known_format() else {
            return Ok(());
        };
        let value = name_id.value.as_str();
        let length = value.chars().count();

        match format {
            NameIdFormat::Email => {
                require_non_whitespace(value, "Email")?;
                if !EMAIL_REGEX.is_match(value) {
                    return Err(FormatError::new(
                        "Value of NameID is not a valid email address according to the IETF RFC 2822 specification",
                    ));
                }
            }
            NameIdFormat::X509SubjectName => require_non_whitespace(value, "X509SubjectName")?,
            NameIdFormat::Windows => require_non_whitespace(value, "Windows")?,
            NameIdFormat::Kerberos => {
                require_non_whitespace(value, "Kerberos")?;
                if length < 3 {
                    return Err(FormatError::new(
                        "NameID with Kerberos Format attribute MUST contain a Value with at least 3 characters",
                    ));
                }
                if !value.contains('@') {
                    return Err(FormatError::new(
                        "NameID with Kerberos Format attribute MUST contain a Value that contains a '@'",
                    ));
                }
            }
            NameIdFormat::Entity => {
                require_non_whitespace(value, "Entity")?;
                if length > MAX_ENTITY_LENGTH {
                    return Err(FormatError::new(
                        "NameID with Entity Format attribute MUST have a Value that contains no more than 1024 characters",
                    ));
                }
                if name_id.has_qualifiers() {
                    return Err(FormatError::new(
                        "NameID with Entity Format attribute MUST NOT set the NameQualifier, SPNameQualifier or SPProvidedID attributes",
                    ));
                }
            }
            NameIdFormat::Persistent => {
                require_non_whitespace(value, "Persistent")?;
                if length > MAX_PERSISTENT_LENGTH {
                    return Err(FormatError::new(
                        "NameID with Persistent Format attribute MUST have a Value that contains no more than 256 characters",
                    ));
                }
            }
            NameIdFormat::Transient => {
                if length < *TRANSIENT_LENGTH.start() {
                    return Err(FormatError::new(
                        "NameID with Transient Format attribute MUST have a Value with at least 16 characters (the equivalent of 128 bits)",
                    ));
                }
                if length > *TRANSIENT_LENGTH.end() {
                    return Err(FormatError::new(
                        "NameID with Transient Format attribute MUST have a Value that contains no more than 256 characters",
                    ));
                }
            }
            NameIdFormat::Unspecified => {}
        }
        Ok(())
    }
}

fn require_non_whitespace(value: &str, format: &str) -> FormatResult {
    if contains_non_whitespace(value) {
        Ok(())
    } else {
        Err(FormatError::new(format!(
            "NameID with {format} Format attribute MUST contain a Value that contains more than whitespace characters"
        )))
    }
}
