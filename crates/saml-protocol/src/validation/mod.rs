//! Assertion validation.
//!
//! Each validator checks one part of the assertion against the rules of
//! SAML 2.0 core and stops at the first violation. Validators are pure:
//! they take their configuration up front, never log and never touch
//! shared state.
//!
//! [`AssertionValidator`] is the entry point and composes the others.

mod assertion;
mod name_id;
mod statement;
mod subject;

pub use assertion::{AssertionValidator, validate_time_restrictions};
pub use name_id::NameIdValidator;
pub use statement::StatementValidator;
pub use subject::{SubjectConfirmationDataValidator, SubjectConfirmationValidator, SubjectValidator};

use crate::error::{FormatError, FormatResult};
use crate::types::{EncryptedElement, XMLENC_ELEMENT_TYPE};

/// Returns true if `value` has at least one non-whitespace character.
pub(crate) fn contains_non_whitespace(value: &str) -> bool {
    value.chars().any(|c| !c.is_whitespace())
}

/// Returns true if `value` is a well-formed absolute URI.
///
/// Surrounding or embedded whitespace makes a value malformed.
pub(crate) fn is_absolute_uri(value: &str) -> bool {
    !value.is_empty()
        && !value.chars().any(char::is_whitespace)
        && url::Url::parse(value).is_ok()
}

/// Checks an `EncryptedAttribute`, `EncryptedID` or `EncryptedAssertion`.
pub(crate) fn validate_encrypted_element(element: &EncryptedElement, name: &str) -> FormatResult {
    let data = element
        .encrypted_data
        .as_ref()
        .ok_or_else(|| FormatError::new(format!("{name} MUST contain an EncryptedData element")))?;

    if let Some(data_type) = &data.data_type {
        if data_type != XMLENC_ELEMENT_TYPE {
            return Err(FormatError::new(format!(
                "Type attribute of EncryptedData in {name} (if present) MUST be {XMLENC_ELEMENT_TYPE}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncryptedData;

    #[test]
    fn whitespace_detection() {
        assert!(contains_non_whitespace(" a "));
        assert!(!contains_non_whitespace(""));
        assert!(!contains_non_whitespace(" \t\r\n"));
    }

    #[test]
    fn absolute_uris() {
        assert!(is_absolute_uri("urn:borger.dk:id"));
        assert!(is_absolute_uri("https://sp.example.org/acs"));
        assert!(!is_absolute_uri("relative/path"));
        assert!(!is_absolute_uri(" "));
        assert!(!is_absolute_uri(" urn:x"));
        assert!(!is_absolute_uri(""));
    }

    #[test]
    fn encrypted_element_type() {
        let mut element = EncryptedElement::default();
        assert!(validate_encrypted_element(&element, "EncryptedAttribute").is_err());

        element.encrypted_data = Some(EncryptedData::default());
        assert!(validate_encrypted_element(&element, "EncryptedAttribute").is_ok());

        element.encrypted_data = Some(EncryptedData {
            data_type: Some(XMLENC_ELEMENT_TYPE.to_string()),
            ..EncryptedData::default()
        });
        assert!(validate_encrypted_element(&element, "EncryptedAttribute").is_ok());

        element.encrypted_data = Some(EncryptedData {
            data_type: Some("http://www.w3.org/2001/04/xmlenc#Content".to_string()),
            ..EncryptedData::default()
        });
        let err = validate_encrypted_element(&element, "EncryptedAttribute").unwrap_err();
        assert!(err.message().starts_with("Type attribute of EncryptedData in EncryptedAttribute"));
    }
}
