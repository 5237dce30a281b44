//! `Subject`, `SubjectConfirmation` and `SubjectConfirmationData` rules.

use super::{NameIdValidator, contains_non_whitespace, is_absolute_uri, validate_encrypted_element};
use crate::error::{FormatError, FormatResult};
use crate::types::{
    ConfirmationDataKind, Subject, SubjectConfirmation, SubjectConfirmationData, SubjectItem,
    XMLDSIG_NS, confirmation_methods,
};
use crate::xml::format_instant;

/// Validates `SubjectConfirmationData`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectConfirmationDataValidator;

impl SubjectConfirmationDataValidator {
    /// Checks the time bounds, the recipient and, for the key info type,
    /// the embedded `ds:KeyInfo`.
    pub fn validate(&self, data: &SubjectConfirmationData) -> FormatResult {
        if let (Some(not_before), Some(not_on_or_after)) = (data.not_before, data.not_on_or_after) {
            if not_before >= not_on_or_after {
                return Err(FormatError::new(format!(
                    "NotBefore {} MUST BE less than NotOnOrAfter {} on SubjectConfirmationData",
                    format_instant(not_before),
                    format_instant(not_on_or_after)
                )));
            }
        }

        if data.kind == ConfirmationDataKind::KeyInfo {
            validate_key_info(data)?;
        }

        if let Some(recipient) = &data.recipient {
            if !is_absolute_uri(recipient) {
                return Err(FormatError::new(
                    "Recipient of SubjectConfirmationData must be a wellformed absolute URI.",
                ));
            }
        }
        Ok(())
    }
}

fn validate_key_info(data: &SubjectConfirmationData) -> FormatResult {
    if data.any_elements.is_empty() {
        return Err(FormatError::new(
            "SubjectConfirmationData element MUST have at least one KeyInfo subelement",
        ));
    }
    let key_info = data
        .any_elements
        .iter()
        .find(|element| element.is(XMLDSIG_NS, "KeyInfo"))
        .ok_or_else(|| {
            FormatError::new(
                "SubjectConfirmationData element MUST contain at least one ds:KeyInfo element",
            )
        })?;
    if key_info.children.is_empty() {
        return Err(FormatError::new(
            "KeyInfo subelement of SubjectConfirmationData MUST NOT be empty",
        ));
    }
    Ok(())
}

/// Validates `SubjectConfirmation`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectConfirmationValidator;

impl SubjectConfirmationValidator {
    /// Checks the method URI, the optional name ID and the confirmation data.
    pub fn validate(&self, confirmation: &SubjectConfirmation) -> FormatResult {
        if !contains_non_whitespace(&confirmation.method) {
            return Err(FormatError::new(
                "Method attribute of SubjectConfirmation MUST contain at least one non-whitespace character",
            ));
        }
        if !is_absolute_uri(&confirmation.method) {
            return Err(FormatError::new(
                "SubjectConfirmation element has Method attribute which is not a wellformed absolute uri.",
            ));
        }

        if confirmation.method == confirmation_methods::HOLDER_OF_KEY {
            let has_key_info = confirmation.data.as_ref().is_some_and(|data| {
                data.any_elements
                    .iter()
                    .any(|element| element.is(XMLDSIG_NS, "KeyInfo"))
            });
            if !has_key_info {
                return Err(FormatError::new(
                    "SubjectConfirmationData element MUST be present and contain a KeyInfo element when Method is holder-of-key",
                ));
            }
        }

        if let Some(name_id) = &confirmation.name_id {
            NameIdValidator.validate(name_id)?;
        }
        if let Some(data) = &confirmation.data {
            SubjectConfirmationDataValidator.validate(data)?;
        }
        Ok(())
    }
}

/// Validates `Subject`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectValidator;

impl SubjectValidator {
    /// Checks the subject items and every nested identifier and confirmation.
    pub fn validate(&self, subject: &Subject) -> FormatResult {
        if subject.items.is_empty() {
            return Err(FormatError::new(
                "Subject MUST contain either an identifier or a subject confirmation",
            ));
        }
        if subject
            .items
            .iter()
            .any(|item| matches!(item, SubjectItem::Other(_)))
        {
            return Err(FormatError::new(
                "Subject must have either NameID, EncryptedID or SubjectConfirmation subelement.",
            ));
        }

        for item in &subject.items {
            match item {
                SubjectItem::NameId(name_id) => NameIdValidator.validate(name_id)?,
                SubjectItem::EncryptedId(encrypted) => {
                    validate_encrypted_element(encrypted, "EncryptedID")?;
                }
                SubjectItem::SubjectConfirmation(confirmation) => {
                    SubjectConfirmationValidator.validate(confirmation)?;
                }
                SubjectItem::Other(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::types::{EncryptedData, EncryptedElement, NameId, SAML_NS};
    use crate::xml::XmlElement;

    fn instant(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
    }

    fn key_info() -> XmlElement {
        XmlElement::new(XMLDSIG_NS, "KeyInfo")
            .with_child(XmlElement::new(XMLDSIG_NS, "KeyName").with_text("hok"))
    }

    #[test]
    fn not_before_must_precede_not_on_or_after() {
        let data = SubjectConfirmationData {
            not_before: Some(instant("2008-01-30T17:13:00.5Z")),
            not_on_or_after: Some(instant("2008-01-30T16:13:00.5Z")),
            ..SubjectConfirmationData::default()
        };
        let err = SubjectConfirmationDataValidator.validate(&data).unwrap_err();
        assert!(err.message().contains("2008-01-30T17:13:00.500Z"));
        assert!(err.message().contains("2008-01-30T16:13:00.500Z"));

        let equal = SubjectConfirmationData {
            not_before: data.not_before,
            not_on_or_after: data.not_before,
            ..SubjectConfirmationData::default()
        };
        assert!(SubjectConfirmationDataValidator.validate(&equal).is_err());

        let ordered = SubjectConfirmationData {
            not_before: data.not_on_or_after,
            not_on_or_after: data.not_before,
            ..SubjectConfirmationData::default()
        };
        assert!(SubjectConfirmationDataValidator.validate(&ordered).is_ok());
    }

    #[test]
    fn recipient_must_be_absolute() {
        let now = Utc::now();
        let ok = SubjectConfirmationData::for_request("_r", "https://sp.example.org/acs", now);
        assert!(SubjectConfirmationDataValidator.validate(&ok).is_ok());

        for recipient in ["acs", " ", ""] {
            let data = SubjectConfirmationData::for_request("_r", recipient, now);
            assert!(SubjectConfirmationDataValidator.validate(&data).is_err(), "{recipient:?}");
        }
    }

    #[test]
    fn key_info_data_requires_non_empty_key_info() {
        assert!(SubjectConfirmationDataValidator
            .validate(&SubjectConfirmationData::key_info(vec![key_info()]))
            .is_ok());
        assert!(SubjectConfirmationDataValidator
            .validate(&SubjectConfirmationData::key_info(Vec::new()))
            .is_err());
        assert!(SubjectConfirmationDataValidator
            .validate(&SubjectConfirmationData::key_info(vec![XmlElement::new(SAML_NS, "KeyInfo")]))
            .is_err());
        assert!(SubjectConfirmationDataValidator
            .validate(&SubjectConfirmationData::key_info(vec![XmlElement::new(XMLDSIG_NS, "KeyInfo")]))
            .is_err());
    }

    #[test]
    fn confirmation_method() {
        assert!(SubjectConfirmationValidator.validate(&SubjectConfirmation::bearer()).is_ok());
        assert!(SubjectConfirmationValidator.validate(&SubjectConfirmation::new(" ")).is_err());
        assert!(SubjectConfirmationValidator.validate(&SubjectConfirmation::new("bearer")).is_err());
    }

    #[test]
    fn holder_of_key_requires_key_info() {
        let bare = SubjectConfirmation::holder_of_key();
        assert!(SubjectConfirmationValidator.validate(&bare).is_err());

        let plain = SubjectConfirmation::holder_of_key().with_data(SubjectConfirmationData::default());
        assert!(SubjectConfirmationValidator.validate(&plain).is_err());

        let with_key = SubjectConfirmation::holder_of_key()
            .with_data(SubjectConfirmationData::key_info(vec![key_info()]));
        assert!(SubjectConfirmationValidator.validate(&with_key).is_ok());
    }

    #[test]
    fn subject_items() {
        assert!(SubjectValidator.validate(&Subject::default()).is_err());
        assert!(SubjectValidator.validate(&Subject::new(NameId::new("user"))).is_ok());

        let mut subject = Subject::new(NameId::new("user"));
        subject.items.push(SubjectItem::Other(XmlElement::new(SAML_NS, "BaseID")));
        let err = SubjectValidator.validate(&subject).unwrap_err();
        assert!(err.message().contains("NameID, EncryptedID or SubjectConfirmation"));

        let encrypted = Subject {
            items: vec![SubjectItem::EncryptedId(EncryptedElement {
                encrypted_data: Some(EncryptedData::default()),
                encrypted_keys: Vec::new(),
            })],
        };
        assert!(SubjectValidator.validate(&encrypted).is_ok());
    }

    #[test]
    fn subject_validates_nested_confirmations() {
        let subject = Subject::new(NameId::new("user")).with_confirmation(
            SubjectConfirmation::bearer().with_data(SubjectConfirmationData::for_request(
                "_r",
                "not a uri",
                Utc::now() + Duration::minutes(5),
            )),
        );
        assert!(SubjectValidator.validate(&subject).is_err());
    }
}
