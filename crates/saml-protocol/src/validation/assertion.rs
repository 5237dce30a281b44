//! Assertion-level rules.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use saml_core::ValidatedConfig;

use super::{NameIdValidator, StatementValidator, SubjectValidator, is_absolute_uri};
use crate::error::{FormatError, FormatResult};
use crate::types::{Assertion, Condition, Conditions, SAML_VERSION};

/// Validates assertions.
///
/// Checks run in a fixed order and the first failure is returned:
/// the core attributes, the conditions, the validity window, the audience
/// restrictions, the subject and finally each statement.
///
/// Audience checking fails closed: an assertion that carries audience
/// restrictions never validates against an empty allowed set.
#[derive(Debug, Clone)]
pub struct AssertionValidator {
    allowed_audiences: HashSet<String>,
    omit_audience_check: bool,
    clock_skew: Duration,
}

impl AssertionValidator {
    /// Creates a validator for the given audiences with no clock skew.
    pub fn new<I, S>(allowed_audiences: I, omit_audience_check: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_audiences: allowed_audiences.into_iter().map(Into::into).collect(),
            omit_audience_check,
            clock_skew: Duration::zero(),
        }
    }

    /// Creates a validator from the configured audiences, skew and
    /// omit-audience-check flag.
    #[must_use]
    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self::new(config.allowed_audiences.iter().cloned(), config.omit_audience_check)
            .with_clock_skew(config.clock_skew())
    }

    /// Sets the clock skew allowed on the validity window.
    #[must_use]
    pub const fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Validates an assertion against the current time.
    pub fn validate(&self, assertion: &Assertion) -> FormatResult {
        self.validate_at(assertion, Utc::now())
    }

    /// Validates an assertion as of `now`.
    pub fn validate_at(&self, assertion: &Assertion, now: DateTime<Utc>) -> FormatResult {
        if assertion.id.is_none() {
            return Err(FormatError::new("Assertion element must have the ID attribute set."));
        }
        let issuer = assertion
            .issuer
            .as_ref()
            .ok_or_else(|| FormatError::new("Assertion element must have an issuer element."))?;
        NameIdValidator.validate(issuer)?;
        if assertion.issue_instant.is_none() {
            return Err(FormatError::new(
                "Assertion element must have the IssueInstant attribute set.",
            ));
        }
        if assertion.version != SAML_VERSION {
            return Err(FormatError::new(
                "Wrong value of version attribute on Assertion element",
            ));
        }

        if let Some(conditions) = &assertion.conditions {
            validate_conditions(conditions)?;
        }
        validate_time_restrictions(assertion, self.clock_skew, now)?;
        if !self.omit_audience_check {
            self.validate_audiences(assertion)?;
        }

        if let Some(subject) = &assertion.subject {
            SubjectValidator.validate(subject)?;
        }
        for statement in &assertion.statements {
            StatementValidator.validate(statement)?;
        }
        Ok(())
    }

    /// Checks the validity window of an assertion with this validator's skew.
    pub fn validate_time_restrictions(&self, assertion: &Assertion) -> FormatResult {
        validate_time_restrictions(assertion, self.clock_skew, Utc::now())
    }

    fn validate_audiences(&self, assertion: &Assertion) -> FormatResult {
        let Some(conditions) = &assertion.conditions else {
            return Ok(());
        };
        let mut restrictions = conditions.audience_restrictions().peekable();
        if restrictions.peek().is_none() {
            return Ok(());
        }
        if self.allowed_audiences.is_empty() {
            return Err(FormatError::new(
                "The service is not configured to meet any audience restrictions",
            ));
        }

        let all_met = restrictions.all(|restriction| {
            restriction
                .audiences
                .iter()
                .any(|audience| self.allowed_audiences.contains(audience))
        });
        if all_met {
            Ok(())
        } else {
            Err(FormatError::new(
                "The service is not configured to meet the given audience restrictions",
            ))
        }
    }
}

/// Checks `Conditions/@NotBefore` and `@NotOnOrAfter` against `now`.
///
/// `NotBefore` may lie up to `allowed_clock_skew` in the future, and
/// `NotOnOrAfter` must lie after `now - allowed_clock_skew`. An assertion
/// without conditions, or without either bound, has no time restriction.
pub fn validate_time_restrictions(
    assertion: &Assertion,
    allowed_clock_skew: Duration,
    now: DateTime<Utc>,
) -> FormatResult {
    let Some(conditions) = &assertion.conditions else {
        return Ok(());
    };

    if let Some(not_before) = conditions.not_before {
        let latest = now.checked_add_signed(allowed_clock_skew).unwrap_or(DateTime::<Utc>::MAX_UTC);
        if not_before > latest {
            return Err(FormatError::new("Conditions.NotBefore must not be in the future"));
        }
    }
    if let Some(not_on_or_after) = conditions.not_on_or_after {
        let earliest = now.checked_sub_signed(allowed_clock_skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
        if not_on_or_after <= earliest {
            return Err(FormatError::new("Conditions.NotOnOrAfter must not be in the past"));
        }
    }
    Ok(())
}

fn validate_conditions(conditions: &Conditions) -> FormatResult {
    let mut one_time_use = 0;
    let mut proxy_restrictions = 0;

    for condition in &conditions.items {
        match condition {
            Condition::OneTimeUse => {
                one_time_use += 1;
                if one_time_use > 1 {
                    return Err(FormatError::new(
                        "Assertion contained more than one condition of type OneTimeUse",
                    ));
                }
            }
            Condition::ProxyRestriction(restriction) => {
                proxy_restrictions += 1;
                if proxy_restrictions > 1 {
                    return Err(FormatError::new(
                        "Assertion contained more than one condition of type ProxyRestriction",
                    ));
                }
                if let Some(count) = &restriction.count {
                    if count.trim().parse::<u32>().is_err() {
                        return Err(FormatError::new(
                            "Count attribute of ProxyRestriction MUST BE a non-negative integer",
                        ));
                    }
                }
                if !restriction.audiences.iter().all(|a| is_absolute_uri(a)) {
                    return Err(FormatError::new(
                        "ProxyRestriction Audience MUST BE a wellformed uri",
                    ));
                }
            }
            Condition::AudienceRestriction(restriction) => {
                if !restriction.audiences.iter().all(|a| is_absolute_uri(a)) {
                    return Err(FormatError::new(
                        "Audience element has value which is not a wellformed absolute uri",
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::{
        AttributeStatement, AudienceRestriction, AuthnStatement, NameId, ProxyRestriction,
        SamlAttribute, Subject, SubjectConfirmation, authn_context_classes,
    };

    const AUDIENCE: &str = "urn:borger.dk:id";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn basic_assertion() -> Assertion {
        Assertion::new("urn:TokenService/Safewhere")
            .with_subject(Subject::new(NameId::new("user")).with_confirmation(SubjectConfirmation::bearer()))
            .with_conditions(Conditions::default().with_audience(AUDIENCE))
            .with_statement(AuthnStatement::new(authn_context_classes::PASSWORD_PROTECTED_TRANSPORT))
            .with_statement(
                AttributeStatement::new()
                    .with_attribute(SamlAttribute::single("urn:oid:2.5.4.3", "Jane Doe"))
                    .with_attribute(SamlAttribute::single("urn:oid:0.9.2342.19200300.100.1.3", "jane@example.org"))
                    .with_attribute(SamlAttribute::single("dk:gov:saml:attribute:AssuranceLevel", "3"))
                    .with_attribute(SamlAttribute::single("dk:gov:saml:attribute:SpecVer", "DK-SAML-2.0")),
            )
    }

    fn validator() -> AssertionValidator {
        AssertionValidator::new([AUDIENCE], false)
    }

    fn message(result: FormatResult) -> String {
        result.unwrap_err().message().to_string()
    }

    #[test]
    fn basic_assertion_validates() {
        assert!(validator().validate_at(&basic_assertion(), now()).is_ok());
    }

    #[test]
    fn core_attributes_are_required() {
        let mut assertion = basic_assertion();
        assertion.id = None;
        assert_eq!(
            message(validator().validate_at(&assertion, now())),
            "Assertion element must have the ID attribute set."
        );

        let mut assertion = basic_assertion();
        assertion.issuer = None;
        assert!(message(validator().validate_at(&assertion, now())).contains("issuer"));

        let mut assertion = basic_assertion();
        assertion.issue_instant = None;
        assert!(message(validator().validate_at(&assertion, now())).contains("IssueInstant"));

        let mut assertion = basic_assertion();
        assertion.version = "60".to_string();
        assert_eq!(
            message(validator().validate_at(&assertion, now())),
            "Wrong value of version attribute on Assertion element"
        );
    }

    #[test]
    fn issuer_format_rules_apply() {
        let mut assertion = basic_assertion();
        assertion.issuer = Some(NameId::entity("urn:idp").name_qualifier("q"));
        assert!(validator().validate_at(&assertion, now()).is_err());
    }

    #[test]
    fn first_failure_wins() {
        let mut assertion = basic_assertion();
        assertion.id = None;
        assertion.version = "1.1".to_string();
        assert_eq!(
            message(validator().validate_at(&assertion, now())),
            "Assertion element must have the ID attribute set."
        );
    }

    #[test]
    fn one_time_use_cardinality() {
        let once = basic_assertion().with_conditions(
            Conditions::default()
                .with_audience(AUDIENCE)
                .with_condition(Condition::OneTimeUse),
        );
        assert!(validator().validate_at(&once, now()).is_ok());

        let twice = basic_assertion().with_conditions(
            Conditions::default()
                .with_condition(Condition::OneTimeUse)
                .with_condition(Condition::OneTimeUse),
        );
        assert_eq!(
            message(validator().validate_at(&twice, now())),
            "Assertion contained more than one condition of type OneTimeUse"
        );
    }

    #[test]
    fn proxy_restriction_rules() {
        let with_proxy = |count: Option<&str>, audiences: Vec<String>| {
            basic_assertion().with_conditions(Conditions::default().with_condition(
                Condition::ProxyRestriction(ProxyRestriction {
                    count: count.map(str::to_string),
                    audiences,
                }),
            ))
        };

        assert!(validator().validate_at(&with_proxy(Some("0"), Vec::new()), now()).is_ok());
        assert!(validator()
            .validate_at(&with_proxy(None, vec!["https://proxy.example.org".to_string()]), now())
            .is_ok());
        for count in ["-1", "many", ""] {
            assert_eq!(
                message(validator().validate_at(&with_proxy(Some(count), Vec::new()), now())),
                "Count attribute of ProxyRestriction MUST BE a non-negative integer"
            );
        }
        assert!(validator()
            .validate_at(&with_proxy(None, vec!["proxy".to_string()]), now())
            .is_err());

        let twice = basic_assertion().with_conditions(
            Conditions::default()
                .with_condition(Condition::ProxyRestriction(ProxyRestriction::default()))
                .with_condition(Condition::ProxyRestriction(ProxyRestriction::default())),
        );
        assert!(message(validator().validate_at(&twice, now())).contains("ProxyRestriction"));
    }

    #[test]
    fn audience_restrictions() {
        let assertion = basic_assertion();
        assert!(AssertionValidator::new([AUDIENCE], false).validate_at(&assertion, now()).is_ok());
        assert_eq!(
            message(AssertionValidator::new(Vec::<String>::new(), false).validate_at(&assertion, now())),
            "The service is not configured to meet any audience restrictions"
        );
        assert_eq!(
            message(AssertionValidator::new(["uri:lalal"], false).validate_at(&assertion, now())),
            "The service is not configured to meet the given audience restrictions"
        );
        assert!(AssertionValidator::new(Vec::<String>::new(), true)
            .validate_at(&assertion, now())
            .is_ok());
    }

    #[test]
    fn audience_restrictions_combine() {
        let assertion = basic_assertion().with_conditions(
            Conditions::default()
                .with_condition(Condition::AudienceRestriction(AudienceRestriction::new([
                    "urn:a".to_string(),
                    "urn:b".to_string(),
                ])))
                .with_audience("urn:c"),
        );
        assert!(AssertionValidator::new(["urn:b", "urn:c"], false).validate_at(&assertion, now()).is_ok());
        assert!(AssertionValidator::new(["urn:a"], false).validate_at(&assertion, now()).is_err());
    }

    #[test]
    fn no_audience_restriction_needs_no_configuration() {
        let assertion = basic_assertion().with_conditions(Conditions::default());
        assert!(AssertionValidator::new(Vec::<String>::new(), false).validate_at(&assertion, now()).is_ok());
    }

    #[test]
    fn time_window_with_skew() {
        let skew = Duration::minutes(3);
        let window = |not_before, not_on_or_after| Assertion {
            conditions: Some(Conditions {
                not_before,
                not_on_or_after,
                items: Vec::new(),
            }),
            ..basic_assertion()
        };

        assert!(validate_time_restrictions(&window(None, None), skew, now()).is_ok());
        assert!(validate_time_restrictions(&window(Some(now() + skew), None), skew, now()).is_ok());
        assert_eq!(
            message(validate_time_restrictions(
                &window(Some(now() + skew + Duration::seconds(1)), None),
                skew,
                now()
            )),
            "Conditions.NotBefore must not be in the future"
        );
        assert!(validate_time_restrictions(
            &window(None, Some(now() - skew + Duration::seconds(1))),
            skew,
            now()
        )
        .is_ok());
        assert_eq!(
            message(validate_time_restrictions(&window(None, Some(now() - skew)), skew, now())),
            "Conditions.NotOnOrAfter must not be in the past"
        );
    }

    #[test]
    fn validate_applies_skew() {
        let assertion = Assertion {
            conditions: Some(Conditions::valid_between(
                now() + Duration::seconds(30),
                now() + Duration::hours(1),
            )),
            ..basic_assertion()
        };
        assert!(validator().validate_at(&assertion, now()).is_err());
        assert!(validator()
            .with_clock_skew(Duration::minutes(1))
            .validate_at(&assertion, now())
            .is_ok());
    }

    #[test]
    fn statements_are_validated() {
        let assertion = basic_assertion().with_statement(AttributeStatement::new());
        assert_eq!(
            message(validator().validate_at(&assertion, now())),
            "AttributeStatement MUST contain at least one Attribute or EncryptedAttribute"
        );
    }
}
