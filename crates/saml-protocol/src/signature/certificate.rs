//! X.509 certificates from metadata and the rules for accepting them.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use saml_core::ValidatedConfig;
use saml_core::config::normalize_thumbprint;
use saml_crypto::{PublicKey, pem_to_der, sha1};
use x509_parser::public_key::PublicKey as SpkiKey;

use crate::error::TrustError;

/// A parsed X.509 certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    spki_der: Vec<u8>,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    public_key: PublicKey,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

impl Certificate {
    /// Parses a DER encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, TrustError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| TrustError::Certificate(format!("invalid X.509 certificate: {e}")))?;

        let validity = cert.validity();
        let not_before = timestamp(validity.not_before.timestamp())?;
        let not_after = timestamp(validity.not_after.timestamp())?;

        let spki = cert.public_key();
        let public_key = match spki.parsed() {
            Ok(SpkiKey::RSA(rsa)) => PublicKey::RsaComponents {
                modulus: rsa.modulus.to_vec(),
                exponent: rsa.exponent.to_vec(),
            },
            Ok(SpkiKey::EC(point)) => PublicKey::Ec {
                point: point.data().to_vec(),
            },
            Ok(_) => {
                return Err(TrustError::Certificate(
                    "unsupported certificate key type".to_string(),
                ));
            }
            Err(e) => return Err(TrustError::Certificate(format!("invalid public key: {e}"))),
        };

        Ok(Self {
            der: der.to_vec(),
            spki_der: spki.raw.to_vec(),
            subject: cert.subject().to_string(),
            not_before,
            not_after,
            public_key,
        })
    }

    /// Parses a PEM `CERTIFICATE` block.
    pub fn from_pem(pem: &str) -> Result<Self, TrustError> {
        let der = pem_to_der(pem, "CERTIFICATE")
            .ok_or_else(|| TrustError::Certificate("invalid certificate PEM".to_string()))?;
        Self::from_der(&der)
    }

    /// The DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The DER encoded `SubjectPublicKeyInfo`.
    #[must_use]
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// Subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Start of the validity period.
    #[must_use]
    pub const fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity period.
    #[must_use]
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// The subject public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// SHA-1 thumbprint as upper-case hex.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        sha1(&self.der).iter().map(|b| format!("{b:02X}")).collect()
    }

    /// Returns true if `instant` lies within the validity period.
    #[must_use]
    pub fn is_valid_at(&self, instant: DateTime<Utc>) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TrustError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| TrustError::Certificate("certificate time out of range".to_string()))
}

/// A rule a metadata certificate must satisfy before its key is trusted.
pub trait CertificateSpecification: Send + Sync + fmt::Debug {
    /// Returns true if the certificate is acceptable.
    fn is_satisfied_by(&self, certificate: &Certificate) -> bool;
}

/// Accepts certificates within their validity period.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidityPeriodSpecification {
    at: Option<DateTime<Utc>>,
}

impl ValidityPeriodSpecification {
    /// Checks against the current time.
    #[must_use]
    pub const fn new() -> Self {
        Self { at: None }
    }

    /// Checks against a fixed instant.
    #[must_use]
    pub const fn at(instant: DateTime<Utc>) -> Self {
        Self { at: Some(instant) }
    }
}

impl CertificateSpecification for ValidityPeriodSpecification {
    fn is_satisfied_by(&self, certificate: &Certificate) -> bool {
        certificate.is_valid_at(self.at.unwrap_or_else(Utc::now))
    }
}

/// Accepts certificates whose SHA-1 thumbprint is listed.
#[derive(Debug, Clone, Default)]
pub struct ThumbprintSpecification {
    thumbprints: HashSet<String>,
}

impl ThumbprintSpecification {
    /// Creates the specification from hex thumbprints.
    ///
    /// Case, colons and whitespace are ignored.
    pub fn new<I, S>(thumbprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            thumbprints: thumbprints
                .into_iter()
                .map(|t| normalize_thumbprint(t.as_ref()))
                .collect(),
        }
    }
}

impl CertificateSpecification for ThumbprintSpecification {
    fn is_satisfied_by(&self, certificate: &Certificate) -> bool {
        self.thumbprints.contains(&certificate.thumbprint())
    }
}

/// Builds the certificate rules the configuration asks for.
#[must_use]
pub fn certificate_specifications(config: &ValidatedConfig) -> Vec<Box<dyn CertificateSpecification>> {
    let mut specs: Vec<Box<dyn CertificateSpecification>> = Vec::new();
    if config.certificates.check_validity_period {
        specs.push(Box::new(ValidityPeriodSpecification::new()));
    }
    if !config.certificates.trusted_thumbprints.is_empty() {
        specs.push(Box::new(ThumbprintSpecification::new(
            &config.certificates.trusted_thumbprints,
        )));
    }
    specs
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use saml_core::{CertificateConfig, SamlConfig, ServiceProviderConfig};

    use super::*;

    const IDP_CERT: &str = include_str!("../../tests/fixtures/idp-cert.pem");
    const EXPIRED_CERT: &str = include_str!("../../tests/fixtures/expired-cert.pem");
    const IDP_THUMBPRINT: &str = "FC:78:7F:16:24:35:4C:AB:41:A4:EA:9D:B9:C8:39:1F:D7:3B:84:0B";

    #[test]
    fn parses_certificate() {
        let cert = Certificate::from_pem(IDP_CERT).unwrap();
        assert!(cert.subject().contains("idp.example.org"));
        assert_eq!(cert.thumbprint(), normalize_thumbprint(IDP_THUMBPRINT));
        assert!(matches!(cert.public_key(), PublicKey::RsaComponents { .. }));
        assert!(cert.not_before() < cert.not_after());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Certificate::from_der(b"not a certificate").is_err());
        assert!(Certificate::from_pem("-----BEGIN CERTIFICATE-----\n!!\n-----END CERTIFICATE-----").is_err());
    }

    #[test]
    fn validity_period() {
        let expired = Certificate::from_pem(EXPIRED_CERT).unwrap();
        let during = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();

        assert!(ValidityPeriodSpecification::at(during).is_satisfied_by(&expired));
        assert!(!ValidityPeriodSpecification::at(after).is_satisfied_by(&expired));
        assert!(!ValidityPeriodSpecification::new().is_satisfied_by(&expired));
    }

    #[test]
    fn thumbprints() {
        let cert = Certificate::from_pem(IDP_CERT).unwrap();
        assert!(ThumbprintSpecification::new([IDP_THUMBPRINT.to_lowercase()]).is_satisfied_by(&cert));
        assert!(!ThumbprintSpecification::new(["00".repeat(20)]).is_satisfied_by(&cert));
        assert!(!ThumbprintSpecification::default().is_satisfied_by(&cert));
    }

    #[test]
    fn specifications_from_config() {
        let config = |certificates| {
            SamlConfig {
                service_provider: ServiceProviderConfig {
                    entity_id: "https://sp.example.org".to_string(),
                    ..ServiceProviderConfig::default()
                },
                certificates,
                ..SamlConfig::default()
            }
            .validate()
            .unwrap()
        };

        assert_eq!(certificate_specifications(&config(CertificateConfig::default())).len(), 1);
        assert_eq!(
            certificate_specifications(&config(CertificateConfig {
                check_validity_period: true,
                trusted_thumbprints: vec![IDP_THUMBPRINT.to_string()],
            }))
            .len(),
            2
        );
        assert!(certificate_specifications(&config(CertificateConfig {
            check_validity_period: false,
            trusted_thumbprints: Vec::new(),
        }))
        .is_empty());
    }
}
