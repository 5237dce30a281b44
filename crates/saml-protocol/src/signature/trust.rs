//! Trusted signing keys of identity providers.
//!
//! Metadata handling lives outside this crate. It hands over an immutable
//! [`TrustStore`] snapshot, and the keys are extracted from its key
//! descriptors on every call.

use std::collections::HashMap;

use saml_crypto::PublicKey;
use tracing::{debug, warn};

use super::{Certificate, CertificateSpecification};
use crate::types::{KeyDescriptor, KeyInfoClause, KeyUse};

/// Source of identity provider key descriptors.
pub trait TrustStore: Send + Sync {
    /// Returns the key descriptors published for an issuer.
    ///
    /// An unknown issuer has no descriptors.
    fn key_descriptors(&self, issuer: &str) -> Vec<KeyDescriptor>;
}

/// Fixed in-memory trust store.
#[derive(Debug, Clone, Default)]
pub struct StaticTrustStore {
    entries: HashMap<String, Vec<KeyDescriptor>>,
}

impl StaticTrustStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds descriptors for an issuer.
    #[must_use]
    pub fn with_descriptors(
        mut self,
        issuer: impl Into<String>,
        descriptors: impl IntoIterator<Item = KeyDescriptor>,
    ) -> Self {
        self.entries.entry(issuer.into()).or_default().extend(descriptors);
        self
    }

    /// Adds a signing certificate for an issuer.
    #[must_use]
    pub fn with_signing_certificate(self, issuer: impl Into<String>, der: Vec<u8>) -> Self {
        self.with_descriptors(issuer, [KeyDescriptor::signing_certificate(der)])
    }
}

impl FromIterator<(String, Vec<KeyDescriptor>)> for StaticTrustStore {
    fn from_iter<T: IntoIterator<Item = (String, Vec<KeyDescriptor>)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::new(), |store, (issuer, descriptors)| store.with_descriptors(issuer, descriptors))
    }
}

impl TrustStore for StaticTrustStore {
    fn key_descriptors(&self, issuer: &str) -> Vec<KeyDescriptor> {
        self.entries.get(issuer).cloned().unwrap_or_default()
    }
}

/// Extracts the signing keys of the given descriptors.
///
/// Encryption-only descriptors are ignored. A certificate that cannot be
/// parsed or fails any specification is skipped; bare RSA key values are
/// taken as they are.
#[must_use]
pub fn extract_trusted_keys(
    descriptors: &[KeyDescriptor],
    specs: &[Box<dyn CertificateSpecification>],
) -> Vec<PublicKey> {
    let mut keys = Vec::new();
    for descriptor in descriptors {
        if descriptor.usage == Some(KeyUse::Encryption) {
            continue;
        }
        for clause in &descriptor.key_info.clauses {
            match clause {
                KeyInfoClause::X509Data(certificates) => {
                    for der in certificates {
                        let certificate = match Certificate::from_der(der) {
                            Ok(certificate) => certificate,
                            Err(e) => {
                                warn!(error = %e, "Skipping unreadable metadata certificate");
                                continue;
                            }
                        };
                        if let Some(spec) = specs.iter().find(|spec| !spec.is_satisfied_by(&certificate)) {
                            warn!(
                                subject = %certificate.subject(),
                                thumbprint = %certificate.thumbprint(),
                                rule = ?spec,
                                "Skipping metadata certificate that failed acceptance"
                            );
                            continue;
                        }
                        keys.push(certificate.public_key().clone());
                    }
                }
                KeyInfoClause::RsaKeyValue { modulus, exponent } => {
                    keys.push(PublicKey::RsaComponents {
                        modulus: modulus.clone(),
                        exponent: exponent.clone(),
                    });
                }
                KeyInfoClause::KeyName(_) | KeyInfoClause::EncryptedKey(_) => {}
            }
        }
    }
    keys
}

/// Looks up an issuer and extracts its trusted signing keys.
#[must_use]
pub fn trusted_keys_for(
    store: &dyn TrustStore,
    issuer: &str,
    specs: &[Box<dyn CertificateSpecification>],
) -> Vec<PublicKey> {
    let keys = extract_trusted_keys(&store.key_descriptors(issuer), specs);
    debug!(issuer = %issuer, key_count = keys.len(), "Resolved trusted keys");
    keys
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use saml_crypto::pem_to_der;

    use super::*;
    use crate::signature::{ThumbprintSpecification, ValidityPeriodSpecification};
    use crate::types::KeyInfo;

    const IDP_CERT: &str = include_str!("../../tests/fixtures/idp-cert.pem");
    const OTHER_CERT: &str = include_str!("../../tests/fixtures/other-cert.pem");
    const EXPIRED_CERT: &str = include_str!("../../tests/fixtures/expired-cert.pem");

    fn der(pem: &str) -> Vec<u8> {
        pem_to_der(pem, "CERTIFICATE").unwrap()
    }

    fn in_2030() -> Box<dyn CertificateSpecification> {
        Box::new(ValidityPeriodSpecification::at(
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn static_store_lookup() {
        let store = StaticTrustStore::new().with_signing_certificate("urn:idp", der(IDP_CERT));
        assert_eq!(store.key_descriptors("urn:idp").len(), 1);
        assert!(store.key_descriptors("urn:other").is_empty());

        let store: StaticTrustStore =
            [("urn:idp".to_string(), vec![KeyDescriptor::signing_certificate(der(IDP_CERT))])]
                .into_iter()
                .collect();
        assert_eq!(store.key_descriptors("urn:idp").len(), 1);
    }

    #[test]
    fn extracts_keys_from_all_clauses() {
        let descriptors = vec![
            KeyDescriptor::signing_certificate(der(IDP_CERT)),
            KeyDescriptor {
                usage: None,
                key_info: KeyInfo {
                    clauses: vec![
                        KeyInfoClause::X509Data(vec![der(OTHER_CERT)]),
                        KeyInfoClause::RsaKeyValue {
                            modulus: vec![1, 2, 3],
                            exponent: vec![1, 0, 1],
                        },
                        KeyInfoClause::KeyName("k".to_string()),
                    ],
                },
            },
        ];
        assert_eq!(extract_trusted_keys(&descriptors, &[]).len(), 3);
    }

    #[test]
    fn skips_encryption_descriptors_and_bad_certificates() {
        let descriptors = vec![
            KeyDescriptor {
                usage: Some(KeyUse::Encryption),
                key_info: KeyInfo {
                    clauses: vec![KeyInfoClause::X509Data(vec![der(IDP_CERT)])],
                },
            },
            KeyDescriptor::signing_certificate(b"garbage".to_vec()),
        ];
        assert!(extract_trusted_keys(&descriptors, &[]).is_empty());
    }

    #[test]
    fn specifications_filter_certificates() {
        let descriptors = vec![
            KeyDescriptor::signing_certificate(der(IDP_CERT)),
            KeyDescriptor::signing_certificate(der(EXPIRED_CERT)),
            KeyDescriptor::signing_certificate(der(OTHER_CERT)),
        ];
        let idp = Certificate::from_pem(IDP_CERT).unwrap();

        let keys = extract_trusted_keys(&descriptors, &[in_2030()]);
        assert_eq!(keys.len(), 2);

        let specs: Vec<Box<dyn CertificateSpecification>> =
            vec![in_2030(), Box::new(ThumbprintSpecification::new([idp.thumbprint()]))];
        assert_eq!(extract_trusted_keys(&descriptors, &specs), vec![idp.public_key().clone()]);
    }
}
