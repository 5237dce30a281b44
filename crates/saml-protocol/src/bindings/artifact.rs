//! HTTP-Artifact binding.
//!
//! The issuing side parks the message in the expiring store under its
//! artifact and hands the artifact to the browser. The relying side sends
//! an `ArtifactResolve` over the back channel and receives the message in
//! an `ArtifactResponse`. Each artifact resolves exactly once, and only for
//! the party it was issued to.

use std::sync::Arc;

use chrono::{Duration, Utc};
use saml_cache::ExpiringStore;
use saml_core::ValidatedConfig;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::error::{ReplayError, SamlError, SamlResult};
use crate::types::{ArtifactResolve, ArtifactResponse};
use crate::xml::parse_artifact_response;

const ARTIFACT_PREFIX: &str = "artifact:";

/// Issues and resolves artifacts.
#[derive(Clone)]
pub struct ArtifactBinding {
    store: Arc<dyn ExpiringStore>,
    lifetime: Duration,
}

impl std::fmt::Debug for ArtifactBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactBinding")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl ArtifactBinding {
    /// Creates a binding whose artifacts live for `lifetime`.
    pub fn new(store: Arc<dyn ExpiringStore>, lifetime: Duration) -> Self {
        Self { store, lifetime }
    }

    /// Creates a binding with the configured artifact lifetime.
    pub fn from_config(store: Arc<dyn ExpiringStore>, config: &ValidatedConfig) -> Self {
        Self::new(store, config.artifact_lifetime())
    }

    /// Parks `message_xml` for `recipient` and returns the artifact naming
    /// it.
    pub fn store(
        &self,
        source_id: &str,
        endpoint_index: i16,
        recipient: &str,
        message_xml: &str,
    ) -> SamlResult<Artifact> {
        if recipient.is_empty() || recipient.contains('\n') {
            return Err(SamlError::InvalidRequest(format!(
                "Invalid artifact recipient '{recipient}'"
            )));
        }
        let artifact = Artifact::new(endpoint_index, source_id);
        let expires_at = Utc::now()
            .checked_add_signed(self.lifetime)
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);

        let parked = format!("{recipient}\n{message_xml}");
        if !self
            .store
            .insert_if_absent(&artifact_key(&artifact), &parked, expires_at)?
        {
            return Err(SamlError::InvalidRequest(
                "Artifact message handle collision".to_string(),
            ));
        }
        debug!(source_id, endpoint_index, recipient, "Stored message for artifact");
        Ok(artifact)
    }

    /// Returns the message for `artifact` and forgets it.
    ///
    /// Unknown, expired and already resolved artifacts are a replay error,
    /// as is a `requester` other than the recipient the message was parked
    /// for. A rejected requester does not use the artifact up.
    pub fn resolve(&self, artifact: &str, requester: &str) -> SamlResult<String> {
        let parsed: Artifact = artifact.parse()?;
        let key = artifact_key(&parsed);

        let Some(parked) = self.store.get(&key)? else {
            warn!(requester, "Unknown, expired or already resolved artifact");
            return Err(ReplayError::UnknownArtifact.into());
        };
        let (recipient, _) = split_parked(&parked)?;
        if recipient != requester {
            warn!(recipient, requester, "Artifact resolution by another party");
            return Err(ReplayError::ArtifactRecipientMismatch {
                expected: recipient.to_string(),
                actual: requester.to_string(),
            }
            .into());
        }

        match self.store.take(&key)? {
            Some(parked) => {
                info!(endpoint_index = parsed.endpoint_index, requester, "Artifact resolved");
                split_parked(&parked).map(|(_, message)| message.to_string())
            }
            None => {
                warn!(requester, "Artifact resolved concurrently");
                Err(ReplayError::UnknownArtifact.into())
            }
        }
    }

    /// Answers an `ArtifactResolve` request.
    ///
    /// An unresolvable artifact, or one requested by a party it was not
    /// issued to, yields a successful response without a message, as the
    /// protocol requires.
    pub fn respond(&self, resolve: &ArtifactResolve, issuer: &str) -> SamlResult<ArtifactResponse> {
        let requester = resolve.issuer.as_ref().map(|i| i.value.as_str()).unwrap_or_default();
        let message = match self.resolve(&resolve.artifact, requester) {
            Ok(message) => Some(message),
            Err(SamlError::Replay(
                ReplayError::UnknownArtifact | ReplayError::ArtifactRecipientMismatch { .. },
            )) => None,
            Err(e) => return Err(e),
        };
        Ok(Self::build_artifact_response(resolve, issuer, message))
    }

    /// Builds the back-channel request for `artifact`.
    #[must_use]
    pub fn build_artifact_resolve(artifact: &str, issuer: &str, destination: &str) -> ArtifactResolve {
        ArtifactResolve::new(issuer, artifact).with_destination(destination)
    }

    /// Builds the answer to `resolve` carrying `message`.
    #[must_use]
    pub fn build_artifact_response(
        resolve: &ArtifactResolve,
        issuer: &str,
        message: Option<String>,
    ) -> ArtifactResponse {
        ArtifactResponse::answering(issuer, resolve.id.clone(), message)
    }

    /// Returns true if `artifact` was issued by `entity_id`.
    ///
    /// Malformed artifacts never match.
    #[must_use]
    pub fn source_matches(artifact: &str, entity_id: &str) -> bool {
        artifact
            .parse::<Artifact>()
            .is_ok_and(|a| a.source_matches(entity_id))
    }

    /// Extracts the message from an `ArtifactResponse` answering `resolve`.
    ///
    /// The response's own signature is checked separately with
    /// [`check_artifact_signature`](crate::signature::check_artifact_signature).
    pub fn extract_message(response_xml: &str, resolve: &ArtifactResolve) -> SamlResult<String> {
        let response = parse_artifact_response(response_xml)?;
        if response.in_response_to.as_deref() != Some(resolve.id.as_str()) {
            return Err(ReplayError::InResponseToMismatch {
                expected: resolve.id.clone(),
                actual: response.in_response_to.unwrap_or_default(),
            }
            .into());
        }
        if !response.status.is_success() {
            return Err(SamlError::Status {
                code: response.status.status_code.value.clone(),
                sub_code: response.status.sub_code().map(str::to_string),
                message: response.status.status_message.clone(),
            });
        }
        response.message.ok_or_else(|| ReplayError::UnknownArtifact.into())
    }
}

fn split_parked(parked: &str) -> SamlResult<(&str, &str)> {
    parked
        .split_once('\n')
        .ok_or_else(|| SamlError::InvalidRequest("Corrupt artifact store entry".to_string()))
}

fn artifact_key(artifact: &Artifact) -> String {
    format!("{ARTIFACT_PREFIX}{}", artifact.encode())
}

#[cfg(test)]
mod tests {
    use saml_cache::MemoryStore;

    use super::*;
    use crate::xml::write_artifact_response;

    const IDP: &str = "https://idp.example.org";
    const SP: &str = "https://sp.example.org";
    const MESSAGE: &str = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r1" Version="2.0"/>"#;

    fn binding() -> ArtifactBinding {
        ArtifactBinding::new(Arc::new(MemoryStore::new()), Duration::minutes(5))
    }

    #[test]
    fn resolves_exactly_once() {
        let binding = binding();
        let artifact = binding.store(IDP, 1, SP, MESSAGE).unwrap().encode();

        assert!(ArtifactBinding::source_matches(&artifact, IDP));
        assert_eq!(binding.resolve(&artifact, SP).unwrap(), MESSAGE);
        assert!(matches!(
            binding.resolve(&artifact, SP),
            Err(SamlError::Replay(ReplayError::UnknownArtifact))
        ));
    }

    #[test]
    fn expired_artifacts_are_unknown() {
        let binding = ArtifactBinding::new(Arc::new(MemoryStore::new()), Duration::seconds(-1));
        let artifact = binding.store(IDP, 0, SP, MESSAGE).unwrap().encode();
        assert!(matches!(
            binding.resolve(&artifact, SP),
            Err(SamlError::Replay(ReplayError::UnknownArtifact))
        ));
    }

    #[test]
    fn malformed_artifacts() {
        assert!(matches!(binding().resolve("nope", SP), Err(SamlError::Format(_))));
        assert!(matches!(binding().store(IDP, 0, "", MESSAGE), Err(SamlError::InvalidRequest(_))));
        assert!(!ArtifactBinding::source_matches("nope", IDP));
    }

    #[test]
    fn back_channel_exchange() {
        let idp = binding();
        let artifact = idp.store(IDP, 0, SP, MESSAGE).unwrap().encode();

        let resolve = ArtifactBinding::build_artifact_resolve(&artifact, SP, IDP);
        assert_eq!(resolve.destination.as_deref(), Some(IDP));

        let response = idp.respond(&resolve, IDP).unwrap();
        assert_eq!(response.in_response_to.as_deref(), Some(resolve.id.as_str()));
        let xml = write_artifact_response(&response);
        assert_eq!(ArtifactBinding::extract_message(&xml, &resolve).unwrap(), MESSAGE);

        let again = idp.respond(&resolve, IDP).unwrap();
        assert!(again.status.is_success());
        assert!(again.message.is_none());
        let xml = write_artifact_response(&again);
        assert!(matches!(
            ArtifactBinding::extract_message(&xml, &resolve),
            Err(SamlError::Replay(ReplayError::UnknownArtifact))
        ));
    }

    #[test]
    fn response_must_answer_the_resolve() {
        let idp = binding();
        let artifact = idp.store(IDP, 0, SP, MESSAGE).unwrap().encode();
        let resolve = ArtifactBinding::build_artifact_resolve(&artifact, SP, IDP);
        let other = ArtifactBinding::build_artifact_resolve(&artifact, SP, IDP);

        let xml = write_artifact_response(&idp.respond(&resolve, IDP).unwrap());
        assert!(matches!(
            ArtifactBinding::extract_message(&xml, &other),
            Err(SamlError::Replay(ReplayError::InResponseToMismatch { .. }))
        ));
    }

    #[test]
    fn only_the_recipient_can_resolve() {
        let idp = binding();
        let artifact = idp.store(IDP, 0, SP, MESSAGE).unwrap().encode();

        match idp.resolve(&artifact, "https://eve.example.org") {
            Err(SamlError::Replay(ReplayError::ArtifactRecipientMismatch { expected, actual })) => {
                assert_eq!(expected, SP);
                assert_eq!(actual, "https://eve.example.org");
            }
            other => panic!("expected a recipient mismatch, got {other:?}"),
        }

        let stolen = ArtifactBinding::build_artifact_resolve(&artifact, "https://eve.example.org", IDP);
        let answer = idp.respond(&stolen, IDP).unwrap();
        assert!(answer.status.is_success());
        assert!(answer.message.is_none());

        assert_eq!(idp.resolve(&artifact, SP).unwrap(), MESSAGE);
    }
}
