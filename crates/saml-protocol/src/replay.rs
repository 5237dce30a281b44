//! Anti-replay tracking.
//!
//! Two ledgers share one [`ExpiringStore`]:
//!
//! - outstanding requests, keyed by the caller's session or relay state, so
//!   that a response is only accepted in answer to a request we sent
//! - consumed assertion IDs, kept until the assertion would have expired
//!   anyway

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use saml_cache::ExpiringStore;
use saml_core::ValidatedConfig;
use tracing::{debug, warn};

use crate::error::ReplayError;

const REQUEST_PREFIX: &str = "request:";
const ASSERTION_PREFIX: &str = "assertion:";

/// Tracks outstanding request IDs and consumed assertions.
#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn ExpiringStore>,
    request_lifetime: Duration,
    clock_skew: Duration,
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("request_lifetime", &self.request_lifetime)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl ReplayGuard {
    /// Creates a guard over `store`.
    ///
    /// `request_lifetime` bounds how long a recorded request stays
    /// answerable, and how long an assertion without `NotOnOrAfter` is
    /// remembered.
    pub fn new(store: Arc<dyn ExpiringStore>, request_lifetime: Duration) -> Self {
        Self {
            store,
            request_lifetime,
            clock_skew: Duration::zero(),
        }
    }

    /// Creates a guard with the configured lifetimes.
    pub fn from_config(store: Arc<dyn ExpiringStore>, config: &ValidatedConfig) -> Self {
        Self::new(store, config.request_lifetime()).with_clock_skew(config.clock_skew())
    }

    /// Keeps consumed assertions for this long past their `NotOnOrAfter`,
    /// matching the skew the time check allows.
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Records the ID of a request sent under `state_key`.
    pub fn record_expected_in_response_to(
        &self,
        state_key: &str,
        request_id: &str,
    ) -> Result<(), ReplayError> {
        let expires_at = later_by(Utc::now(), self.request_lifetime);
        self.store
            .insert(&request_key(state_key), request_id, expires_at)?;
        debug!(state_key, request_id, "Recorded outstanding request");
        Ok(())
    }

    /// Checks a response's `InResponseTo` against the request recorded for
    /// `state_key` without consuming the record.
    ///
    /// Lets a consumer reject uncorrelated responses early while leaving
    /// the request answerable until the response has been authenticated.
    pub fn expect_in_response_to(
        &self,
        state_key: &str,
        in_response_to: Option<&str>,
    ) -> Result<(), ReplayError> {
        let actual = required(in_response_to)?;
        let expected = self.store.get(&request_key(state_key))?;
        matches_request(state_key, expected, actual)
    }

    /// Checks a response's `InResponseTo` against the request recorded for
    /// `state_key`.
    ///
    /// The recorded request is consumed, so a second response to the same
    /// request fails. Call this only once the response is trusted.
    pub fn check_in_response_to(
        &self,
        state_key: &str,
        in_response_to: Option<&str>,
    ) -> Result<(), ReplayError> {
        let actual = required(in_response_to)?;
        let expected = self.store.take(&request_key(state_key))?;
        matches_request(state_key, expected, actual)
    }

    /// Records an assertion as consumed, failing if it was consumed before.
    ///
    /// The record lives until `not_on_or_after` plus the clock skew, or for
    /// the request lifetime when the assertion has no expiry.
    pub fn check_one_time_use(
        &self,
        assertion_id: &str,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> Result<(), ReplayError> {
        let expires_at = match not_on_or_after {
            Some(instant) => later_by(instant, self.clock_skew),
            None => later_by(Utc::now(), self.request_lifetime),
        };

        let key = format!("{ASSERTION_PREFIX}{assertion_id}");
        if self.store.insert_if_absent(&key, "", expires_at)? {
            Ok(())
        } else {
            warn!(assertion_id, "Assertion replay detected");
            Err(ReplayError::AssertionReplayed {
                id: assertion_id.to_string(),
            })
        }
    }
}

fn required(in_response_to: Option<&str>) -> Result<&str, ReplayError> {
    match in_response_to {
        None => Err(ReplayError::MissingInResponseTo),
        Some("") => Err(ReplayError::EmptyInResponseTo),
        Some(actual) => Ok(actual),
    }
}

fn matches_request(state_key: &str, expected: Option<String>, actual: &str) -> Result<(), ReplayError> {
    let expected = expected.ok_or_else(|| {
        warn!(state_key, in_response_to = actual, "No outstanding request for response");
        ReplayError::NoExpectedRequest
    })?;

    if expected != actual {
        warn!(
            state_key,
            expected = %expected,
            actual,
            "InResponseTo does not match the outstanding request"
        );
        return Err(ReplayError::InResponseToMismatch {
            expected,
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn request_key(state_key: &str) -> String {
    format!("{REQUEST_PREFIX}{state_key}")
}

fn later_by(instant: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    instant.checked_add_signed(duration).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use saml_cache::{CacheError, CacheResult, MemoryStore};

    use super::*;

    fn guard() -> ReplayGuard {
        ReplayGuard::new(Arc::new(MemoryStore::new()), Duration::minutes(15))
    }

    #[test]
    fn in_response_to_matches_once() {
        let guard = guard();
        guard.record_expected_in_response_to("state-1", "_req1").unwrap();

        assert!(guard.check_in_response_to("state-1", Some("_req1")).is_ok());
        assert_eq!(
            guard.check_in_response_to("state-1", Some("_req1")),
            Err(ReplayError::NoExpectedRequest)
        );
    }

    #[test]
    fn expecting_leaves_the_request_outstanding() {
        let guard = guard();
        guard.record_expected_in_response_to("state-1", "_req1").unwrap();

        assert!(guard.expect_in_response_to("state-1", Some("_req1")).is_ok());
        assert!(guard.expect_in_response_to("state-1", Some("_req1")).is_ok());
        assert!(matches!(
            guard.expect_in_response_to("state-1", Some("_req2")),
            Err(ReplayError::InResponseToMismatch { .. })
        ));
        assert_eq!(
            guard.expect_in_response_to("state-1", Some("")),
            Err(ReplayError::EmptyInResponseTo)
        );
        assert!(guard.check_in_response_to("state-1", Some("_req1")).is_ok());
        assert_eq!(
            guard.expect_in_response_to("state-1", Some("_req1")),
            Err(ReplayError::NoExpectedRequest)
        );
    }

    #[test]
    fn in_response_to_failures() {
        let guard = guard();
        guard.record_expected_in_response_to("state-1", "_req1").unwrap();

        assert_eq!(
            guard.check_in_response_to("state-1", None),
            Err(ReplayError::MissingInResponseTo)
        );
        assert_eq!(
            guard.check_in_response_to("state-1", Some("")),
            Err(ReplayError::EmptyInResponseTo)
        );
        assert_eq!(
            guard.check_in_response_to("state-2", Some("_req1")),
            Err(ReplayError::NoExpectedRequest)
        );

        let err = guard.check_in_response_to("state-1", Some("_req2")).unwrap_err();
        assert_eq!(
            err,
            ReplayError::InResponseToMismatch {
                expected: "_req1".to_string(),
                actual: "_req2".to_string(),
            }
        );
        assert!(err.to_string().contains("_req1") && err.to_string().contains("_req2"));
    }

    #[test]
    fn expired_requests_are_forgotten() {
        let guard = ReplayGuard::new(Arc::new(MemoryStore::new()), Duration::seconds(-1));
        guard.record_expected_in_response_to("state-1", "_req1").unwrap();
        assert_eq!(
            guard.check_in_response_to("state-1", Some("_req1")),
            Err(ReplayError::NoExpectedRequest)
        );
    }

    #[test]
    fn one_time_use() {
        let guard = guard();
        let expiry = Some(Utc::now() + Duration::minutes(5));

        assert!(guard.check_one_time_use("_a1", expiry).is_ok());
        assert_eq!(
            guard.check_one_time_use("_a1", expiry),
            Err(ReplayError::AssertionReplayed { id: "_a1".to_string() })
        );
        assert!(guard.check_one_time_use("_a2", None).is_ok());
        assert!(guard.check_one_time_use("_a2", None).is_err());
    }

    #[test]
    fn consumed_assertions_outlive_skew() {
        let guard = guard().with_clock_skew(Duration::minutes(3));
        let just_expired = Some(Utc::now() - Duration::minutes(1));

        assert!(guard.check_one_time_use("_a1", just_expired).is_ok());
        assert!(guard.check_one_time_use("_a1", just_expired).is_err());
    }

    #[test]
    fn requests_and_assertions_do_not_collide() {
        let guard = guard();
        guard.record_expected_in_response_to("_x", "_x").unwrap();
        assert!(guard.check_one_time_use("_x", None).is_ok());
        assert!(guard.check_in_response_to("_x", Some("_x")).is_ok());
    }

    struct FailingStore;

    impl ExpiringStore for FailingStore {
        fn get(&self, _: &str) -> CacheResult<Option<String>> {
            Err(CacheError::Internal("down".to_string()))
        }
        fn insert(&self, _: &str, _: &str, _: DateTime<Utc>) -> CacheResult<()> {
            Err(CacheError::Internal("down".to_string()))
        }
        fn insert_if_absent(&self, _: &str, _: &str, _: DateTime<Utc>) -> CacheResult<bool> {
            Err(CacheError::Internal("down".to_string()))
        }
        fn take(&self, _: &str) -> CacheResult<Option<String>> {
            Err(CacheError::Internal("down".to_string()))
        }
        fn remove(&self, _: &str) -> CacheResult<()> {
            Err(CacheError::Internal("down".to_string()))
        }
        fn purge_expired(&self) -> CacheResult<usize> {
            Err(CacheError::Internal("down".to_string()))
        }
    }

    #[test]
    fn store_failures_reject() {
        let guard = ReplayGuard::new(Arc::new(FailingStore), Duration::minutes(15));
        assert!(matches!(
            guard.check_one_time_use("_a1", None),
            Err(ReplayError::Store(_))
        ));
        assert!(matches!(
            guard.check_in_response_to("state", Some("_r")),
            Err(ReplayError::Store(_))
        ));
    }
}
