//! Binding a subject identity and validity window to a public key.

use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::cert::params::{DistinguishedName, Validity};
use crate::error::{IssuanceError, Result};
use crate::key::{KeyPair, PublicKey};

/// Upper bound for a common name (X.520 `ub-common-name`).
pub const MAX_IDENTITY_LEN: usize = 64;

/// A signable request: the subject's public key, identity and validity window.
///
/// # Fields
/// * `subject` - The subject distinguished name; its common name is the identity.
/// * `subject_public_key` - The key the certificate will certify.
/// * `validity` - The requested validity window, always ordered.
/// * `usages` - Extended key usages to request.
#[derive(Clone, Debug)]
pub struct CertificateRequest {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    pub validity: Validity,
    pub usages: Vec<ExtendedKeyUsageOption>,
}

impl CertificateRequest {
    /// Builds a client-authentication request for `identity`.
    ///
    /// Returns `InvalidSubject` when the identity is empty, too long or contains control
    /// characters, or when `not_after` does not come after `not_before`.
    pub fn build(key_pair: &KeyPair, identity: &str, validity: Validity) -> Result<Self> {
        Self::check_subject(identity, &validity)?;

        Ok(Self {
            subject: DistinguishedName::builder().common_name(identity).build(),
            subject_public_key: key_pair.public_key().clone(),
            validity,
            usages: vec![ExtendedKeyUsageOption::ClientAuth],
        })
    }

    /// The checks `build` applies, without a key.
    pub fn check_subject(identity: &str, validity: &Validity) -> Result<()> {
        if identity.is_empty() {
            return Err(IssuanceError::InvalidSubject(
                "identity must not be empty".to_string(),
            ));
        }
        if identity.chars().count() > MAX_IDENTITY_LEN {
            return Err(IssuanceError::InvalidSubject(format!(
                "identity exceeds {MAX_IDENTITY_LEN} characters"
            )));
        }
        if identity.chars().any(char::is_control) {
            return Err(IssuanceError::InvalidSubject(
                "identity contains control characters".to_string(),
            ));
        }
        if !validity.is_ordered() {
            return Err(IssuanceError::InvalidSubject(format!(
                "validity window is inverted: not_before {} is not before not_after {}",
                validity.not_before, validity.not_after
            )));
        }
        Ok(())
    }

    /// The subject's common name.
    pub fn subject_identity(&self) -> &str {
        &self.subject.common_name
    }

    /// Replaces the requested extended key usages.
    pub fn with_usages(mut self, usages: Vec<ExtendedKeyUsageOption>) -> Self {
        self.usages = usages;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_rejects_inverted_window() {
        let ordered = Validity::for_days(1).unwrap();
        let inverted = Validity::new(ordered.not_after, ordered.not_before);
        assert!(matches!(
            CertificateRequest::check_subject("alice", &inverted),
            Err(IssuanceError::InvalidSubject(_))
        ));
    }

    #[test]
    fn test_unrepresentable_validity_is_an_error() {
        for days in [0, -1, i64::MAX, 4_000_000_000] {
            assert!(
                matches!(Validity::for_days(days), Err(IssuanceError::InvalidArgument(_))),
                "{days}"
            );
        }
        assert!(Validity::for_days(36_525).unwrap().is_ordered());
    }

    #[test]
    fn test_rejects_empty_window() {
        let validity = Validity::for_days(1).unwrap();
        let empty = Validity::new(validity.not_before, validity.not_before);
        assert!(CertificateRequest::check_subject("alice", &empty).is_err());
    }

    #[test]
    fn test_identity_rules() {
        let validity = Validity::for_days(1).unwrap();
        assert!(CertificateRequest::check_subject("alice", &validity).is_ok());
        assert!(CertificateRequest::check_subject("", &validity).is_err());
        assert!(CertificateRequest::check_subject("bob\nsmith", &validity).is_err());
        assert!(CertificateRequest::check_subject(&"a".repeat(65), &validity).is_err());
        assert!(CertificateRequest::check_subject("CN=x, O=y", &validity).is_ok());
        assert!(
            CertificateRequest::check_subject(
                "alice",
                &Validity::new(validity.not_before, validity.not_before + Duration::seconds(1))
            )
            .is_ok()
        );
    }
}
