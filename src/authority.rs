//! The certificate authority: policy, serial allocation and signing.

use tracing::debug;

use crate::cert::Certificate;
use crate::cert::params::{DistinguishedName, Validity};
use crate::config::{Digest, KeyConfig};
use crate::error::{IssuanceError, Result};
use crate::issuer::{self, Issuer};
use crate::key::{EntropySource, KeyPair, PublicKey};
use crate::request::CertificateRequest;
use crate::store::CaStore;
use crate::tbs_certificate::TbsCertificate;

/// A CA backed by a [`CaStore`].
///
/// The signing key is read once at load and shared read-only by every `sign` call; the
/// only mutable state is the store's serial counter.
pub struct CertificateAuthority<S: CaStore> {
    store: S,
    key: KeyPair,
    certificate: Certificate,
    name: DistinguishedName,
    digest: Digest,
}

impl<S: CaStore> CertificateAuthority<S> {
    /// Loads the CA key and certificate from `store`.
    ///
    /// Fails with `InvalidConfig` if the certificate is not a CA certificate or does not
    /// belong to the key.
    pub fn load(store: S) -> Result<Self> {
        let key = store.load_ca_key()?;
        let certificate = store.load_ca_certificate()?;

        if certificate.public_key()? != *key.public_key() {
            return Err(IssuanceError::InvalidConfig(
                "CA certificate does not match the CA key".to_string(),
            ));
        }
        if !certificate.is_ca()? {
            return Err(IssuanceError::InvalidConfig(
                "CA certificate lacks the CA basic constraint".to_string(),
            ));
        }

        let name = certificate.subject()?;
        let digest = key.algorithm().default_digest();
        debug!(ca = %name.common_name, algorithm = %key.algorithm(), "certificate authority loaded");

        Ok(Self {
            store,
            key,
            certificate,
            name,
            digest,
        })
    }

    /// Signs with `digest` instead of the one matched to the CA key.
    pub fn with_digest(mut self, digest: Digest) -> Result<Self> {
        KeyConfig::new(self.key.algorithm(), digest)?;
        self.digest = digest;
        Ok(self)
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn public_key(&self) -> &PublicKey {
        self.key.public_key()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rejects validity windows that reach outside the CA certificate's own.
    pub fn check_policy(&self, validity: &Validity) -> Result<()> {
        let ca_validity = self.certificate.validity();
        if !ca_validity.contains(validity) {
            return Err(IssuanceError::PolicyViolation(format!(
                "requested validity {} .. {} is outside the CA validity {} .. {}",
                validity.not_before,
                validity.not_after,
                ca_validity.not_before,
                ca_validity.not_after
            )));
        }
        Ok(())
    }

    /// Issues a certificate for `request`.
    ///
    /// Policy is checked before a serial is allocated. Once allocated, a serial is
    /// consumed even if signing fails. The certificate is not recorded; callers hand it
    /// to [`record`](Self::record) once it has been delivered.
    pub fn sign(&self, request: &CertificateRequest) -> Result<Certificate> {
        CertificateRequest::check_subject(request.subject_identity(), &request.validity)?;
        self.check_policy(&request.validity)?;

        let serial = self.store.next_serial()?;
        let certificate = self.issue(serial, request).map_err(|e| match e {
            IssuanceError::SigningFailed(_) => e,
            other => IssuanceError::SigningFailed(other.to_string()),
        })?;

        debug!(serial, identity = %request.subject_identity(), "certificate signed");
        Ok(certificate)
    }

    /// Records a delivered certificate in the store's issued set.
    pub fn record(&self, certificate: &Certificate) -> Result<()> {
        self.store.record_issued_certificate(certificate)?;
        debug!(serial = certificate.serial()?, "certificate recorded");
        Ok(())
    }
}

impl<S: CaStore> Issuer for CertificateAuthority<S> {
    fn issuer_name(&self) -> &DistinguishedName {
        &self.name
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    fn digest(&self) -> Digest {
        self.digest
    }
}

struct SelfSigned<'a> {
    name: &'a DistinguishedName,
    key: &'a KeyPair,
    digest: Digest,
}

impl Issuer for SelfSigned<'_> {
    fn issuer_name(&self) -> &DistinguishedName {
        self.name
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }

    fn digest(&self) -> Digest {
        self.digest
    }
}

/// Generates a key and a self-signed root certificate for it.
///
/// The root's serial is random so it cannot collide with the small serials a fresh
/// store hands out under the same issuer name.
pub fn generate_root(
    config: &KeyConfig,
    subject: DistinguishedName,
    validity: Validity,
    entropy: &dyn EntropySource,
) -> Result<(KeyPair, Certificate)> {
    if !validity.is_ordered() {
        return Err(IssuanceError::InvalidArgument(
            "root validity window is inverted".to_string(),
        ));
    }
    subject.as_x509_name()?;

    let key = KeyPair::generate_with(config, entropy)?;

    let mut serial = [0u8; 8];
    entropy
        .fill(&mut serial)
        .map_err(|e| IssuanceError::KeyGenerationFailed(format!("entropy source: {e}")))?;
    let serial = (u64::from_be_bytes(serial) >> 1) | (1 << 62);

    let tbs = TbsCertificate {
        serial_number: serial,
        signature_algorithm: key.signature_algorithm(config.digest()),
        issuer: subject.clone(),
        validity,
        subject: subject.clone(),
        subject_public_key: key.public_key().clone(),
        extensions: issuer::root_extensions(&key)?,
    };

    let certificate = SelfSigned {
        name: &subject,
        key: &key,
        digest: config.digest(),
    }
    .sign_tbs(&tbs)?;

    debug!(ca = %subject.common_name, serial, "root certificate generated");
    Ok((key, certificate))
}
