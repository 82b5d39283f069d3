pub mod extensions;
pub mod params;

use const_oid::ObjectIdentifier;
use der::asn1::Any;
use der::{Decode, DecodePem, Encode, EncodePem};
use x509_cert::certificate::CertificateInner;

use crate::config::{Digest, KeyAlgorithm};
use crate::error::{IssuanceError, Result};
use crate::key::PublicKey;
use crate::tbs_certificate::TbsCertificate;
use extensions::{ExtendedKeyUsageOption, ToAndFromX509Extension};
use params::{DistinguishedName, Validity};

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption.
    Sha256WithRsa,
    /// SHA-384 with RSA encryption.
    Sha384WithRsa,
    /// SHA-512 with RSA encryption.
    Sha512WithRsa,
    /// ECDSA with SHA-256.
    EcdsaWithSha256,
    /// ECDSA with SHA-384.
    EcdsaWithSha384,
    /// ECDSA with SHA-512.
    EcdsaWithSha512,
    /// Pure Ed25519.
    Ed25519,
}

impl SignatureAlgorithm {
    /// The algorithm a key of type `key` produces when hashing with `digest`.
    pub fn for_key(key: KeyAlgorithm, digest: Digest) -> Self {
        match (key, digest) {
            (KeyAlgorithm::Rsa { .. }, Digest::Sha256) => Self::Sha256WithRsa,
            (KeyAlgorithm::Rsa { .. }, Digest::Sha384) => Self::Sha384WithRsa,
            (KeyAlgorithm::Rsa { .. }, Digest::Sha512) => Self::Sha512WithRsa,
            (KeyAlgorithm::Ec { .. }, Digest::Sha256) => Self::EcdsaWithSha256,
            (KeyAlgorithm::Ec { .. }, Digest::Sha384) => Self::EcdsaWithSha384,
            (KeyAlgorithm::Ec { .. }, Digest::Sha512) => Self::EcdsaWithSha512,
            (KeyAlgorithm::Ed25519, _) => Self::Ed25519,
        }
    }

    /// The digest hashed before signing, if the scheme uses a separate one.
    pub fn digest(&self) -> Option<Digest> {
        match self {
            Self::Sha256WithRsa | Self::EcdsaWithSha256 => Some(Digest::Sha256),
            Self::Sha384WithRsa | Self::EcdsaWithSha384 => Some(Digest::Sha384),
            Self::Sha512WithRsa | Self::EcdsaWithSha512 => Some(Digest::Sha512),
            Self::Ed25519 => None,
        }
    }

    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            Self::Sha256WithRsa | Self::Sha384WithRsa | Self::Sha512WithRsa
        )
    }

    pub fn is_ecdsa(&self) -> bool {
        matches!(
            self,
            Self::EcdsaWithSha256 | Self::EcdsaWithSha384 | Self::EcdsaWithSha512
        )
    }

    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            Self::Sha256WithRsa => const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            Self::Sha384WithRsa => const_oid::db::rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
            Self::Sha512WithRsa => const_oid::db::rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
            Self::EcdsaWithSha256 => const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
            Self::EcdsaWithSha384 => const_oid::db::rfc5912::ECDSA_WITH_SHA_384,
            Self::EcdsaWithSha512 => const_oid::db::rfc5912::ECDSA_WITH_SHA_512,
            Self::Ed25519 => const_oid::db::rfc8410::ID_ED_25519,
        }
    }

    pub fn from_oid(oid: ObjectIdentifier) -> Result<Self> {
        [
            Self::Sha256WithRsa,
            Self::Sha384WithRsa,
            Self::Sha512WithRsa,
            Self::EcdsaWithSha256,
            Self::EcdsaWithSha384,
            Self::EcdsaWithSha512,
            Self::Ed25519,
        ]
        .into_iter()
        .find(|alg| alg.oid() == oid)
        .ok_or_else(|| {
            IssuanceError::DecodingError(format!("Unsupported signature algorithm {oid}"))
        })
    }
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// RSA algorithms carry explicit NULL parameters (RFC 4055); ECDSA and Ed25519 omit them.
    fn from(value: SignatureAlgorithm) -> Self {
        x509_cert::spki::AlgorithmIdentifierOwned {
            oid: value.oid(),
            parameters: value.is_rsa().then(Any::null),
        }
    }
}

/// Represents an X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| IssuanceError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| IssuanceError::EncodingError(e.to_string()))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_der(der)?,
        })
    }

    pub fn from_pem(pem: impl AsRef<[u8]>) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_pem(pem)?,
        })
    }

    /// The serial number as an integer.
    pub fn serial(&self) -> Result<u64> {
        crate::tbs_certificate::serial_from_bytes(
            self.inner.tbs_certificate.serial_number.as_bytes(),
        )
    }

    /// The subject's common name.
    pub fn subject_identity(&self) -> Result<String> {
        Ok(self.subject()?.common_name)
    }

    /// The issuer's common name.
    pub fn issuer_identity(&self) -> Result<String> {
        Ok(self.issuer()?.common_name)
    }

    pub fn subject(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    pub fn validity(&self) -> Validity {
        let validity = &self.inner.tbs_certificate.validity;
        Validity {
            not_before: crate::tbs_certificate::from_x509_time(&validity.not_before),
            not_after: crate::tbs_certificate::from_x509_time(&validity.not_after),
        }
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_oid(self.inner.signature_algorithm.oid)
    }

    pub fn signature(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    /// Checks the certificate's signature against `issuer_key`.
    pub fn verify(&self, issuer_key: &PublicKey) -> Result<()> {
        let algorithm = self.signature_algorithm()?;
        let tbs = self.inner.tbs_certificate.to_der()?;
        issuer_key.verify(&tbs, self.signature(), &algorithm)
    }

    /// Decodes the to-be-signed portion.
    pub fn to_tbs(&self) -> Result<TbsCertificate> {
        TbsCertificate::from_tbs_certificate_inner(self.inner.tbs_certificate.clone())
    }

    /// Decodes the extension identified by `E::OID`, if present.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.inner
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == E::OID)
            .map(|ext| E::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()
    }

    pub fn is_ca(&self) -> Result<bool> {
        Ok(self
            .extension::<extensions::BasicConstraints>()?
            .is_some_and(|bc| bc.is_ca))
    }

    pub fn extended_key_usage(&self) -> Result<Vec<ExtendedKeyUsageOption>> {
        Ok(self
            .extension::<extensions::ExtendedKeyUsage>()?
            .map(|eku| eku.usage)
            .unwrap_or_default())
    }
}
