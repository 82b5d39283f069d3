use der::Encode;
use der::asn1::BitString;
use x509_cert::certificate::CertificateInner;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use crate::cert::params::{DistinguishedName, ExtensionParam};
use crate::config::Digest;
use crate::error::{IssuanceError, Result};
use crate::key::KeyPair;
use crate::request::CertificateRequest;
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
///
/// Implementors supply their name, key and digest; signing and the end-entity
/// extension profile are provided.
pub trait Issuer {
    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> &DistinguishedName;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Digest used for the issuer's signatures.
    fn digest(&self) -> Digest;

    /// Key identifier placed in the AuthorityKeyIdentifier of issued certificates.
    fn key_identifier(&self) -> Result<Vec<u8>> {
        self.signing_key().public_key().key_identifier()
    }

    /// Builds and signs an end-entity certificate for `request` under `serial`.
    fn issue(&self, serial: u64, request: &CertificateRequest) -> Result<Certificate> {
        let mut extensions = vec![
            ExtensionParam::from_extension(BasicConstraints::end_entity(), true)?,
            ExtensionParam::from_extension(
                KeyUsage::for_client(&request.subject_public_key),
                true,
            )?,
        ];

        if !request.usages.is_empty() {
            extensions.push(ExtensionParam::from_extension(
                ExtendedKeyUsage {
                    usage: request.usages.clone(),
                },
                false,
            )?);
        }

        extensions.push(ExtensionParam::from_extension(
            SubjectKeyIdentifier(request.subject_public_key.key_identifier()?),
            false,
        )?);
        extensions.push(ExtensionParam::from_extension(
            AuthorityKeyIdentifier {
                key_identifier: self.key_identifier()?,
            },
            false,
        )?);

        let tbs = TbsCertificate {
            serial_number: serial,
            signature_algorithm: self.signing_key().signature_algorithm(self.digest()),
            issuer: self.issuer_name().clone(),
            validity: request.validity.clone(),
            subject: request.subject.clone(),
            subject_public_key: request.subject_public_key.clone(),
            extensions,
        };

        self.sign_tbs(&tbs)
    }

    /// Signs a prepared to-be-signed structure.
    ///
    /// The outer signature algorithm is always the one recorded in `tbs`, which must
    /// match the issuer's key.
    fn sign_tbs(&self, tbs: &TbsCertificate) -> Result<Certificate> {
        let expected = self.signing_key().signature_algorithm(self.digest());
        if tbs.signature_algorithm != expected {
            return Err(IssuanceError::SigningFailed(format!(
                "{:?} cannot be produced by a {} key",
                tbs.signature_algorithm,
                self.signing_key().algorithm()
            )));
        }

        let tbs_inner = tbs.to_tbs_certificate_inner()?;
        let tbs_der = tbs_inner
            .to_der()
            .map_err(|e| IssuanceError::SigningFailed(e.to_string()))?;
        let signature = self.signing_key().sign(&tbs_der, self.digest())?;

        let inner = CertificateInner {
            tbs_certificate: tbs_inner,
            signature_algorithm: tbs.signature_algorithm.into(),
            signature: BitString::from_bytes(&signature)
                .map_err(|e| IssuanceError::SigningFailed(e.to_string()))?,
        };

        Ok(Certificate { inner })
    }
}

/// Extensions of a self-signed root.
pub(crate) fn root_extensions(key: &KeyPair) -> Result<Vec<ExtensionParam>> {
    let key_id = key.public_key().key_identifier()?;

    Ok(vec![
        ExtensionParam::from_extension(BasicConstraints::leaf_issuing_ca(), true)?,
        ExtensionParam::from_extension(KeyUsage::for_ca(), true)?,
        ExtensionParam::from_extension(SubjectKeyIdentifier(key_id.clone()), false)?,
        ExtensionParam::from_extension(
            AuthorityKeyIdentifier {
                key_identifier: key_id,
            },
            false,
        )?,
    ])
}
