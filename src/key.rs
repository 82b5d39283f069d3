//! Key pairs: generation, import and export.
//!
//! A [`KeyPair`] owns its private key exclusively. The underlying RustCrypto key types
//! zeroize their secret material on drop, and every export returns a [`Zeroizing`]
//! buffer, so nothing secret outlives the value that holds it. Private keys are never
//! written by `Debug`.

use std::fmt;

use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::pkcs5::pbes2;
use pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey,
    EncryptedPrivateKeyInfo, LineEnding, PrivateKeyInfo, SecretDocument,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_core::{OsRng, RngCore};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::{Digest as _, Sha1};
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use zeroize::Zeroizing;

use crate::cert::SignatureAlgorithm;
use crate::config::{Digest, EcCurve, KeyAlgorithm, KeyConfig};
use crate::error::{ImportFailure, IssuanceError, Result};
use crate::pem_utils;

const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
const ENCRYPTED_PRIVATE_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";
const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
const EC_PRIVATE_KEY_LABEL: &str = "EC PRIVATE KEY";
const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

const SECP_256_R_1: ObjectIdentifier = const_oid::db::rfc5912::SECP_256_R_1;
const SECP_384_R_1: ObjectIdentifier = const_oid::db::rfc5912::SECP_384_R_1;

/// A source of random bytes that reports failure instead of panicking.
///
/// Key generation and encrypted exports draw all their randomness through this trait.
pub trait EntropySource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand_core::Error>;
}

/// Entropy from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand_core::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

/// Seeds a CSPRNG from `entropy`, so a failing source surfaces as an error before any
/// primitive runs.
pub(crate) fn seeded_rng(
    entropy: &dyn EntropySource,
) -> std::result::Result<StdRng, rand_core::Error> {
    let mut seed = Zeroizing::new([0u8; 32]);
    entropy.fill(&mut seed[..])?;
    Ok(StdRng::from_seed(*seed))
}

pub(crate) enum SecretKey {
    Rsa(Box<RsaPrivateKey>),
    EcdsaP256(P256SigningKey),
    EcdsaP384(P384SigningKey),
    Ed25519(Ed25519SigningKey),
}

/// A private key together with its public half.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
    public_der: Vec<u8>,
}

impl KeyPair {
    /// Generate a key pair using operating system entropy.
    pub fn generate(config: &KeyConfig) -> Result<Self> {
        Self::generate_with(config, &OsEntropy)
    }

    /// Generate a key pair drawing randomness from `entropy`.
    ///
    /// A failing entropy source or primitive yields `KeyGenerationFailed` with the
    /// underlying diagnostic; no fallback parameters are ever substituted.
    pub fn generate_with(config: &KeyConfig, entropy: &dyn EntropySource) -> Result<Self> {
        let mut rng = seeded_rng(entropy)
            .map_err(|e| IssuanceError::KeyGenerationFailed(format!("entropy source: {e}")))?;

        let secret = match config.algorithm() {
            KeyAlgorithm::Rsa { bits } => {
                let private = RsaPrivateKey::new(&mut rng, bits)
                    .map_err(|e| IssuanceError::KeyGenerationFailed(e.to_string()))?;
                SecretKey::Rsa(Box::new(private))
            }
            KeyAlgorithm::Ec {
                curve: EcCurve::P256,
            } => SecretKey::EcdsaP256(P256SigningKey::random(&mut rng)),
            KeyAlgorithm::Ec {
                curve: EcCurve::P384,
            } => SecretKey::EcdsaP384(P384SigningKey::random(&mut rng)),
            KeyAlgorithm::Ed25519 => SecretKey::Ed25519(Ed25519SigningKey::generate(&mut rng)),
        };

        Self::from_secret(secret).map_err(|e| IssuanceError::KeyGenerationFailed(e.to_string()))
    }

    /// Import an existing private key.
    ///
    /// Accepts PKCS#8 (plain or encrypted), PKCS#1 RSA and SEC1 EC keys, as PEM or DER.
    /// An absent passphrase is the same as an empty one. A passphrase given for an
    /// unencrypted key is ignored.
    pub fn import(material: &[u8], passphrase: Option<&str>) -> Result<Self> {
        let passphrase = passphrase.unwrap_or_default();

        let secret = if looks_like_pem(material) {
            decode_pem(material, passphrase)?
        } else {
            decode_der(material, passphrase)?
        };

        Self::from_secret(secret)
    }

    fn from_secret(secret: SecretKey) -> Result<Self> {
        let public = match &secret {
            SecretKey::Rsa(private) => PublicKey::Rsa(RsaPublicKey::from(&**private)),
            SecretKey::EcdsaP256(signing_key) => PublicKey::EcdsaP256(*signing_key.verifying_key()),
            SecretKey::EcdsaP384(signing_key) => PublicKey::EcdsaP384(*signing_key.verifying_key()),
            SecretKey::Ed25519(signing_key) => PublicKey::Ed25519(signing_key.verifying_key()),
        };
        let public_der = public.to_der()?;
        Ok(Self {
            secret,
            public,
            public_der,
        })
    }

    /// The SubjectPublicKeyInfo as PEM.
    pub fn export_public(&self) -> String {
        pem_utils::der_to_pem(&self.public_der, PUBLIC_KEY_LABEL)
    }

    /// The SubjectPublicKeyInfo as DER.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_der
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match &self.secret {
            SecretKey::Rsa(private) => KeyAlgorithm::Rsa {
                bits: rsa::traits::PublicKeyParts::size(&**private) * 8,
            },
            SecretKey::EcdsaP256(_) => KeyAlgorithm::Ec {
                curve: EcCurve::P256,
            },
            SecretKey::EcdsaP384(_) => KeyAlgorithm::Ec {
                curve: EcCurve::P384,
            },
            SecretKey::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    /// The X.509 signature algorithm this key produces with `digest`.
    pub fn signature_algorithm(&self, digest: Digest) -> SignatureAlgorithm {
        SignatureAlgorithm::for_key(self.algorithm(), digest)
    }

    /// Sign `data`, returning the signature in its X.509 encoding.
    pub fn sign(&self, data: &[u8], digest: Digest) -> Result<Vec<u8>> {
        crate::pki::sign_data(data, self, digest)
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// The unencrypted PKCS#8 DER encoding.
    ///
    /// The caller must treat the returned bytes as secret.
    pub fn export_private_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = self.to_pkcs8()?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// The unencrypted PKCS#8 PEM encoding.
    ///
    /// The caller must treat the returned text as secret and keep it out of logs.
    pub fn export_private_unencrypted(&self) -> Result<Zeroizing<String>> {
        self.to_pkcs8()?
            .to_pem(PRIVATE_KEY_LABEL, LineEnding::LF)
            .map_err(|e| IssuanceError::ExportFailed(e.to_string()))
    }

    /// The PKCS#8 PEM encoding, encrypted with `passphrase` (PBES2, PBKDF2-HMAC-SHA256,
    /// AES-256-CBC) using operating system entropy for salt and IV.
    pub fn export_private_encrypted(
        &self,
        passphrase: &str,
        config: &KeyConfig,
    ) -> Result<Zeroizing<String>> {
        self.export_private_encrypted_with(passphrase, config, &OsEntropy)
    }

    /// Like [`export_private_encrypted`](Self::export_private_encrypted), drawing salt and IV
    /// from `entropy`.
    ///
    /// An empty passphrase is rejected with `InvalidArgument` before any randomness is drawn.
    pub fn export_private_encrypted_with(
        &self,
        passphrase: &str,
        config: &KeyConfig,
        entropy: &dyn EntropySource,
    ) -> Result<Zeroizing<String>> {
        if passphrase.is_empty() {
            return Err(IssuanceError::InvalidArgument(
                "Passphrase cannot be empty".to_string(),
            ));
        }

        let mut salt = [0u8; 16];
        let mut iv = [0u8; 16];
        entropy
            .fill(&mut salt)
            .and_then(|_| entropy.fill(&mut iv))
            .map_err(|e| IssuanceError::ExportFailed(format!("entropy source: {e}")))?;

        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(
            config.pbkdf2_iterations(),
            &salt,
            &iv,
        )
        .map_err(|e| IssuanceError::ExportFailed(e.to_string()))?;

        let plain = self.to_pkcs8()?;
        let info = PrivateKeyInfo::try_from(plain.as_bytes())
            .map_err(|e| IssuanceError::ExportFailed(e.to_string()))?;
        let encrypted = info
            .encrypt_with_params(params, passphrase)
            .map_err(|e| IssuanceError::ExportFailed(e.to_string()))?;

        encrypted
            .to_pem(ENCRYPTED_PRIVATE_KEY_LABEL, LineEnding::LF)
            .map_err(|e| IssuanceError::ExportFailed(e.to_string()))
    }

    fn to_pkcs8(&self) -> Result<SecretDocument> {
        match &self.secret {
            SecretKey::Rsa(private) => private.to_pkcs8_der(),
            SecretKey::EcdsaP256(signing_key) => signing_key.to_pkcs8_der(),
            SecretKey::EcdsaP384(signing_key) => signing_key.to_pkcs8_der(),
            SecretKey::Ed25519(signing_key) => signing_key.to_pkcs8_der(),
        }
        .map_err(|e| IssuanceError::ExportFailed(e.to_string()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm().to_string())
            .field("private", &"<redacted>")
            .finish()
    }
}

fn looks_like_pem(material: &[u8]) -> bool {
    material.trim_ascii_start().starts_with(b"-----BEGIN ")
}

fn malformed(err: impl fmt::Display) -> ImportFailure {
    ImportFailure::Malformed(err.to_string())
}

fn decode_pem(material: &[u8], passphrase: &str) -> std::result::Result<SecretKey, ImportFailure> {
    let block = pem::parse(material).map_err(malformed)?;
    if block.headers().get("Proc-Type").is_some() {
        return Err(ImportFailure::UnsupportedAlgorithm(
            "legacy PEM encryption (Proc-Type header)".to_string(),
        ));
    }

    let label = block.tag().to_string();
    let der = Zeroizing::new(block.into_contents());

    match label.as_str() {
        PRIVATE_KEY_LABEL => decode_pkcs8(&der),
        ENCRYPTED_PRIVATE_KEY_LABEL => {
            let decrypted = decrypt_pkcs8(&der, passphrase)?;
            decode_pkcs8(decrypted.as_bytes())
        }
        RSA_PRIVATE_KEY_LABEL => RsaPrivateKey::from_pkcs1_der(&der)
            .map(|private| SecretKey::Rsa(Box::new(private)))
            .map_err(malformed),
        EC_PRIVATE_KEY_LABEL => decode_sec1(&der),
        other => Err(ImportFailure::Malformed(format!(
            "unexpected PEM label '{other}'"
        ))),
    }
}

fn decode_der(material: &[u8], passphrase: &str) -> std::result::Result<SecretKey, ImportFailure> {
    if PrivateKeyInfo::try_from(material).is_ok() {
        return decode_pkcs8(material);
    }
    if EncryptedPrivateKeyInfo::try_from(material).is_ok() {
        let decrypted = decrypt_pkcs8(material, passphrase)?;
        return decode_pkcs8(decrypted.as_bytes());
    }
    if let Ok(private) = RsaPrivateKey::from_pkcs1_der(material) {
        return Ok(SecretKey::Rsa(Box::new(private)));
    }
    decode_sec1(material)
        .map_err(|_| ImportFailure::Malformed("unrecognized private key encoding".to_string()))
}

fn decrypt_pkcs8(der: &[u8], passphrase: &str) -> std::result::Result<SecretDocument, ImportFailure> {
    if passphrase.is_empty() {
        return Err(ImportFailure::PassphraseRequired);
    }

    let info = EncryptedPrivateKeyInfo::try_from(der).map_err(malformed)?;
    let decrypted = match info.decrypt(passphrase) {
        Ok(document) => document,
        Err(pkcs8::Error::EncryptedPrivateKey(pkcs8::pkcs5::Error::DecryptFailed)) => {
            return Err(ImportFailure::IncorrectPassphrase);
        }
        Err(pkcs8::Error::EncryptedPrivateKey(e)) => {
            return Err(ImportFailure::UnsupportedAlgorithm(e.to_string()));
        }
        // The plaintext is not DER: valid CBC padding over a wrong key's output.
        Err(_) => return Err(ImportFailure::IncorrectPassphrase),
    };

    // Well-formed DER that is still not a private key.
    if PrivateKeyInfo::try_from(decrypted.as_bytes()).is_err() {
        return Err(ImportFailure::IncorrectPassphrase);
    }
    Ok(decrypted)
}

fn decode_pkcs8(der: &[u8]) -> std::result::Result<SecretKey, ImportFailure> {
    let info = PrivateKeyInfo::try_from(der).map_err(malformed)?;

    match info.algorithm.oid {
        const_oid::db::rfc5912::RSA_ENCRYPTION => RsaPrivateKey::from_pkcs8_der(der)
            .map(|private| SecretKey::Rsa(Box::new(private)))
            .map_err(malformed),
        const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
            let curve = info.algorithm.parameters_oid().map_err(malformed)?;
            match curve {
                SECP_256_R_1 => P256SigningKey::from_pkcs8_der(der)
                    .map(SecretKey::EcdsaP256)
                    .map_err(malformed),
                SECP_384_R_1 => P384SigningKey::from_pkcs8_der(der)
                    .map(SecretKey::EcdsaP384)
                    .map_err(malformed),
                other => Err(ImportFailure::UnsupportedAlgorithm(format!("curve {other}"))),
            }
        }
        const_oid::db::rfc8410::ID_ED_25519 => Ed25519SigningKey::from_pkcs8_der(der)
            .map(SecretKey::Ed25519)
            .map_err(malformed),
        other => Err(ImportFailure::UnsupportedAlgorithm(other.to_string())),
    }
}

fn decode_sec1(der: &[u8]) -> std::result::Result<SecretKey, ImportFailure> {
    if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
        return P256SigningKey::from_bytes(&secret.to_bytes())
            .map(SecretKey::EcdsaP256)
            .map_err(malformed);
    }
    if let Ok(secret) = p384::SecretKey::from_sec1_der(der) {
        return P384SigningKey::from_bytes(&secret.to_bytes())
            .map(SecretKey::EcdsaP384)
            .map_err(malformed);
    }
    Err(ImportFailure::Malformed(
        "not a P-256 or P-384 SEC1 key".to_string(),
    ))
}

/// Supported public key types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
    Ed25519(Ed25519VerifyingKey),
}

impl PublicKey {
    /// Copies the public half of `key_pair`.
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        key_pair.public_key().clone()
    }

    /// SubjectPublicKeyInfo DER.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            PublicKey::Rsa(public) => public.to_public_key_der(),
            PublicKey::EcdsaP256(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::EcdsaP384(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::Ed25519(verifying_key) => verifying_key.to_public_key_der(),
        }
        .map_err(|e| IssuanceError::EncodingError(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// SubjectPublicKeyInfo PEM.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, PUBLIC_KEY_LABEL))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let spki = SubjectPublicKeyInfoOwned::from_der(der)?;
        Self::from_x509spki(&spki)
    }

    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let der = pem_utils::pem_to_der_with_label(pem_str, PUBLIC_KEY_LABEL)?;
        Self::from_der(&der)
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_der(&self.to_der()?)?)
    }

    /// Decodes a public key from its X.509 SubjectPublicKeyInfo.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        let decoding = |e: pkcs8::spki::Error| IssuanceError::DecodingError(e.to_string());

        match spki.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => RsaPublicKey::from_public_key_der(&der)
                .map(PublicKey::Rsa)
                .map_err(decoding),
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| {
                        IssuanceError::DecodingError("EC key without curve parameters".to_string())
                    })?
                    .decode_as::<ObjectIdentifier>()?;
                match curve {
                    SECP_256_R_1 => P256VerifyingKey::from_public_key_der(&der)
                        .map(PublicKey::EcdsaP256)
                        .map_err(decoding),
                    SECP_384_R_1 => P384VerifyingKey::from_public_key_der(&der)
                        .map(PublicKey::EcdsaP384)
                        .map_err(decoding),
                    other => Err(IssuanceError::DecodingError(format!(
                        "Unsupported curve {other}"
                    ))),
                }
            }
            const_oid::db::rfc8410::ID_ED_25519 => Ed25519VerifyingKey::from_public_key_der(&der)
                .map(PublicKey::Ed25519)
                .map_err(decoding),
            other => Err(IssuanceError::DecodingError(format!(
                "Unsupported public key algorithm {other}"
            ))),
        }
    }

    /// SHA-1 over the subjectPublicKey bits (RFC 5280 section 4.2.1.2, method 1).
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_spki()?;
        Ok(Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec())
    }

    /// Verify `signature` over `data` made with `algorithm`.
    pub fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        algorithm: &SignatureAlgorithm,
    ) -> Result<()> {
        crate::pki::verify_signature(data, signature, self, algorithm)
    }
}
