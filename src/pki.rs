use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rsa::pkcs1v15::{
    Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey,
};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha2::{Digest as _, Sha256, Sha384, Sha512};

use crate::cert::SignatureAlgorithm;
use crate::config::Digest;
use crate::error::{IssuanceError, Result};
use crate::key::{KeyPair, PublicKey, SecretKey};

fn signing_failed(err: impl std::fmt::Display) -> IssuanceError {
    IssuanceError::SigningFailed(err.to_string())
}

fn verification_failed(err: impl std::fmt::Display) -> IssuanceError {
    IssuanceError::VerificationFailed(err.to_string())
}

/// Hashes `data` with `digest` for the ECDSA prehash interfaces.
fn prehash(data: &[u8], digest: Digest) -> Vec<u8> {
    match digest {
        Digest::Sha256 => Sha256::digest(data).to_vec(),
        Digest::Sha384 => Sha384::digest(data).to_vec(),
        Digest::Sha512 => Sha512::digest(data).to_vec(),
    }
}

fn rsa_sign(private: &rsa::RsaPrivateKey, data: &[u8], digest: Digest) -> Result<Vec<u8>> {
    let private = private.clone();
    let signature = match digest {
        Digest::Sha256 => RsaSigningKey::<Sha256>::new(private).try_sign(data),
        Digest::Sha384 => RsaSigningKey::<Sha384>::new(private).try_sign(data),
        Digest::Sha512 => RsaSigningKey::<Sha512>::new(private).try_sign(data),
    }
    .map_err(signing_failed)?;
    Ok(signature.to_vec())
}

/// Signs `data` with `key`, producing the signature encoding X.509 expects:
/// raw PKCS#1 v1.5 for RSA, a DER `Ecdsa-Sig-Value` for ECDSA, and 64 raw bytes for Ed25519.
pub fn sign_data(data: &[u8], key: &KeyPair, digest: Digest) -> Result<Vec<u8>> {
    match key.secret() {
        SecretKey::Rsa(private) => rsa_sign(private, data, digest),
        SecretKey::EcdsaP256(signing_key) => {
            let signature: p256::ecdsa::Signature = signing_key
                .sign_prehash(&prehash(data, digest))
                .map_err(signing_failed)?;
            Ok(signature.to_der().as_bytes().to_vec())
        }
        SecretKey::EcdsaP384(signing_key) => {
            let signature: p384::ecdsa::Signature = signing_key
                .sign_prehash(&prehash(data, digest))
                .map_err(signing_failed)?;
            Ok(signature.to_der().as_bytes().to_vec())
        }
        SecretKey::Ed25519(signing_key) => {
            let signature = signing_key.try_sign(data).map_err(signing_failed)?;
            Ok(signature.to_bytes().to_vec())
        }
    }
}

fn rsa_verify(
    public: &rsa::RsaPublicKey,
    data: &[u8],
    signature: &[u8],
    digest: Digest,
) -> Result<()> {
    let signature = RsaSignature::try_from(signature).map_err(verification_failed)?;
    let public = public.clone();
    match digest {
        Digest::Sha256 => RsaVerifyingKey::<Sha256>::new(public).verify(data, &signature),
        Digest::Sha384 => RsaVerifyingKey::<Sha384>::new(public).verify(data, &signature),
        Digest::Sha512 => RsaVerifyingKey::<Sha512>::new(public).verify(data, &signature),
    }
    .map_err(verification_failed)
}

/// Verifies a signature produced by [`sign_data`].
pub fn verify_signature(
    data: &[u8],
    signature: &[u8],
    key: &PublicKey,
    algorithm: &SignatureAlgorithm,
) -> Result<()> {
    match (key, algorithm.digest()) {
        (PublicKey::Rsa(public), Some(digest)) if algorithm.is_rsa() => {
            rsa_verify(public, data, signature, digest)
        }
        (PublicKey::EcdsaP256(verifying_key), Some(digest)) if algorithm.is_ecdsa() => {
            let signature =
                p256::ecdsa::Signature::from_der(signature).map_err(verification_failed)?;
            verifying_key
                .verify_prehash(&prehash(data, digest), &signature)
                .map_err(verification_failed)
        }
        (PublicKey::EcdsaP384(verifying_key), Some(digest)) if algorithm.is_ecdsa() => {
            let signature =
                p384::ecdsa::Signature::from_der(signature).map_err(verification_failed)?;
            verifying_key
                .verify_prehash(&prehash(data, digest), &signature)
                .map_err(verification_failed)
        }
        (PublicKey::Ed25519(verifying_key), None) => {
            let signature =
                ed25519_dalek::Signature::from_slice(signature).map_err(verification_failed)?;
            verifying_key
                .verify_strict(data, &signature)
                .map_err(verification_failed)
        }
        _ => Err(IssuanceError::VerificationFailed(format!(
            "{algorithm:?} does not match the key type"
        ))),
    }
}
