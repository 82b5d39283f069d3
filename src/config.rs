//! Key and issuance configuration.
//!
//! Every configuration value is validated when it is constructed or deserialized, so a
//! [`KeyConfig`] that exists is always usable by the key and signing code.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::cert::params::Validity;
use crate::error::{IssuanceError, Result};
use crate::profile::NetworkProfile;

/// Smallest accepted RSA modulus.
pub const MIN_RSA_BITS: usize = 2048;
/// Largest accepted RSA modulus.
pub const MAX_RSA_BITS: usize = 8192;
/// Lower bound for the PBKDF2 work factor of encrypted key exports.
pub const MIN_PBKDF2_ITERATIONS: u32 = 1_000;
/// PBKDF2 work factor used unless configured otherwise.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
/// Longest certificate lifetime an issuance configuration accepts, about a century.
pub const MAX_VALIDITY_DAYS: u32 = 36_525;

/// Message digest used for signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Digest {
    Sha256,
    Sha384,
    Sha512,
}

impl Digest {
    /// Output size in bits.
    pub fn bits(self) -> usize {
        match self {
            Digest::Sha256 => 256,
            Digest::Sha384 => 384,
            Digest::Sha512 => 512,
        }
    }
}

/// Supported NIST curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    /// Field size in bits.
    pub fn bits(self) -> usize {
        match self {
            EcCurve::P256 => 256,
            EcCurve::P384 => 384,
        }
    }
}

/// Key algorithm and its size parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    Ec { curve: EcCurve },
    Ed25519,
}

impl KeyAlgorithm {
    /// The digest matched to the key's security level.
    pub fn default_digest(self) -> Digest {
        match self {
            KeyAlgorithm::Rsa { .. } => Digest::Sha256,
            KeyAlgorithm::Ec { curve: EcCurve::P256 } => Digest::Sha256,
            KeyAlgorithm::Ec { curve: EcCurve::P384 } => Digest::Sha384,
            KeyAlgorithm::Ed25519 => Digest::Sha512,
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "RSA-{bits}"),
            KeyAlgorithm::Ec { curve: EcCurve::P256 } => write!(f, "ECDSA P-256"),
            KeyAlgorithm::Ec { curve: EcCurve::P384 } => write!(f, "ECDSA P-384"),
            KeyAlgorithm::Ed25519 => write!(f, "Ed25519"),
        }
    }
}

/// Immutable description of the keys to generate and how to protect them on export.
///
/// Invalid combinations are rejected by every constructor, so `validate` on an existing
/// value always succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawKeyConfig")]
pub struct KeyConfig {
    algorithm: KeyAlgorithm,
    digest: Digest,
    pbkdf2_iterations: u32,
}

impl KeyConfig {
    /// Builds and validates a configuration.
    pub fn new(algorithm: KeyAlgorithm, digest: Digest) -> Result<Self> {
        let config = Self {
            algorithm,
            digest,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        };
        config.validate()?;
        Ok(config)
    }

    /// RSA keys of `bits` length.
    pub fn rsa(bits: usize, digest: Digest) -> Result<Self> {
        Self::new(KeyAlgorithm::Rsa { bits }, digest)
    }

    /// ECDSA keys on `curve`.
    pub fn ec(curve: EcCurve, digest: Digest) -> Result<Self> {
        Self::new(KeyAlgorithm::Ec { curve }, digest)
    }

    /// Ed25519 keys. The digest is fixed to SHA-512, which the scheme uses internally.
    pub fn ed25519() -> Self {
        Self {
            algorithm: KeyAlgorithm::Ed25519,
            digest: Digest::Sha512,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }

    /// Sets the PBKDF2 iteration count used by encrypted private key exports.
    pub fn with_pbkdf2_iterations(mut self, iterations: u32) -> Result<Self> {
        self.pbkdf2_iterations = iterations;
        self.validate()?;
        Ok(self)
    }

    /// Checks the algorithm, size and digest combination.
    pub fn validate(&self) -> Result<()> {
        match self.algorithm {
            KeyAlgorithm::Rsa { bits } => {
                if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
                    return Err(IssuanceError::InvalidConfig(format!(
                        "RSA key size {bits} outside {MIN_RSA_BITS}..={MAX_RSA_BITS}"
                    )));
                }
                if bits % 8 != 0 {
                    return Err(IssuanceError::InvalidConfig(format!(
                        "RSA key size {bits} is not a whole number of bytes"
                    )));
                }
            }
            KeyAlgorithm::Ec { curve } => {
                if self.digest.bits() < curve.bits() {
                    return Err(IssuanceError::InvalidConfig(format!(
                        "{:?} is weaker than curve {:?}",
                        self.digest, curve
                    )));
                }
            }
            KeyAlgorithm::Ed25519 => {
                if self.digest != Digest::Sha512 {
                    return Err(IssuanceError::InvalidConfig(
                        "Ed25519 signs with SHA-512 only".to_string(),
                    ));
                }
            }
        }

        if self.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(IssuanceError::InvalidConfig(format!(
                "PBKDF2 iteration count {} below minimum {MIN_PBKDF2_ITERATIONS}",
                self.pbkdf2_iterations
            )));
        }
        Ok(())
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn pbkdf2_iterations(&self) -> u32 {
        self.pbkdf2_iterations
    }
}

impl Default for KeyConfig {
    /// ECDSA P-256 with SHA-256.
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Ec {
                curve: EcCurve::P256,
            },
            digest: Digest::Sha256,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AlgorithmName {
    Rsa,
    Ec,
    Ed25519,
}

/// Wire shape of a key configuration before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawKeyConfig {
    algorithm: AlgorithmName,
    bits: Option<usize>,
    curve: Option<EcCurve>,
    digest: Option<Digest>,
    pbkdf2_iterations: Option<u32>,
}

impl TryFrom<RawKeyConfig> for KeyConfig {
    type Error = IssuanceError;

    fn try_from(raw: RawKeyConfig) -> Result<Self> {
        let algorithm = match raw.algorithm {
            AlgorithmName::Rsa => KeyAlgorithm::Rsa {
                bits: raw.bits.unwrap_or(MIN_RSA_BITS),
            },
            AlgorithmName::Ec => KeyAlgorithm::Ec {
                curve: raw.curve.unwrap_or(EcCurve::P256),
            },
            AlgorithmName::Ed25519 => KeyAlgorithm::Ed25519,
        };

        let config = Self {
            algorithm,
            digest: raw.digest.unwrap_or_else(|| algorithm.default_digest()),
            pbkdf2_iterations: raw.pbkdf2_iterations.unwrap_or(DEFAULT_PBKDF2_ITERATIONS),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Service-level configuration, loadable from TOML.
///
/// ```toml
/// validity_days = 365
/// deadline_ms = 30000
///
/// [key]
/// algorithm = "ec"
/// curve = "p256"
///
/// [network]
/// ssid = "eduroam"
/// server_names = ["radius.example.org"]
/// identifier = "org.example.wifi"
/// display_name = "Example Wi-Fi"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IssuanceConfig {
    /// Keys generated for subjects.
    pub key: KeyConfig,
    /// Lifetime of issued certificates.
    pub validity_days: u32,
    /// Overall deadline for one issuance.
    pub deadline_ms: u64,
    /// Whether PKCS#12 archives may be written without a passphrase.
    pub allow_empty_pkcs12_passphrase: bool,
    /// Network metadata used for configuration profiles.
    pub network: Option<NetworkProfile>,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            key: KeyConfig::default(),
            validity_days: 365,
            deadline_ms: 30_000,
            allow_empty_pkcs12_passphrase: false,
            network: None,
        }
    }
}

impl IssuanceConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| IssuanceError::InvalidConfig(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            IssuanceError::InvalidConfig(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.key.validate()?;
        if self.validity_days == 0 {
            return Err(IssuanceError::InvalidConfig(
                "validity_days must be at least 1".to_string(),
            ));
        }
        if self.validity_days > MAX_VALIDITY_DAYS {
            return Err(IssuanceError::InvalidConfig(format!(
                "validity_days must be at most {MAX_VALIDITY_DAYS}"
            )));
        }
        if self.deadline_ms == 0 {
            return Err(IssuanceError::InvalidConfig(
                "deadline_ms must be at least 1".to_string(),
            ));
        }
        if let Some(network) = &self.network {
            network
                .validate()
                .map_err(|e| IssuanceError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Validity window for a certificate issued now.
    pub fn validity(&self) -> Result<Validity> {
        Validity::for_days(i64::from(self.validity_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_short_rsa() {
        assert!(matches!(
            KeyConfig::rsa(1024, Digest::Sha256),
            Err(IssuanceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_weak_digest_for_curve() {
        assert!(KeyConfig::ec(EcCurve::P384, Digest::Sha256).is_err());
        assert!(KeyConfig::ec(EcCurve::P384, Digest::Sha384).is_ok());
        assert!(KeyConfig::ec(EcCurve::P256, Digest::Sha512).is_ok());
    }

    #[test]
    fn ed25519_requires_sha512() {
        assert!(KeyConfig::new(KeyAlgorithm::Ed25519, Digest::Sha256).is_err());
        assert!(KeyConfig::ed25519().validate().is_ok());
    }

    #[test]
    fn rejects_low_iteration_count() {
        assert!(KeyConfig::default().with_pbkdf2_iterations(10).is_err());
    }

    #[test]
    fn parses_toml() {
        let config = IssuanceConfig::from_toml_str(
            r#"
            validity_days = 30
            allow_empty_pkcs12_passphrase = true

            [key]
            algorithm = "rsa"
            bits = 3072
            digest = "sha384"
            pbkdf2_iterations = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.validity_days, 30);
        assert_eq!(config.deadline_ms, 30_000);
        assert!(config.allow_empty_pkcs12_passphrase);
        assert_eq!(config.key.algorithm(), KeyAlgorithm::Rsa { bits: 3072 });
        assert_eq!(config.key.digest(), Digest::Sha384);
        assert_eq!(config.key.pbkdf2_iterations(), 2000);
    }

    #[test]
    fn toml_key_defaults_follow_curve() {
        let config = IssuanceConfig::from_toml_str(
            r#"
            [key]
            algorithm = "ec"
            curve = "p384"
            "#,
        )
        .unwrap();
        assert_eq!(config.key.digest(), Digest::Sha384);
    }

    #[test]
    fn invalid_toml_key_is_rejected_at_load() {
        let err = IssuanceConfig::from_toml_str(
            r#"
            [key]
            algorithm = "rsa"
            bits = 512
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, IssuanceError::InvalidConfig(_)));
    }

    #[test]
    fn zero_deadline_is_rejected() {
        assert!(IssuanceConfig::from_toml_str("deadline_ms = 0").is_err());
    }

    #[test]
    fn oversized_validity_is_rejected() {
        let err = IssuanceConfig::from_toml_str("validity_days = 4000000").unwrap_err();
        assert!(matches!(err, IssuanceError::InvalidConfig(_)));

        let config = IssuanceConfig {
            validity_days: MAX_VALIDITY_DAYS,
            ..IssuanceConfig::default()
        };
        config.validate().unwrap();
        let validity = config.validity().unwrap();
        assert!(validity.is_ordered());
    }

    proptest! {
        #[test]
        fn rsa_sizes_validate_by_range(bits in 0usize..10_000) {
            let accepted = KeyConfig::rsa(bits, Digest::Sha256).is_ok();
            let expected = (MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) && bits % 8 == 0;
            prop_assert_eq!(accepted, expected);
        }
    }
}
