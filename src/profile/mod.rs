//! Export of an issued key and certificate in the formats clients install.

mod eap_metadata;
pub mod mobileconfig;
mod pem;
mod pkcs12;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use zeroize::Zeroizing;

use crate::cert::Certificate;
use crate::config::KeyConfig;
use crate::error::{IssuanceError, Result};
use crate::key::{EntropySource, KeyPair, OsEntropy};
pub use mobileconfig::{EapMethod, NetworkProfile};

/// Random bytes behind a generated profile passphrase.
const GENERATED_PASSPHRASE_BYTES: usize = 18;

/// Output format tag, without format-specific parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileFormat {
    Pem,
    Pkcs12,
    MobileConfig,
    EapMetadata,
}

impl ProfileFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ProfileFormat::Pem => "application/x-pem-file",
            ProfileFormat::Pkcs12 => "application/x-pkcs12",
            ProfileFormat::MobileConfig => "application/x-apple-aspen-config",
            ProfileFormat::EapMetadata => "application/eap-config",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            ProfileFormat::Pem => "pem",
            ProfileFormat::Pkcs12 => "p12",
            ProfileFormat::MobileConfig => "mobileconfig",
            ProfileFormat::EapMetadata => "eap-config",
        }
    }
}

impl fmt::Display for ProfileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileFormat::Pem => "pem",
            ProfileFormat::Pkcs12 => "pkcs12",
            ProfileFormat::MobileConfig => "mobileconfig",
            ProfileFormat::EapMetadata => "eap-metadata",
        };
        f.write_str(name)
    }
}

impl FromStr for ProfileFormat {
    type Err = IssuanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pem" => Ok(ProfileFormat::Pem),
            "pkcs12" | "p12" => Ok(ProfileFormat::Pkcs12),
            "mobileconfig" => Ok(ProfileFormat::MobileConfig),
            "eap-metadata" | "eap-config" => Ok(ProfileFormat::EapMetadata),
            _ => Err(IssuanceError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// A requested export, with the metadata its format needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportFormat {
    Pem,
    Pkcs12,
    MobileConfig(NetworkProfile),
    EapMetadata(NetworkProfile),
}

impl ExportFormat {
    pub fn tag(&self) -> ProfileFormat {
        match self {
            ExportFormat::Pem => ProfileFormat::Pem,
            ExportFormat::Pkcs12 => ProfileFormat::Pkcs12,
            ExportFormat::MobileConfig(_) => ProfileFormat::MobileConfig,
            ExportFormat::EapMetadata(_) => ProfileFormat::EapMetadata,
        }
    }
}

/// Exported key material ready for delivery.
///
/// The bytes always contain a private key, so they are wiped on drop, never cloned and
/// never printed by `Debug`.
pub struct ExportedProfile {
    format: ProfileFormat,
    bytes: Zeroizing<Vec<u8>>,
    passphrase: Option<Zeroizing<String>>,
}

impl ExportedProfile {
    pub fn format(&self) -> ProfileFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Zeroizing<Vec<u8>> {
        self.bytes
    }

    /// The passphrase protecting the payload, if one was used.
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_ref().map(|p| p.as_str())
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn file_extension(&self) -> &'static str {
        self.format.file_extension()
    }
}

impl fmt::Debug for ExportedProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedProfile")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Converts a key pair and its certificate into an [`ExportedProfile`].
pub struct ProfileExporter {
    key_config: KeyConfig,
    allow_empty_pkcs12_passphrase: bool,
    ca_certificate: Option<Certificate>,
    entropy: Arc<dyn EntropySource>,
}

impl ProfileExporter {
    /// An exporter encrypting keys with `key_config`'s PBKDF2 work factor.
    pub fn new(key_config: KeyConfig) -> Self {
        Self {
            key_config,
            allow_empty_pkcs12_passphrase: false,
            ca_certificate: None,
            entropy: Arc::new(OsEntropy),
        }
    }

    /// CA certificate added to PKCS#12 archives and used as the network trust anchor.
    pub fn with_ca_certificate(mut self, certificate: Certificate) -> Self {
        self.ca_certificate = Some(certificate);
        self
    }

    pub fn allow_empty_pkcs12_passphrase(mut self, allow: bool) -> Self {
        self.allow_empty_pkcs12_passphrase = allow;
        self
    }

    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    /// Every check `export` makes that needs neither key nor randomness.
    pub fn preflight(&self, format: &ExportFormat, passphrase: Option<&str>) -> Result<()> {
        match format {
            ExportFormat::Pem => Ok(()),
            ExportFormat::Pkcs12 => {
                if normalize(passphrase).is_none() && !self.allow_empty_pkcs12_passphrase {
                    return Err(IssuanceError::InvalidArgument(
                        "PKCS#12 export requires a passphrase".to_string(),
                    ));
                }
                Ok(())
            }
            ExportFormat::MobileConfig(network) | ExportFormat::EapMetadata(network) => {
                network.validate()?;
                self.required_ca_certificate()?;
                Ok(())
            }
        }
    }

    fn required_ca_certificate(&self) -> Result<&Certificate> {
        self.ca_certificate.as_ref().ok_or_else(|| {
            IssuanceError::InvalidConfig("profile export needs the CA certificate".to_string())
        })
    }

    /// Encodes `key_pair` and `certificate` as `format`.
    ///
    /// An absent passphrase is the same as an empty one. PEM keys are encrypted only when
    /// a passphrase is given. Network profiles without a passphrase get a generated one,
    /// embedded in the document so it installs without prompting.
    pub fn export(
        &self,
        key_pair: &KeyPair,
        certificate: &Certificate,
        format: &ExportFormat,
        passphrase: Option<&str>,
    ) -> Result<ExportedProfile> {
        self.preflight(format, passphrase)?;
        let passphrase = normalize(passphrase);

        let (bytes, used) = match format {
            ExportFormat::Pem => {
                let bytes = pem::build_pem_bundle(
                    key_pair,
                    certificate,
                    passphrase,
                    &self.key_config,
                    self.entropy.as_ref(),
                )?;
                (bytes, passphrase.map(|p| Zeroizing::new(p.to_string())))
            }
            ExportFormat::Pkcs12 => {
                let password = passphrase.unwrap_or_default();
                let bytes = pkcs12::build_pkcs12(
                    key_pair,
                    certificate,
                    self.ca_certificate.as_ref(),
                    password,
                    &certificate.subject_identity()?,
                )?;
                (bytes, passphrase.map(|p| Zeroizing::new(p.to_string())))
            }
            ExportFormat::MobileConfig(network) => {
                let credential = self.network_credential(key_pair, certificate, passphrase)?;
                let identity = certificate.subject_identity()?;
                let contents = mobileconfig::MobileConfigContents {
                    network,
                    identity: &identity,
                    pkcs12: &credential.archive,
                    pkcs12_password: credential.embedded(),
                    ca_certificate_der: &credential.ca_der,
                };
                let document =
                    mobileconfig::build_mobileconfig(&contents, self.entropy.as_ref())?;
                (Zeroizing::new(document), Some(credential.password))
            }
            ExportFormat::EapMetadata(network) => {
                let credential = self.network_credential(key_pair, certificate, passphrase)?;
                let contents = eap_metadata::EapMetadataContents {
                    network,
                    pkcs12: &credential.archive,
                    pkcs12_password: credential.embedded(),
                    ca_certificate_der: &credential.ca_der,
                };
                let document = eap_metadata::build_eap_metadata(&contents)?;
                (Zeroizing::new(document), Some(credential.password))
            }
        };

        Ok(ExportedProfile {
            format: format.tag(),
            bytes,
            passphrase: used,
        })
    }

    /// The PKCS#12 identity carried inside a network profile.
    ///
    /// Without a caller passphrase a random one protects the archive and is embedded.
    fn network_credential(
        &self,
        key_pair: &KeyPair,
        certificate: &Certificate,
        passphrase: Option<&str>,
    ) -> Result<NetworkCredential> {
        let ca_certificate = self.required_ca_certificate()?;
        let (password, embed) = match passphrase {
            Some(p) => (Zeroizing::new(p.to_string()), false),
            None => (self.generate_passphrase()?, true),
        };
        let archive = pkcs12::build_pkcs12(
            key_pair,
            certificate,
            Some(ca_certificate),
            &password,
            &certificate.subject_identity()?,
        )?;
        Ok(NetworkCredential {
            archive,
            password,
            embed,
            ca_der: ca_certificate.to_der()?,
        })
    }

    fn generate_passphrase(&self) -> Result<Zeroizing<String>> {
        let mut raw = Zeroizing::new([0u8; GENERATED_PASSPHRASE_BYTES]);
        self.entropy
            .fill(&mut raw[..])
            .map_err(|e| IssuanceError::ExportFailed(format!("entropy source: {e}")))?;
        Ok(Zeroizing::new(URL_SAFE_NO_PAD.encode(&raw[..])))
    }
}

struct NetworkCredential {
    archive: Zeroizing<Vec<u8>>,
    password: Zeroizing<String>,
    embed: bool,
    ca_der: Vec<u8>,
}

impl NetworkCredential {
    fn embedded(&self) -> Option<&str> {
        self.embed.then_some(self.password.as_str())
    }
}

fn normalize(passphrase: Option<&str>) -> Option<&str> {
    passphrase.filter(|p| !p.is_empty())
}
