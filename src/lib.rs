//! # IssueKit - Certificate Issuance in Pure Rust
//!
//! IssueKit is the core of a certificate enrollment service, built entirely with RustCrypto
//! libraries and free of ring and OpenSSL (except for interoperability tests). Given an
//! authenticated identity it generates a fresh key pair, has a certificate authority sign a
//! client certificate for it, and exports the result in a format a device can install.
//!
//! ## Supported Key Types
//!
//! - **RSA**: 2048 to 8192-bit keys, PKCS#1 v1.5 signatures
//! - **ECDSA**: P-256 and P-384 curves
//! - **Ed25519**: Edwards curve digital signature algorithm
//!
//! ## Export Formats
//!
//! - **PEM**: certificate followed by the private key, optionally encrypted PKCS#8
//! - **PKCS#12**: key, certificate and CA certificate in a passphrase protected archive
//! - **Configuration profile**: an Apple `.mobileconfig` carrying the PKCS#12 identity, the CA
//!   trust anchor and an EAP-TLS Wi-Fi network
//! - **EAP metadata**: an `eap-config` document with the same network and PKCS#12 identity
//!
//! ## Key Features
//!
//! - **No silent fallbacks**: every primitive failure is returned with its diagnostic
//! - **Fail fast**: identity, format and policy checks run before any key is generated
//! - **Unique serials**: allocation goes through a [`store::CaStore`] and is safe under
//!   concurrent issuance
//! - **Secrets stay secret**: private keys and exports are wiped on drop and redacted from
//!   `Debug` output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use issuekit::{
//!     authority::{CertificateAuthority, generate_root},
//!     cert::params::{DistinguishedName, Validity},
//!     config::{IssuanceConfig, KeyConfig},
//!     key::OsEntropy,
//!     profile::ExportFormat,
//!     service::IssuanceService,
//!     store::MemoryStore,
//! };
//!
//! # fn main() -> Result<(), issuekit::error::IssuanceError> {
//! // Bootstrap a root CA
//! let ca_name = DistinguishedName::builder()
//!     .common_name("Example Wi-Fi CA")
//!     .organization("Example Corp")
//!     .build();
//! let (ca_key, ca_cert) = generate_root(
//!     &KeyConfig::default(),
//!     ca_name,
//!     Validity::for_days(3650)?,
//!     &OsEntropy,
//! )?;
//!
//! let authority = CertificateAuthority::load(MemoryStore::new(&ca_key, ca_cert)?)?;
//! let service = IssuanceService::new(authority, IssuanceConfig::default())?;
//!
//! // Issue a certificate for an authenticated user
//! let profile = service.issue("alice", ExportFormat::Pem, None)?;
//! println!("{} bytes of {}", profile.bytes().len(), profile.mime_type());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`error::IssuanceError`], whose variants tell the caller which
//! stage rejected the request:
//!
//! ```rust
//! use issuekit::{error::{ImportFailure, IssuanceError}, key::KeyPair};
//!
//! match KeyPair::import(b"invalid key data", None) {
//!     Ok(_) => println!("Key imported successfully"),
//!     Err(IssuanceError::KeyImportFailed(ImportFailure::IncorrectPassphrase)) => {
//!         println!("Wrong passphrase")
//!     }
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`config`]: Key and service configuration, loadable from TOML
//! - [`key`]: Key generation, import/export, and entropy sources
//! - [`request`]: Binding an identity and validity window to a public key
//! - [`authority`]: Policy, serial allocation, signing, and root bootstrap
//! - [`store`]: Persistence of the CA key, certificate and serial counter
//! - [`profile`]: PEM, PKCS#12, configuration profile and EAP metadata export
//! - [`service`]: The issuance pipeline with its deadline
//! - [`cert`]: Certificate encoding/decoding and extensions
//! - [`issuer`]: The signing side of certificate construction
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod authority;
pub mod cert;
pub mod config;
pub mod error;
pub mod issuer;
pub mod key;
pub mod pem_utils;
mod pki;
pub mod profile;
pub mod request;
pub mod service;
pub mod store;
pub mod tbs_certificate;
