//! One-call issuance: key generation, signing and export under a deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::authority::CertificateAuthority;
use crate::cert::Certificate;
use crate::cert::params::Validity;
use crate::config::IssuanceConfig;
use crate::error::{IssuanceError, Result};
use crate::key::{EntropySource, KeyPair, OsEntropy};
use crate::profile::{ExportFormat, ExportedProfile, ProfileExporter, ProfileFormat};
use crate::request::CertificateRequest;
use crate::store::CaStore;

/// Issues certificates for authenticated identities.
///
/// Cheap to clone; clones share the authority. `issue` may be called from any number
/// of threads at once.
pub struct IssuanceService<S: CaStore + 'static> {
    inner: Arc<Inner<S>>,
}

impl<S: CaStore + 'static> Clone for IssuanceService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S: CaStore> {
    authority: CertificateAuthority<S>,
    exporter: ProfileExporter,
    config: IssuanceConfig,
    entropy: Arc<dyn EntropySource>,
}

impl<S: CaStore + 'static> IssuanceService<S> {
    pub fn new(authority: CertificateAuthority<S>, config: IssuanceConfig) -> Result<Self> {
        Self::with_entropy(authority, config, Arc::new(OsEntropy))
    }

    /// A service drawing all randomness from `entropy`.
    pub fn with_entropy(
        authority: CertificateAuthority<S>,
        config: IssuanceConfig,
        entropy: Arc<dyn EntropySource>,
    ) -> Result<Self> {
        config.validate()?;

        let exporter = ProfileExporter::new(config.key.clone())
            .with_ca_certificate(authority.certificate().clone())
            .allow_empty_pkcs12_passphrase(config.allow_empty_pkcs12_passphrase)
            .with_entropy(Arc::clone(&entropy));

        Ok(Self {
            inner: Arc::new(Inner {
                authority,
                exporter,
                config,
                entropy,
            }),
        })
    }

    pub fn authority(&self) -> &CertificateAuthority<S> {
        &self.inner.authority
    }

    /// Issues a fresh key and certificate for `identity` and exports them as `format`.
    ///
    /// Subject, format and policy checks run before any key is generated. The rest runs
    /// on a worker thread bounded by the configured deadline; on expiry this returns
    /// `Timeout` and the worker stops at its next stage. The certificate is recorded as
    /// issued only when the exported profile is returned to the caller. Failures are
    /// returned as-is and never retried, since a retry would mint another key and serial.
    pub fn issue(
        &self,
        identity: &str,
        format: ExportFormat,
        passphrase: Option<&str>,
    ) -> Result<ExportedProfile> {
        let tag = format.tag();
        info!(identity, format = %tag, "issuance started");

        match self.run(identity, format, passphrase) {
            Ok((profile, serial)) => {
                info!(identity, serial, format = %tag, "issuance finished");
                Ok(profile)
            }
            Err(e) => {
                warn!(identity, format = %tag, error = %e, "issuance failed");
                Err(e)
            }
        }
    }

    /// Like [`issue`](Self::issue), selecting the format by name.
    ///
    /// `mobileconfig` and `eap-metadata` use the network from the service configuration.
    pub fn issue_named(
        &self,
        identity: &str,
        format: &str,
        passphrase: Option<&str>,
    ) -> Result<ExportedProfile> {
        let tag = format.parse::<ProfileFormat>()?;
        let network = || {
            self.inner.config.network.clone().ok_or_else(|| {
                IssuanceError::UnsupportedFormat(format!("{tag}: no network is configured"))
            })
        };
        let format = match tag {
            ProfileFormat::Pem => ExportFormat::Pem,
            ProfileFormat::Pkcs12 => ExportFormat::Pkcs12,
            ProfileFormat::MobileConfig => ExportFormat::MobileConfig(network()?),
            ProfileFormat::EapMetadata => ExportFormat::EapMetadata(network()?),
        };
        self.issue(identity, format, passphrase)
    }

    fn run(
        &self,
        identity: &str,
        format: ExportFormat,
        passphrase: Option<&str>,
    ) -> Result<(ExportedProfile, u64)> {
        let validity = self.inner.config.validity()?;

        CertificateRequest::check_subject(identity, &validity)?;
        self.inner.exporter.preflight(&format, passphrase)?;
        self.inner.authority.check_policy(&validity)?;

        let deadline = self.inner.config.deadline();
        let cancelled = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::sync_channel(1);

        let inner = Arc::clone(&self.inner);
        let worker_cancelled = Arc::clone(&cancelled);
        let identity_owned = identity.to_string();
        let passphrase = passphrase.map(|p| Zeroizing::new(p.to_string()));

        thread::Builder::new()
            .name("issuance".to_string())
            .spawn(move || {
                let result = inner.pipeline(
                    &identity_owned,
                    &format,
                    passphrase.as_ref().map(|p| p.as_str()),
                    validity,
                    &worker_cancelled,
                );
                // The caller is gone after a timeout; the result is dropped and wiped.
                let _ = sender.send(result);
            })
            .map_err(|e| IssuanceError::Worker(e.to_string()))?;

        let (profile, certificate) = match receiver.recv_timeout(deadline) {
            Ok(result) => result?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::Release);
                return Err(IssuanceError::Timeout(deadline));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(IssuanceError::Worker(
                    "worker exited without a result".to_string(),
                ));
            }
        };

        self.inner.authority.record(&certificate)?;
        Ok((profile, certificate.serial()?))
    }
}

impl<S: CaStore> Inner<S> {
    fn pipeline(
        &self,
        identity: &str,
        format: &ExportFormat,
        passphrase: Option<&str>,
        validity: Validity,
        cancelled: &AtomicBool,
    ) -> Result<(ExportedProfile, Certificate)> {
        let checkpoint = |stage: &str| {
            if cancelled.load(Ordering::Acquire) {
                debug!(identity, stage, "issuance cancelled");
                return Err(IssuanceError::Timeout(self.config.deadline()));
            }
            debug!(identity, stage, "issuance stage");
            Ok(())
        };

        checkpoint("generate")?;
        let key_pair = KeyPair::generate_with(&self.config.key, self.entropy.as_ref())?;

        checkpoint("sign")?;
        let request = CertificateRequest::build(&key_pair, identity, validity)?;
        let certificate = self.authority.sign(&request)?;

        checkpoint("export")?;
        let profile = self
            .exporter
            .export(&key_pair, &certificate, format, passphrase)?;

        Ok((profile, certificate))
    }
}
