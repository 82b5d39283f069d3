#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use issuekit::authority::{CertificateAuthority, generate_root};
use issuekit::cert::Certificate;
use issuekit::cert::params::{DistinguishedName, Validity};
use issuekit::config::{IssuanceConfig, KeyConfig};
use issuekit::key::{EntropySource, KeyPair, OsEntropy};
use issuekit::profile::NetworkProfile;
use issuekit::service::IssuanceService;
use issuekit::store::MemoryStore;

pub const CA_NAME: &str = "Test Wi-Fi CA";

/// P-256 with a low PBKDF2 work factor so encrypted exports stay fast.
pub fn fast_key_config() -> KeyConfig {
    KeyConfig::default().with_pbkdf2_iterations(2_000).unwrap()
}

/// Forwards to the OS and records every draw.
#[derive(Default)]
pub struct CountingEntropy {
    calls: AtomicUsize,
    bytes: AtomicUsize,
}

impl CountingEntropy {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bytes(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }
}

impl EntropySource for CountingEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(dest.len(), Ordering::SeqCst);
        OsEntropy.fill(dest)
    }
}

/// An exhausted entropy source.
pub struct FailingEntropy;

impl EntropySource for FailingEntropy {
    fn fill(&self, _dest: &mut [u8]) -> Result<(), rand_core::Error> {
        Err(rand_core::Error::new(std::io::Error::other(
            "entropy pool exhausted",
        )))
    }
}

/// Blocks every draw for a while.
pub struct SlowEntropy(pub Duration);

impl EntropySource for SlowEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        std::thread::sleep(self.0);
        OsEntropy.fill(dest)
    }
}

/// What [`LaterDraws`] does once its first draws are spent.
pub enum Then {
    Stall(Duration),
    Fail,
}

/// Serves the first `allowed` draws from the OS, then stalls or fails.
pub struct LaterDraws {
    allowed: usize,
    drawn: AtomicUsize,
    then: Then,
}

impl LaterDraws {
    pub fn new(allowed: usize, then: Then) -> Self {
        Self {
            allowed,
            drawn: AtomicUsize::new(0),
            then,
        }
    }
}

impl EntropySource for LaterDraws {
    fn fill(&self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        if self.drawn.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            match self.then {
                Then::Stall(delay) => std::thread::sleep(delay),
                Then::Fail => {
                    return Err(rand_core::Error::new(std::io::Error::other(
                        "entropy pool exhausted",
                    )));
                }
            }
        }
        OsEntropy.fill(dest)
    }
}

pub fn ca_name() -> DistinguishedName {
    DistinguishedName::builder()
        .common_name(CA_NAME)
        .organization("Example Org")
        .country("NL")
        .build()
}

/// A ten year P-256 root.
pub fn generate_ca() -> (KeyPair, Certificate) {
    generate_ca_with(&KeyConfig::default())
}

pub fn generate_ca_with(config: &KeyConfig) -> (KeyPair, Certificate) {
    generate_root(config, ca_name(), Validity::for_days(3650).unwrap(), &OsEntropy).unwrap()
}

pub fn memory_authority() -> CertificateAuthority<MemoryStore> {
    let (key, certificate) = generate_ca();
    CertificateAuthority::load(MemoryStore::new(&key, certificate).unwrap()).unwrap()
}

pub fn network() -> NetworkProfile {
    NetworkProfile::builder()
        .ssid("eduroam")
        .server_names(vec!["radius.example.org".to_string()])
        .identifier("org.example.wifi")
        .display_name("Example Wi-Fi")
        .organization("Example Org")
        .build()
}

pub fn service_config() -> IssuanceConfig {
    IssuanceConfig {
        key: fast_key_config(),
        network: Some(network()),
        ..IssuanceConfig::default()
    }
}

pub fn service() -> IssuanceService<MemoryStore> {
    IssuanceService::new(memory_authority(), service_config()).unwrap()
}

pub fn service_with(
    config: IssuanceConfig,
    entropy: Arc<dyn EntropySource>,
) -> IssuanceService<MemoryStore> {
    IssuanceService::with_entropy(memory_authority(), config, entropy).unwrap()
}

/// The PEM block labelled `label` in `bundle`.
pub fn pem_block(bundle: &[u8], label: &str) -> String {
    let blocks = pem::parse_many(bundle).unwrap();
    let block = blocks
        .into_iter()
        .find(|block| block.tag() == label)
        .unwrap_or_else(|| panic!("no {label} block"));
    pem::encode_config(
        &block,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}
