use zeroize::Zeroizing;

use crate::cert::Certificate;
use crate::config::KeyConfig;
use crate::error::Result;
use crate::key::{EntropySource, KeyPair};

/// Certificate block followed by the private key block.
///
/// The key is encrypted PKCS#8 when `passphrase` is given, plain PKCS#8 otherwise.
pub(crate) fn build_pem_bundle(
    key_pair: &KeyPair,
    certificate: &Certificate,
    passphrase: Option<&str>,
    key_config: &KeyConfig,
    entropy: &dyn EntropySource,
) -> Result<Zeroizing<Vec<u8>>> {
    let key_pem = match passphrase {
        Some(passphrase) => {
            key_pair.export_private_encrypted_with(passphrase, key_config, entropy)?
        }
        None => key_pair.export_private_unencrypted()?,
    };

    let mut bundle = Zeroizing::new(certificate.to_pem()?.into_bytes());
    bundle.extend_from_slice(key_pem.as_bytes());
    Ok(bundle)
}
