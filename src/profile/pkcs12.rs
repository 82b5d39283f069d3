use zeroize::Zeroizing;

use crate::cert::Certificate;
use crate::error::{IssuanceError, Result};
use crate::key::KeyPair;

/// Bundles the key, its certificate and the CA certificate into a PKCS#12 archive.
///
/// `p12` protects the key bag with pbeWithSHAAnd3-KeyTripleDES-CBC and the certificate
/// bags with pbeWithSHAAnd40BitRC2-CBC, the combination Apple profiles and older
/// Windows supplicants import. Its salts come from the OS RNG.
pub(crate) fn build_pkcs12(
    key_pair: &KeyPair,
    certificate: &Certificate,
    ca_certificate: Option<&Certificate>,
    passphrase: &str,
    friendly_name: &str,
) -> Result<Zeroizing<Vec<u8>>> {
    let key_der = key_pair.export_private_der()?;
    let cert_der = certificate.to_der()?;
    let ca_der = ca_certificate.map(Certificate::to_der).transpose()?;

    let pfx = p12::PFX::new(
        &cert_der,
        &key_der,
        ca_der.as_deref(),
        passphrase,
        friendly_name,
    )
    .ok_or_else(|| IssuanceError::ExportFailed("PKCS#12 encoding failed".to_string()))?;

    Ok(Zeroizing::new(pfx.to_der()))
}
