use crate::error::{IssuanceError, Result};

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF))
}

/// Decode a single PEM block, rejecting blocks whose label is not `label`.
pub fn pem_to_der_with_label(pem_str: &str, label: &str) -> Result<Vec<u8>> {
    let pem = pem::parse(pem_str)?;
    if pem.tag() != label {
        return Err(IssuanceError::DecodingError(format!(
            "expected PEM label '{label}', found '{}'",
            pem.tag()
        )));
    }
    Ok(pem.into_contents())
}

/// Labels of every PEM block in `input`, in order.
pub fn block_labels(input: &str) -> Result<Vec<String>> {
    Ok(pem::parse_many(input)?
        .iter()
        .map(|block| block.tag().to_string())
        .collect())
}
