//! Apple configuration profiles for EAP-TLS Wi-Fi.
//!
//! The document is an XML property list with three payloads: the subject's PKCS#12
//! identity, the CA certificate as a trust anchor, and a managed Wi-Fi network that
//! authenticates with the former and trusts the latter.

use std::sync::LazyLock;

use bon::Builder;
use plist::{Dictionary, Value};
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{IssuanceError, Result};
use crate::key::EntropySource;

/// EAP type number for EAP-TLS (RFC 5216).
const EAP_TYPE_TLS: u64 = 13;
/// Longest SSID allowed by IEEE 802.11.
const MAX_SSID_BYTES: usize = 32;
const MAX_DNS_NAME_LEN: usize = 253;

static DNS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*\.)?([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)*[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")
        .expect("DNS name pattern is valid")
});
static REVERSE_DNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$")
        .expect("reverse-DNS pattern is valid")
});

/// Outer EAP method of the network.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EapMethod {
    #[default]
    Tls,
    Ttls,
    Peap,
}

/// Network metadata carried by a configuration profile.
///
/// # Fields
/// * `ssid` - Network name, 1 to 32 bytes.
/// * `eap_method` - Must be `Tls`; the profile authenticates with a client certificate.
/// * `server_names` - RADIUS server names the client will trust.
/// * `identifier` - Reverse-DNS profile identifier, e.g. `org.example.wifi`.
/// * `display_name` - Name shown to the user on install.
/// * `organization` - Optional organization shown on install.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkProfile {
    #[builder(into)]
    pub ssid: String,
    #[builder(default)]
    #[serde(default)]
    pub eap_method: EapMethod,
    #[builder(default)]
    pub server_names: Vec<String>,
    #[builder(into)]
    pub identifier: String,
    #[builder(into)]
    pub display_name: String,
    #[builder(into)]
    pub organization: Option<String>,
}

fn invalid(message: impl Into<String>) -> IssuanceError {
    IssuanceError::ValidationFailed(message.into())
}

impl NetworkProfile {
    /// Checks every field; runs before any key is generated for a profile export.
    pub fn validate(&self) -> Result<()> {
        if self.ssid.is_empty() || self.ssid.len() > MAX_SSID_BYTES {
            return Err(invalid(format!(
                "SSID must be 1 to {MAX_SSID_BYTES} bytes, got {}",
                self.ssid.len()
            )));
        }
        if self.ssid.chars().any(char::is_control) {
            return Err(invalid("SSID contains control characters"));
        }

        if self.eap_method != EapMethod::Tls {
            return Err(invalid(format!(
                "EAP method {:?} cannot authenticate with a client certificate",
                self.eap_method
            )));
        }

        if self.server_names.is_empty() {
            return Err(invalid("at least one trusted server name is required"));
        }
        for name in &self.server_names {
            if name.len() > MAX_DNS_NAME_LEN || !DNS_NAME.is_match(name) {
                return Err(invalid(format!("'{name}' is not a valid server name")));
            }
        }

        if !REVERSE_DNS.is_match(&self.identifier) {
            return Err(invalid(format!(
                "'{}' is not a reverse-DNS identifier",
                self.identifier
            )));
        }

        if self.display_name.trim().is_empty() {
            return Err(invalid("display name must not be empty"));
        }

        Ok(())
    }
}

fn random_uuid(entropy: &dyn EntropySource) -> Result<Uuid> {
    let mut bytes = [0u8; 16];
    entropy
        .fill(&mut bytes)
        .map_err(|e| IssuanceError::ExportFailed(format!("entropy source: {e}")))?;
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

fn uuid_string(uuid: Uuid) -> String {
    uuid.hyphenated().to_string().to_uppercase()
}

fn payload(
    payload_type: &str,
    identifier: String,
    uuid: Uuid,
    display_name: &str,
) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.insert("PayloadType".to_string(), Value::from(payload_type));
    dict.insert("PayloadVersion".to_string(), Value::from(1u64));
    dict.insert("PayloadIdentifier".to_string(), Value::from(identifier));
    dict.insert("PayloadUUID".to_string(), Value::from(uuid_string(uuid)));
    dict.insert("PayloadDisplayName".to_string(), Value::from(display_name));
    dict
}

/// Inputs of one profile document.
pub(crate) struct MobileConfigContents<'a> {
    pub network: &'a NetworkProfile,
    pub identity: &'a str,
    pub pkcs12: &'a [u8],
    /// Embedded so the profile installs without prompting.
    pub pkcs12_password: Option<&'a str>,
    pub ca_certificate_der: &'a [u8],
}

/// Serializes the profile as an XML property list.
pub(crate) fn build_mobileconfig(
    contents: &MobileConfigContents<'_>,
    entropy: &dyn EntropySource,
) -> Result<Vec<u8>> {
    let network = contents.network;
    let base = &network.identifier;

    let pkcs12_uuid = random_uuid(entropy)?;
    let ca_uuid = random_uuid(entropy)?;
    let wifi_uuid = random_uuid(entropy)?;
    let profile_uuid = random_uuid(entropy)?;

    let mut identity = payload(
        "com.apple.security.pkcs12",
        format!("{base}.identity"),
        pkcs12_uuid,
        contents.identity,
    );
    identity.insert(
        "PayloadCertificateFileName".to_string(),
        Value::from(format!("{}.p12", contents.identity)),
    );
    identity.insert(
        "PayloadContent".to_string(),
        Value::Data(contents.pkcs12.to_vec()),
    );
    if let Some(password) = contents.pkcs12_password {
        identity.insert("Password".to_string(), Value::from(password));
    }

    let mut anchor = payload(
        "com.apple.security.root",
        format!("{base}.ca"),
        ca_uuid,
        "Certificate Authority",
    );
    anchor.insert(
        "PayloadCertificateFileName".to_string(),
        Value::from("ca.cer"),
    );
    anchor.insert(
        "PayloadContent".to_string(),
        Value::Data(contents.ca_certificate_der.to_vec()),
    );

    let mut eap = Dictionary::new();
    eap.insert(
        "AcceptEAPTypes".to_string(),
        Value::Array(vec![Value::from(EAP_TYPE_TLS)]),
    );
    eap.insert(
        "TLSTrustedServerNames".to_string(),
        Value::Array(
            network
                .server_names
                .iter()
                .map(|name| Value::from(name.as_str()))
                .collect(),
        ),
    );
    eap.insert(
        "PayloadCertificateAnchorUUID".to_string(),
        Value::Array(vec![Value::from(uuid_string(ca_uuid))]),
    );

    let mut wifi = payload(
        "com.apple.wifi.managed",
        format!("{base}.wifi"),
        wifi_uuid,
        &network.ssid,
    );
    wifi.insert("SSID_STR".to_string(), Value::from(network.ssid.as_str()));
    wifi.insert("EncryptionType".to_string(), Value::from("WPA2"));
    wifi.insert("AutoJoin".to_string(), Value::Boolean(true));
    wifi.insert("HIDDEN_NETWORK".to_string(), Value::Boolean(false));
    wifi.insert("EAPClientConfiguration".to_string(), Value::Dictionary(eap));
    wifi.insert(
        "PayloadCertificateUUID".to_string(),
        Value::from(uuid_string(pkcs12_uuid)),
    );

    let mut profile = payload(
        "Configuration",
        base.clone(),
        profile_uuid,
        &network.display_name,
    );
    profile.insert(
        "PayloadContent".to_string(),
        Value::Array(vec![
            Value::Dictionary(identity),
            Value::Dictionary(anchor),
            Value::Dictionary(wifi),
        ]),
    );
    if let Some(organization) = &network.organization {
        profile.insert(
            "PayloadOrganization".to_string(),
            Value::from(organization.as_str()),
        );
    }
    profile.insert("PayloadRemovalDisallowed".to_string(), Value::Boolean(false));

    let mut document = Vec::new();
    Value::Dictionary(profile)
        .to_writer_xml(&mut document)
        .map_err(|e| IssuanceError::ExportFailed(e.to_string()))?;
    Ok(document)
}
