//! EAP metadata (`eap-config`) documents for EAP-TLS Wi-Fi.
//!
//! The document is an `EAPIdentityProviderList` holding one provider with a single
//! EAP-TLS method. The server side carries the CA certificate and the trusted server
//! names; the client side carries the subject's PKCS#12 identity.

use std::fmt::Display;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use zeroize::Zeroizing;

use super::mobileconfig::NetworkProfile;
use crate::error::{IssuanceError, Result};

/// EAP type number for EAP-TLS (RFC 5216).
const EAP_TYPE_TLS: &str = "13";
const REALM_NAMESPACE: &str = "urn:RFC4282:realm";
const MIN_RSN_PROTO: &str = "CCMP";

/// Inputs of one metadata document.
pub(crate) struct EapMetadataContents<'a> {
    pub network: &'a NetworkProfile,
    pub pkcs12: &'a [u8],
    /// Embedded so the credential installs without prompting.
    pub pkcs12_password: Option<&'a str>,
    pub ca_certificate_der: &'a [u8],
}

fn xml_error(e: impl Display) -> IssuanceError {
    IssuanceError::ExportFailed(format!("eap-config: {e}"))
}

struct Document {
    writer: Writer<Vec<u8>>,
}

impl Document {
    fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_error)?;
        Ok(Self { writer })
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer
            .write_event(Event::Start(start))
            .map_err(xml_error)
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    fn element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.open(name, attributes)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)?;
        self.close(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

/// Serializes the metadata document.
pub(crate) fn build_eap_metadata(contents: &EapMetadataContents<'_>) -> Result<Vec<u8>> {
    let network = contents.network;
    let ca = STANDARD.encode(contents.ca_certificate_der);
    let client = Zeroizing::new(STANDARD.encode(contents.pkcs12));

    let mut doc = Document::new()?;
    doc.open(
        "EAPIdentityProviderList",
        &[
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ("xsi:noNamespaceSchemaLocation", "eap-metadata.xsd"),
        ],
    )?;
    doc.open(
        "EAPIdentityProvider",
        &[
            ("ID", network.identifier.as_str()),
            ("namespace", REALM_NAMESPACE),
            ("version", "1"),
        ],
    )?;

    doc.open("AuthenticationMethods", &[])?;
    doc.open("AuthenticationMethod", &[])?;
    doc.open("EAPMethod", &[])?;
    doc.element("Type", &[], EAP_TYPE_TLS)?;
    doc.close("EAPMethod")?;

    doc.open("ServerSideCredential", &[])?;
    doc.element("CA", &[("format", "X.509"), ("encoding", "base64")], &ca)?;
    for name in &network.server_names {
        doc.element("ServerID", &[], name)?;
    }
    doc.close("ServerSideCredential")?;

    doc.open("ClientSideCredential", &[])?;
    doc.element(
        "ClientCertificate",
        &[("format", "PKCS12"), ("encoding", "base64")],
        &client,
    )?;
    if let Some(password) = contents.pkcs12_password {
        doc.element("Passphrase", &[], password)?;
    }
    doc.close("ClientSideCredential")?;
    doc.close("AuthenticationMethod")?;
    doc.close("AuthenticationMethods")?;

    doc.open("CredentialApplicability", &[])?;
    doc.open("IEEE80211", &[])?;
    doc.element("SSID", &[], &network.ssid)?;
    doc.element("MinRSNProto", &[], MIN_RSN_PROTO)?;
    doc.close("IEEE80211")?;
    doc.close("CredentialApplicability")?;

    doc.open("ProviderInfo", &[])?;
    doc.element("DisplayName", &[], &network.display_name)?;
    if let Some(organization) = &network.organization {
        doc.element("Description", &[], organization)?;
    }
    doc.close("ProviderInfo")?;

    doc.close("EAPIdentityProvider")?;
    doc.close("EAPIdentityProviderList")?;
    Ok(doc.finish())
}
