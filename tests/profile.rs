mod util;

use std::str::FromStr;
use std::sync::Arc;

use issuekit::cert::Certificate;
use issuekit::cert::params::Validity;
use issuekit::error::IssuanceError;
use issuekit::key::KeyPair;
use issuekit::pem_utils;
use issuekit::profile::{ExportFormat, ProfileExporter, ProfileFormat};
use issuekit::request::CertificateRequest;
use plist::Value;
use regex::Regex;

struct Issued {
    key_pair: KeyPair,
    certificate: Certificate,
    ca_certificate: Certificate,
}

fn issue(identity: &str) -> Issued {
    let authority = util::memory_authority();
    let key_pair = KeyPair::generate(&util::fast_key_config()).unwrap();
    let request = CertificateRequest::build(&key_pair, identity, Validity::for_days(30).unwrap()).unwrap();
    let certificate = authority.sign(&request).unwrap();
    Issued {
        key_pair,
        certificate,
        ca_certificate: authority.certificate().clone(),
    }
}

fn exporter(issued: &Issued) -> ProfileExporter {
    ProfileExporter::new(util::fast_key_config())
        .with_ca_certificate(issued.ca_certificate.clone())
}

#[test]
fn test_pem_bundle_order() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .export(&issued.key_pair, &issued.certificate, &ExportFormat::Pem, None)
        .unwrap();

    let text = std::str::from_utf8(profile.bytes()).unwrap();
    assert_eq!(
        pem_utils::block_labels(text).unwrap(),
        vec!["CERTIFICATE", "PRIVATE KEY"]
    );
    assert_eq!(profile.passphrase(), None);
    assert_eq!(profile.format(), ProfileFormat::Pem);
    assert_eq!(profile.mime_type(), "application/x-pem-file");

    let certificate = Certificate::from_pem(util::pem_block(profile.bytes(), "CERTIFICATE")).unwrap();
    assert_eq!(certificate, issued.certificate);
}

#[test]
fn test_pem_bundle_with_passphrase() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::Pem,
            Some("hunter22"),
        )
        .unwrap();

    let text = std::str::from_utf8(profile.bytes()).unwrap();
    assert_eq!(
        pem_utils::block_labels(text).unwrap(),
        vec!["CERTIFICATE", "ENCRYPTED PRIVATE KEY"]
    );
    assert_eq!(profile.passphrase(), Some("hunter22"));

    let key_pem = util::pem_block(profile.bytes(), "ENCRYPTED PRIVATE KEY");
    let key = KeyPair::import(key_pem.as_bytes(), Some("hunter22")).unwrap();
    assert_eq!(key.public_key(), issued.key_pair.public_key());
}

#[test]
fn test_pem_empty_passphrase_means_unencrypted() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .export(&issued.key_pair, &issued.certificate, &ExportFormat::Pem, Some(""))
        .unwrap();

    let text = std::str::from_utf8(profile.bytes()).unwrap();
    assert_eq!(
        pem_utils::block_labels(text).unwrap(),
        vec!["CERTIFICATE", "PRIVATE KEY"]
    );
}

#[test]
fn test_pkcs12_requires_passphrase() {
    let issued = issue("alice");
    let exporter = exporter(&issued);

    for absent in [None, Some("")] {
        assert!(matches!(
            exporter.export(
                &issued.key_pair,
                &issued.certificate,
                &ExportFormat::Pkcs12,
                absent
            ),
            Err(IssuanceError::InvalidArgument(_))
        ));
    }
}

#[test]
fn test_pkcs12_contents() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::Pkcs12,
            Some("p12-pass"),
        )
        .unwrap();
    assert_eq!(profile.file_extension(), "p12");

    let pfx = p12::PFX::parse(profile.bytes()).unwrap();
    assert!(pfx.verify_mac("p12-pass"));
    assert!(!pfx.verify_mac("wrong"));

    let keys = pfx.key_bags("p12-pass").unwrap();
    assert_eq!(keys.len(), 1);
    let key = KeyPair::import(&keys[0], None).unwrap();
    assert_eq!(key.public_key(), issued.key_pair.public_key());

    let certificates = pfx.cert_x509_bags("p12-pass").unwrap();
    assert!(certificates.contains(&issued.certificate.to_der().unwrap()));
    assert!(certificates.contains(&issued.ca_certificate.to_der().unwrap()));
}

#[test]
fn test_pkcs12_empty_passphrase_when_allowed() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .allow_empty_pkcs12_passphrase(true)
        .export(&issued.key_pair, &issued.certificate, &ExportFormat::Pkcs12, None)
        .unwrap();

    let pfx = p12::PFX::parse(profile.bytes()).unwrap();
    assert!(pfx.verify_mac(""));
    assert_eq!(profile.passphrase(), None);
}

fn payloads(document: &[u8]) -> (plist::Dictionary, Vec<plist::Dictionary>) {
    let root = Value::from_reader_xml(document).unwrap();
    let root = root.into_dictionary().unwrap();
    let payloads = root
        .get("PayloadContent")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|payload| payload.as_dictionary().unwrap().clone())
        .collect();
    (root, payloads)
}

fn string<'a>(dict: &'a plist::Dictionary, key: &str) -> &'a str {
    dict.get(key)
        .and_then(Value::as_string)
        .unwrap_or_else(|| panic!("missing {key}"))
}

#[test]
fn test_mobileconfig_structure() {
    let issued = issue("alice");
    let network = util::network();
    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::MobileConfig(network.clone()),
            None,
        )
        .unwrap();
    assert_eq!(profile.mime_type(), "application/x-apple-aspen-config");

    let (root, payloads) = payloads(profile.bytes());
    assert_eq!(string(&root, "PayloadType"), "Configuration");
    assert_eq!(string(&root, "PayloadIdentifier"), network.identifier);
    assert_eq!(string(&root, "PayloadDisplayName"), network.display_name);
    assert_eq!(string(&root, "PayloadOrganization"), "Example Org");

    let types: Vec<_> = payloads.iter().map(|p| string(p, "PayloadType")).collect();
    assert_eq!(
        types,
        vec![
            "com.apple.security.pkcs12",
            "com.apple.security.root",
            "com.apple.wifi.managed"
        ]
    );
    let (identity, anchor, wifi) = (&payloads[0], &payloads[1], &payloads[2]);

    assert_eq!(
        anchor.get("PayloadContent").and_then(Value::as_data).unwrap(),
        issued.ca_certificate.to_der().unwrap().as_slice()
    );

    assert_eq!(string(wifi, "SSID_STR"), "eduroam");
    assert_eq!(string(wifi, "EncryptionType"), "WPA2");
    assert_eq!(
        string(wifi, "PayloadCertificateUUID"),
        string(identity, "PayloadUUID")
    );

    let eap = wifi
        .get("EAPClientConfiguration")
        .and_then(Value::as_dictionary)
        .unwrap();
    let eap_types: Vec<_> = eap
        .get("AcceptEAPTypes")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|v| v.as_unsigned_integer().unwrap())
        .collect();
    assert_eq!(eap_types, vec![13]);

    let server_names: Vec<_> = eap
        .get("TLSTrustedServerNames")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|v| v.as_string().unwrap())
        .collect();
    assert_eq!(server_names, vec!["radius.example.org"]);

    let anchors: Vec<_> = eap
        .get("PayloadCertificateAnchorUUID")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .map(|v| v.as_string().unwrap())
        .collect();
    assert_eq!(anchors, vec![string(anchor, "PayloadUUID")]);
}

#[test]
fn test_mobileconfig_embeds_generated_passphrase() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::MobileConfig(util::network()),
            None,
        )
        .unwrap();

    let (_, payloads) = payloads(profile.bytes());
    let password = string(&payloads[0], "Password");
    assert_eq!(Some(password), profile.passphrase());
    assert!(password.len() >= 20);

    let archive = payloads[0]
        .get("PayloadContent")
        .and_then(Value::as_data)
        .unwrap();
    let pfx = p12::PFX::parse(archive).unwrap();
    assert!(pfx.verify_mac(password));
}

#[test]
fn test_mobileconfig_with_caller_passphrase() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::MobileConfig(util::network()),
            Some("typed-at-install"),
        )
        .unwrap();

    let (_, payloads) = payloads(profile.bytes());
    assert!(payloads[0].get("Password").is_none());

    let archive = payloads[0]
        .get("PayloadContent")
        .and_then(Value::as_data)
        .unwrap();
    assert!(p12::PFX::parse(archive).unwrap().verify_mac("typed-at-install"));
}

#[test]
fn test_mobileconfig_rejects_bad_network_before_randomness() {
    let issued = issue("alice");
    let entropy = Arc::new(util::CountingEntropy::default());
    let exporter = exporter(&issued).with_entropy(entropy.clone());

    let mut network = util::network();
    network.server_names = vec!["not a host name".to_string()];

    let result = exporter.export(
        &issued.key_pair,
        &issued.certificate,
        &ExportFormat::MobileConfig(network),
        None,
    );
    assert!(matches!(result, Err(IssuanceError::ValidationFailed(_))));
    assert_eq!(entropy.calls(), 0);
}

#[test]
fn test_mobileconfig_needs_ca_certificate() {
    let issued = issue("alice");
    let exporter = ProfileExporter::new(util::fast_key_config());
    assert!(matches!(
        exporter.preflight(&ExportFormat::MobileConfig(util::network()), None),
        Err(IssuanceError::InvalidConfig(_))
    ));
    assert!(
        exporter
            .export(&issued.key_pair, &issued.certificate, &ExportFormat::Pem, None)
            .is_ok()
    );
}

/// Text of every `<tag ...>text</tag>` element in `document`.
fn elements(document: &[u8], tag: &str) -> Vec<String> {
    let text = std::str::from_utf8(document).unwrap();
    let element = Regex::new(&format!(r"<{tag}(?: [^>]*)?>([^<]*)</{tag}>")).unwrap();
    element
        .captures_iter(text)
        .map(|captures| captures[1].to_string())
        .collect()
}

fn decode(text: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .unwrap()
}

#[test]
fn test_eap_metadata_structure() {
    let issued = issue("alice");
    let network = util::network();
    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::EapMetadata(network.clone()),
            None,
        )
        .unwrap();
    assert_eq!(profile.format(), ProfileFormat::EapMetadata);
    assert_eq!(profile.mime_type(), "application/eap-config");

    let document = profile.bytes();
    assert!(
        std::str::from_utf8(document)
            .unwrap()
            .contains(&format!("ID=\"{}\"", network.identifier))
    );
    assert_eq!(elements(document, "Type"), vec!["13"]);
    assert_eq!(elements(document, "SSID"), vec!["eduroam"]);
    assert_eq!(elements(document, "ServerID"), vec!["radius.example.org"]);
    assert_eq!(elements(document, "DisplayName"), vec!["Example Wi-Fi"]);

    let ca = elements(document, "CA");
    assert_eq!(ca.len(), 1);
    assert_eq!(decode(&ca[0]), issued.ca_certificate.to_der().unwrap());

    let passphrase = elements(document, "Passphrase");
    assert_eq!(passphrase.len(), 1);
    assert_eq!(Some(passphrase[0].as_str()), profile.passphrase());

    let archive = decode(&elements(document, "ClientCertificate")[0]);
    let pfx = p12::PFX::parse(&archive).unwrap();
    assert!(pfx.verify_mac(&passphrase[0]));
    let keys = pfx.key_bags(&passphrase[0]).unwrap();
    let key = KeyPair::import(&keys[0], None).unwrap();
    assert_eq!(key.public_key(), issued.key_pair.public_key());
}

#[test]
fn test_eap_metadata_with_caller_passphrase() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::EapMetadata(util::network()),
            Some("typed-at-install"),
        )
        .unwrap();

    let document = profile.bytes();
    assert!(elements(document, "Passphrase").is_empty());
    let archive = decode(&elements(document, "ClientCertificate")[0]);
    assert!(p12::PFX::parse(&archive).unwrap().verify_mac("typed-at-install"));
}

#[test]
fn test_eap_metadata_escapes_network_text() {
    let issued = issue("alice");
    let mut network = util::network();
    network.display_name = "Staff & Students".to_string();

    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::EapMetadata(network),
            None,
        )
        .unwrap();
    assert_eq!(
        elements(profile.bytes(), "DisplayName"),
        vec!["Staff &amp; Students"]
    );
}

#[test]
fn test_eap_metadata_rejects_bad_network_before_randomness() {
    let issued = issue("alice");
    let entropy = Arc::new(util::CountingEntropy::default());
    let exporter = exporter(&issued).with_entropy(entropy.clone());

    let mut network = util::network();
    network.identifier = "wifi".to_string();

    let result = exporter.export(
        &issued.key_pair,
        &issued.certificate,
        &ExportFormat::EapMetadata(network),
        None,
    );
    assert!(matches!(result, Err(IssuanceError::ValidationFailed(_))));
    assert_eq!(entropy.calls(), 0);

    assert!(matches!(
        ProfileExporter::new(util::fast_key_config())
            .preflight(&ExportFormat::EapMetadata(util::network()), None),
        Err(IssuanceError::InvalidConfig(_))
    ));
}

#[test]
fn test_format_names() {
    assert_eq!(ProfileFormat::from_str("pem").unwrap(), ProfileFormat::Pem);
    assert_eq!(ProfileFormat::from_str("P12").unwrap(), ProfileFormat::Pkcs12);
    assert_eq!(ProfileFormat::from_str("pkcs12").unwrap(), ProfileFormat::Pkcs12);
    assert_eq!(
        ProfileFormat::from_str("mobileconfig").unwrap(),
        ProfileFormat::MobileConfig
    );
    assert_eq!(
        ProfileFormat::from_str("eap-metadata").unwrap(),
        ProfileFormat::EapMetadata
    );
    assert!(matches!(
        ProfileFormat::from_str("der"),
        Err(IssuanceError::UnsupportedFormat(_))
    ));
    assert_eq!(ProfileFormat::MobileConfig.to_string(), "mobileconfig");
    assert_eq!(ProfileFormat::EapMetadata.to_string(), "eap-metadata");
    assert_eq!(ProfileFormat::EapMetadata.file_extension(), "eap-config");
}

#[test]
fn test_exported_profile_debug_is_redacted() {
    let issued = issue("alice");
    let profile = exporter(&issued)
        .export(
            &issued.key_pair,
            &issued.certificate,
            &ExportFormat::Pem,
            Some("hunter22"),
        )
        .unwrap();

    let debug = format!("{profile:?}");
    assert!(!debug.contains("hunter22"));
    assert!(!debug.contains("BEGIN"));
}
