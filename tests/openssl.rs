mod util;

use issuekit::config::{Digest, EcCurve, KeyConfig};
use issuekit::key::KeyPair;
use issuekit::profile::ExportFormat;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509StoreContext};
use regex::Regex;

/// Issues a PEM profile for `identity` and returns it with the CA certificate.
fn issue_pem(identity: &str) -> (X509, X509, Vec<u8>) {
    let service = util::service();
    let profile = service.issue(identity, ExportFormat::Pem, None).unwrap();

    let leaf = X509::from_pem(util::pem_block(profile.bytes(), "CERTIFICATE").as_bytes())
        .expect("Failed to parse issued certificate");
    let ca_pem = service.authority().certificate().to_pem().unwrap();
    let ca = X509::from_pem(ca_pem.as_bytes()).expect("Failed to parse CA certificate");
    (leaf, ca, profile.bytes().to_vec())
}

#[test]
fn test_openssl_validate_chain() {
    let (leaf, ca, _) = issue_pem("alice");

    assert!(
        leaf.verify(&ca.public_key().unwrap()).unwrap(),
        "leaf signature does not verify under the CA key"
    );
    assert!(ca.verify(&ca.public_key().unwrap()).unwrap());

    let mut builder = X509StoreBuilder::new().unwrap();
    builder.add_cert(ca).unwrap();
    let store = builder.build();
    let chain = Stack::new().unwrap();

    let mut context = X509StoreContext::new().unwrap();
    let (valid, error) = context
        .init(&store, &leaf, &chain, |ctx| {
            Ok((ctx.verify_cert()?, ctx.error()))
        })
        .unwrap();
    assert!(valid, "OpenSSL rejected the chain: {error}");
}

#[test]
fn test_openssl_certificate_fields() {
    let (leaf, _, _) = issue_pem("alice");

    let subject = leaf
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap();
    assert_eq!(subject.to_string(), "alice", "Subject CN mismatch");

    let issuer = leaf
        .issuer_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap();
    assert_eq!(issuer.to_string(), util::CA_NAME, "Issuer CN mismatch");

    assert_eq!(leaf.version(), 2, "X509 version should be 3 (0-based index)");

    let serial = leaf.serial_number().to_bn().unwrap().to_dec_str().unwrap();
    assert_eq!(serial.to_string(), "1", "Serial number should be 1");

    assert_eq!(
        leaf.signature_algorithm().object().nid(),
        Nid::ECDSA_WITH_SHA256,
        "Signature algorithm should be ecdsa-with-SHA256"
    );
}

#[test]
fn test_openssl_text_dump() {
    let (leaf, _, _) = issue_pem("alice");
    let text = leaf.to_text().unwrap();
    let text = String::from_utf8_lossy(&text);

    assert!(
        Regex::new(r"Subject:.*CN ?= ?alice").unwrap().is_match(&text),
        "Subject field is incorrect"
    );
    assert!(
        Regex::new(r"Not Before: .+").unwrap().is_match(&text),
        "Missing or incorrect Not Before field"
    );
    assert!(
        Regex::new(r"Not After ?: .+").unwrap().is_match(&text),
        "Missing or incorrect Not After field"
    );
    assert!(text.contains("CA:FALSE"), "Basic constraints are incorrect");
    assert!(
        text.contains("TLS Web Client Authentication"),
        "Extended key usage is incorrect"
    );
    assert!(
        text.contains("Signature Algorithm: ecdsa-with-SHA256"),
        "Signature Algorithm field is incorrect"
    );
}

#[test]
fn test_openssl_reads_issued_key() {
    let (leaf, _, bundle) = issue_pem("alice");
    let key_pem = util::pem_block(&bundle, "PRIVATE KEY");

    let key = PKey::private_key_from_pem(key_pem.as_bytes()).expect("Failed to parse key");
    assert!(key.public_eq(&leaf.public_key().unwrap()));
}

#[test]
fn test_openssl_decrypts_encrypted_export() {
    let configs = [
        KeyConfig::rsa(2048, Digest::Sha256).unwrap(),
        KeyConfig::ec(EcCurve::P384, Digest::Sha384).unwrap(),
        KeyConfig::ed25519(),
    ];

    for config in configs {
        let config = config.with_pbkdf2_iterations(2_000).unwrap();
        let key_pair = KeyPair::generate(&config).unwrap();
        let pem = key_pair.export_private_encrypted("s3cret", &config).unwrap();

        let key = PKey::private_key_from_pem_passphrase(pem.as_bytes(), b"s3cret")
            .unwrap_or_else(|e| panic!("{config:?}: {e}"));
        assert_eq!(
            key.public_key_to_der().unwrap(),
            key_pair.public_key_der(),
            "{config:?}"
        );

        assert!(PKey::private_key_from_pem_passphrase(pem.as_bytes(), b"wrong").is_err());
    }
}

#[test]
fn test_import_openssl_pkcs1_rsa_key() {
    let rsa = Rsa::generate(2048).unwrap();
    let pem = rsa.private_key_to_pem().unwrap();
    assert!(String::from_utf8_lossy(&pem).contains("BEGIN RSA PRIVATE KEY"));

    let key_pair = KeyPair::import(&pem, None).unwrap();
    assert_eq!(key_pair.public_key_der(), rsa.public_key_to_der().unwrap());
}

#[test]
fn test_import_openssl_sec1_keys() {
    for nid in [Nid::X9_62_PRIME256V1, Nid::SECP384R1] {
        let group = EcGroup::from_curve_name(nid).unwrap();
        let ec = EcKey::generate(&group).unwrap();
        let pem = ec.private_key_to_pem().unwrap();
        assert!(String::from_utf8_lossy(&pem).contains("BEGIN EC PRIVATE KEY"));

        let key_pair = KeyPair::import(&pem, None).unwrap();
        assert_eq!(key_pair.public_key_der(), ec.public_key_to_der().unwrap());

        let der = ec.private_key_to_der().unwrap();
        let from_der = KeyPair::import(&der, None).unwrap();
        assert_eq!(from_der.public_key(), key_pair.public_key());
    }
}

#[test]
fn test_import_openssl_encrypted_pkcs8() {
    let pkey = PKey::from_ec_key(
        EcKey::generate(&EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap()).unwrap(),
    )
    .unwrap();
    let pem = pkey
        .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), b"openssl-pass")
        .unwrap();

    let key_pair = KeyPair::import(&pem, Some("openssl-pass")).unwrap();
    assert_eq!(key_pair.public_key_der(), pkey.public_key_to_der().unwrap());
}
