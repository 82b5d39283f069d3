use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::{PrintableStringRef, SetOfVec, Utf8StringRef};
use der::{Any, Tag, Tagged};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::{IssuanceError, Result};

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATION_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

const SECONDS_PER_DAY: i64 = 86_400;

/// Distinguished name of a certificate subject or issuer.
///
/// Attribute values are encoded as typed ASN.1 strings, one RDN per attribute, so
/// characters such as `,` or `=` in a value never change the structure of the name.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
/// * `country` - The two letter country code (C).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    #[builder(into)]
    pub common_name: String,
    #[builder(into)]
    pub organization: Option<String>,
    #[builder(into)]
    pub organization_unit: Option<String>,
    #[builder(into)]
    pub country: Option<String>,
}

fn utf8_attribute(oid: ObjectIdentifier, value: &str) -> Result<RelativeDistinguishedName> {
    let value = Any::encode_from(&Utf8StringRef::new(value)?)?;
    rdn(AttributeTypeAndValue { oid, value })
}

fn rdn(attribute: AttributeTypeAndValue) -> Result<RelativeDistinguishedName> {
    Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![
        attribute,
    ])?))
}

fn attribute_string(value: &Any) -> Result<String> {
    match value.tag() {
        Tag::Utf8String => Ok(value.decode_as::<Utf8StringRef<'_>>()?.to_string()),
        Tag::PrintableString => Ok(value.decode_as::<PrintableStringRef<'_>>()?.to_string()),
        other => Err(IssuanceError::DecodingError(format!(
            "Unsupported name attribute encoding {other}"
        ))),
    }
}

impl DistinguishedName {
    /// Converts the distinguished name to an X.509-compatible format.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::DistinguishedName> {
        let mut rdns = Vec::new();

        if let Some(country) = &self.country {
            if country.len() != 2 {
                return Err(IssuanceError::InvalidArgument(format!(
                    "country '{country}' is not a two letter code"
                )));
            }
            let value = Any::encode_from(&PrintableStringRef::new(country)?)?;
            rdns.push(rdn(AttributeTypeAndValue {
                oid: COUNTRY,
                value,
            })?);
        }
        if let Some(organization) = &self.organization {
            rdns.push(utf8_attribute(ORGANIZATION, organization)?);
        }
        if let Some(unit) = &self.organization_unit {
            rdns.push(utf8_attribute(ORGANIZATION_UNIT, unit)?);
        }
        rdns.push(utf8_attribute(COMMON_NAME, &self.common_name)?);

        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509-compatible format.
    ///
    /// Attributes other than CN, O, OU and C are ignored.
    pub fn from_x509_name(x509dn: &x509_cert::name::DistinguishedName) -> Result<Self> {
        let mut name = DistinguishedName::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let slot = match attr.oid {
                    COMMON_NAME => {
                        name.common_name = attribute_string(&attr.value)?;
                        continue;
                    }
                    COUNTRY => &mut name.country,
                    ORGANIZATION => &mut name.organization,
                    ORGANIZATION_UNIT => &mut name.organization_unit,
                    _ => continue,
                };
                *slot = Some(attribute_string(&attr.value)?);
            }
        }

        Ok(name)
    }
}

/// Certificate validity period.
///
/// This struct represents the `notBefore` and `notAfter` fields in a certificate.
/// Construction does not check ordering; [`crate::request::CertificateRequest::build`]
/// rejects inverted windows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    ///
    /// Both ends are truncated to whole seconds, the resolution certificates carry.
    /// Fails with `InvalidArgument` if `days` is not positive or the end of the window
    /// is not representable.
    pub fn for_days(days: i64) -> Result<Self> {
        if days < 1 {
            return Err(IssuanceError::InvalidArgument(format!(
                "validity of {days} days is not positive"
            )));
        }
        let out_of_range = || {
            IssuanceError::InvalidArgument(format!("validity of {days} days is out of range"))
        };

        let now = OffsetDateTime::now_utc();
        let now = now - Duration::nanoseconds(i64::from(now.nanosecond()));
        let length = days
            .checked_mul(SECONDS_PER_DAY)
            .map(Duration::seconds)
            .ok_or_else(out_of_range)?;
        let not_after = now.checked_add(length).ok_or_else(out_of_range)?;

        Ok(Self {
            not_before: now,
            not_after,
        })
    }

    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.not_before < self.not_after
    }

    /// Whether `other` lies entirely inside this window.
    pub fn contains(&self, other: &Validity) -> bool {
        self.not_before <= other.not_before && other.not_after <= self.not_after
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }
}
