//! Canonical WHOIS fields and per-registry attribute maps

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Canonical field of a WHOIS record
///
/// The string form doubles as the `gen_whois_asn` column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhoisField {
    AsName,
    OrgId,
    OrgName,
    Remarks,
    Address,
    City,
    StateProv,
    PostalCode,
    Country,
    Source,
}

impl WhoisField {
    pub const ALL: [WhoisField; 10] = [
        WhoisField::AsName,
        WhoisField::OrgId,
        WhoisField::OrgName,
        WhoisField::Remarks,
        WhoisField::Address,
        WhoisField::City,
        WhoisField::StateProv,
        WhoisField::PostalCode,
        WhoisField::Country,
        WhoisField::Source,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WhoisField::AsName => "as_name",
            WhoisField::OrgId => "org_id",
            WhoisField::OrgName => "org_name",
            WhoisField::Remarks => "remarks",
            WhoisField::Address => "address",
            WhoisField::City => "city",
            WhoisField::StateProv => "state_prov",
            WhoisField::PostalCode => "postal_code",
            WhoisField::Country => "country",
            WhoisField::Source => "source",
        }
    }
}

impl Display for WhoisField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output dialect of a WHOIS server
///
/// Each family has its own attribute names and its own idea of where the
/// useful part of a response ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFamily {
    /// ARIN's `Key: value` format (ASName, OrgName, ...)
    Arin,
    /// RIPE, APNIC, AFRINIC and RPSL route registries
    RipeLike,
    /// LACNIC's owner/ownerid format
    LacnicLike,
}

impl SourceFamily {
    /// Map a source attribute name to its canonical field
    pub fn map_attribute(&self, attr: &str) -> Option<WhoisField> {
        match self {
            SourceFamily::Arin => match attr {
                "ASName" => Some(WhoisField::AsName),
                "OrgId" => Some(WhoisField::OrgId),
                "OrgName" => Some(WhoisField::OrgName),
                "Address" => Some(WhoisField::Address),
                "City" => Some(WhoisField::City),
                "StateProv" => Some(WhoisField::StateProv),
                "PostalCode" => Some(WhoisField::PostalCode),
                "Country" => Some(WhoisField::Country),
                "Comment" => Some(WhoisField::Remarks),
                _ => None,
            },
            // apnic does not carry org objects, only as-name/descr/address
            SourceFamily::RipeLike => match attr {
                "as-name" => Some(WhoisField::AsName),
                "descr" => Some(WhoisField::Remarks),
                "org" => Some(WhoisField::OrgId),
                "org-name" => Some(WhoisField::OrgName),
                "address" => Some(WhoisField::Address),
                "country" => Some(WhoisField::Country),
                _ => None,
            },
            SourceFamily::LacnicLike => match attr {
                "owner" => Some(WhoisField::OrgName),
                "ownerid" => Some(WhoisField::OrgId),
                "address" => Some(WhoisField::Address),
                "country" => Some(WhoisField::Country),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_unique() {
        let mut names: Vec<&str> = WhoisField::ALL.iter().map(|f| f.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), WhoisField::ALL.len());
    }

    #[test]
    fn test_attribute_maps_differ_per_family() {
        assert_eq!(
            SourceFamily::Arin.map_attribute("ASName"),
            Some(WhoisField::AsName)
        );
        assert_eq!(SourceFamily::Arin.map_attribute("as-name"), None);
        assert_eq!(
            SourceFamily::RipeLike.map_attribute("as-name"),
            Some(WhoisField::AsName)
        );
        assert_eq!(
            SourceFamily::LacnicLike.map_attribute("ownerid"),
            Some(WhoisField::OrgId)
        );
        assert_eq!(SourceFamily::LacnicLike.map_attribute("descr"), None);
    }
}
