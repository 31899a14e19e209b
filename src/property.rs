use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::extractor::ExtractedProperty;

pub const OUTPUT_HEADER: [&str; 10] = [
    "APN",
    "Address",
    "City",
    "State",
    "Zip_Code",
    "Owner1",
    "Owner2",
    "Location_Address",
    "Mailing_Address",
    "Status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Success,
    Error,
    NotFound,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "Success",
            Status::Error => "Error",
            Status::NotFound => "NotFound",
        };
        f.write_str(s)
    }
}

/// One output row. Field order matches `OUTPUT_HEADER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyRecord {
    pub apn: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub owner1: Option<String>,
    pub owner2: Option<String>,
    pub location_address: Option<String>,
    pub mailing_address: Option<String>,
    pub status: Status,
}

impl PropertyRecord {
    /// A record with every data field empty.
    pub fn failed(apn: impl Into<String>, status: Status) -> Self {
        PropertyRecord {
            apn: apn.into(),
            address: None,
            city: None,
            state: None,
            zip_code: None,
            owner1: None,
            owner2: None,
            location_address: None,
            mailing_address: None,
            status,
        }
    }

    pub fn from_extracted(apn: impl Into<String>, data: ExtractedProperty) -> Self {
        let mailing = if data.mailing_lines.is_empty() {
            None
        } else {
            Some(data.mailing_lines.join(", "))
        };

        let (address, city, state, zip_code) = match mailing.as_deref().map(split_address) {
            Some(Some(parts)) => (parts.street, Some(parts.city), Some(parts.state), Some(parts.zip)),
            Some(None) => (mailing.clone(), None, None, None),
            None => (None, None, None, None),
        };

        let location_address = match (data.location, data.town) {
            (Some(loc), Some(town)) => Some(format!("{}, {}", loc, town)),
            (Some(loc), None) => Some(loc),
            (None, Some(town)) => Some(town),
            (None, None) => None,
        };

        PropertyRecord {
            apn: apn.into(),
            address,
            city,
            state,
            zip_code,
            owner1: data.owner1,
            owner2: data.owner2,
            location_address,
            mailing_address: mailing,
            status: Status::Success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParts {
    pub street: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
}

fn address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<street>.*),\s*)?(?P<city>[^,]+?),?\s+(?P<state>[A-Za-z]{2})\s+(?P<zip>\d{5})(?:-\d{4})?\s*$",
        )
        .expect("address pattern is valid")
    })
}

/// Splits `street, City, ST 12345` (street optional, ZIP+4 allowed).
pub fn split_address(address: &str) -> Option<AddressParts> {
    let caps = address_regex().captures(address.trim())?;
    let street = caps
        .name("street")
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    Some(AddressParts {
        street,
        city: caps["city"].trim().to_string(),
        state: caps["state"].to_uppercase(),
        zip: caps["zip"].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_comma_separated_address() {
        let parts = split_address("123 Main St, Las Vegas, NV 89101").unwrap();
        assert_eq!(parts.street.as_deref(), Some("123 Main St"));
        assert_eq!(parts.city, "Las Vegas");
        assert_eq!(parts.state, "NV");
        assert_eq!(parts.zip, "89101");
    }

    #[test]
    fn splits_assessor_style_lines_with_zip_plus_four() {
        let parts = split_address("C/O JANE DOE, 4500 W SAHARA AVE, LAS VEGAS NV 89102-1234").unwrap();
        assert_eq!(parts.street.as_deref(), Some("C/O JANE DOE, 4500 W SAHARA AVE"));
        assert_eq!(parts.city, "LAS VEGAS");
        assert_eq!(parts.zip, "89102");
    }

    #[test]
    fn city_line_only_has_no_street() {
        let parts = split_address("Henderson nv 89052").unwrap();
        assert_eq!(parts.street, None);
        assert_eq!(parts.city, "Henderson");
        assert_eq!(parts.state, "NV");
    }

    #[test]
    fn unparseable_address_is_kept_verbatim() {
        assert!(split_address("PO BOX 12, TORONTO ON M5V 2T6").is_none());

        let data = ExtractedProperty {
            mailing_lines: vec!["PO BOX 12".into(), "TORONTO ON M5V 2T6".into()],
            owner1: Some("ACME LLC".into()),
            ..Default::default()
        };
        let record = PropertyRecord::from_extracted("1", data);
        assert_eq!(record.address.as_deref(), Some("PO BOX 12, TORONTO ON M5V 2T6"));
        assert_eq!(record.city, None);
        assert_eq!(record.status, Status::Success);
    }

    #[test]
    fn location_and_town_are_combined() {
        let data = ExtractedProperty {
            location: Some("100 E FREMONT ST".into()),
            town: Some("LAS VEGAS".into()),
            ..Default::default()
        };
        let record = PropertyRecord::from_extracted("1", data);
        assert_eq!(record.location_address.as_deref(), Some("100 E FREMONT ST, LAS VEGAS"));
        assert_eq!(record.mailing_address, None);
    }

    #[test]
    fn failed_record_has_no_data() {
        let record = PropertyRecord::failed("138-04-305-011", Status::Error);
        assert_eq!(record.status.to_string(), "Error");
        assert!(record.owner1.is_none() && record.address.is_none() && record.zip_code.is_none());
    }
}
