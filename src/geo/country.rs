//! ISO 3166-1 alpha-2 country codes and the static reference table mapping
//! each code to a representative coordinate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

/// Two uppercase ASCII letters identifying a country (ISO 3166-1 alpha-2).
///
/// The only value that does not name a real country is the reserved sentinel
/// [`Alpha2CountryCode::UNKNOWN`] (`XX`), used when a client's country could
/// not be determined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Alpha2CountryCode([u8; 2]);

/// Error returned when parsing a string that is not a two-letter uppercase code.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid country code `{0}`: expected two uppercase ASCII letters")]
pub struct InvalidCountryCode(pub String);

impl Alpha2CountryCode {
    /// Sentinel for an undetermined country.
    pub const UNKNOWN: Self = Self(*b"XX");

    /// Build a code from a two-byte ASCII literal.
    ///
    /// Only used for the baked-in reference table, so out-of-range bytes are
    /// a programming error caught at compile time.
    pub(crate) const fn from_ascii(code: [u8; 2]) -> Self {
        assert!(code[0].is_ascii_uppercase() && code[1].is_ascii_uppercase());
        Self(code)
    }

    /// Whether this is the undetermined-country sentinel.
    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    /// Pack both letters into a 16-bit code used for table keys.
    pub fn code_point(self) -> u16 {
        (u16::from(self.0[0]) << 8) | u16::from(self.0[1])
    }
}

impl FromStr for Alpha2CountryCode {
    type Err = InvalidCountryCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = value.as_bytes();
        if bytes.len() == 2 && bytes[0].is_ascii_uppercase() && bytes[1].is_ascii_uppercase() {
            Ok(Self([bytes[0], bytes[1]]))
        } else {
            Err(InvalidCountryCode(value.to_string()))
        }
    }
}

impl fmt::Display for Alpha2CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Always two uppercase ASCII letters, so this cannot fail.
        f.write_str(std::str::from_utf8(&self.0).unwrap_or("??"))
    }
}

impl fmt::Debug for Alpha2CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Alpha2CountryCode({self})")
    }
}

impl Serialize for Alpha2CountryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Alpha2CountryCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(de::Error::custom)
    }
}

/// Static record describing a known country: code, display name,
/// representative coordinate and a coarse CDN region hint.
#[derive(Debug, Clone, Copy)]
pub struct CountryInfo {
    /// ISO 3166-1 alpha-2 code.
    pub code: Alpha2CountryCode,
    /// English display name.
    pub name: &'static str,
    /// Latitude of a representative point, decimal degrees.
    pub latitude: f64,
    /// Longitude of a representative point, decimal degrees.
    pub longitude: f64,
    /// Coarse CDN/edge region the country is usually served from.
    pub region: Option<&'static str>,
}

const fn country(
    code: [u8; 2],
    name: &'static str,
    latitude: f64,
    longitude: f64,
    region: &'static str,
) -> CountryInfo {
    CountryInfo {
        code: Alpha2CountryCode::from_ascii(code),
        name,
        latitude,
        longitude,
        region: Some(region),
    }
}

/// Reference table of known countries. Built into the binary and never
/// mutated; the distance table in [`crate::geo::distance`] is derived from it
/// once at first use.
pub static COUNTRIES: &[CountryInfo] = &[
    country(*b"AD", "Andorra", 42.5, 1.5, "weur"),
    country(*b"AE", "United Arab Emirates", 24.0, 54.0, "me"),
    country(*b"AF", "Afghanistan", 33.0, 66.0, "me"),
    country(*b"AL", "Albania", 41.0, 20.0, "eeur"),
    country(*b"AM", "Armenia", 40.25, 45.0, "eeur"),
    country(*b"AO", "Angola", -12.5, 18.5, "afr"),
    country(*b"AR", "Argentina", -34.0, -64.0, "sam"),
    country(*b"AT", "Austria", 47.3, 13.3, "weur"),
    country(*b"AU", "Australia", -25.0, 135.0, "oc"),
    country(*b"AZ", "Azerbaijan", 40.5, 47.5, "eeur"),
    country(*b"BA", "Bosnia and Herzegovina", 44.25, 17.8, "eeur"),
    country(*b"BD", "Bangladesh", 24.0, 90.0, "apac"),
    country(*b"BE", "Belgium", 50.8, 4.5, "weur"),
    country(*b"BG", "Bulgaria", 42.7, 25.3, "eeur"),
    country(*b"BH", "Bahrain", 26.0, 50.5, "me"),
    country(*b"BO", "Bolivia", -17.0, -65.0, "sam"),
    country(*b"BR", "Brazil", -10.0, -52.0, "sam"),
    country(*b"BY", "Belarus", 53.7, 28.0, "eeur"),
    country(*b"CA", "Canada", 56.0, -106.0, "enam"),
    country(*b"CH", "Switzerland", 46.8, 8.2, "weur"),
    country(*b"CL", "Chile", -33.5, -70.7, "sam"),
    country(*b"CN", "China", 35.0, 103.0, "apac"),
    country(*b"CO", "Colombia", 4.0, -73.0, "sam"),
    country(*b"CR", "Costa Rica", 10.0, -84.0, "sam"),
    country(*b"CU", "Cuba", 21.5, -79.5, "enam"),
    country(*b"CY", "Cyprus", 35.0, 33.0, "eeur"),
    country(*b"CZ", "Czechia", 49.8, 15.5, "eeur"),
    country(*b"DE", "Germany", 51.2, 10.4, "weur"),
    country(*b"DK", "Denmark", 56.0, 10.0, "weur"),
    country(*b"DO", "Dominican Republic", 19.0, -70.7, "enam"),
    country(*b"DZ", "Algeria", 28.0, 2.6, "afr"),
    country(*b"EC", "Ecuador", -1.5, -78.3, "sam"),
    country(*b"EE", "Estonia", 58.7, 25.5, "eeur"),
    country(*b"EG", "Egypt", 26.5, 29.9, "afr"),
    country(*b"ES", "Spain", 40.2, -3.6, "weur"),
    country(*b"ET", "Ethiopia", 9.0, 39.5, "afr"),
    country(*b"FI", "Finland", 64.0, 26.0, "weur"),
    country(*b"FR", "France", 46.6, 2.5, "weur"),
    country(*b"GB", "United Kingdom", 54.0, -2.0, "weur"),
    country(*b"GE", "Georgia", 42.0, 43.5, "eeur"),
    country(*b"GH", "Ghana", 8.0, -1.2, "afr"),
    country(*b"GR", "Greece", 39.0, 22.0, "eeur"),
    country(*b"GT", "Guatemala", 15.5, -90.4, "sam"),
    country(*b"HK", "Hong Kong", 22.3, 114.2, "apac"),
    country(*b"HN", "Honduras", 14.8, -86.6, "sam"),
    country(*b"HR", "Croatia", 45.2, 16.4, "eeur"),
    country(*b"HU", "Hungary", 47.2, 19.4, "eeur"),
    country(*b"ID", "Indonesia", -2.2, 117.4, "apac"),
    country(*b"IE", "Ireland", 53.2, -8.2, "weur"),
    country(*b"IL", "Israel", 31.4, 35.0, "me"),
    country(*b"IN", "India", 22.9, 79.6, "apac"),
    country(*b"IQ", "Iraq", 33.0, 43.8, "me"),
    country(*b"IR", "Iran", 32.6, 54.3, "me"),
    country(*b"IS", "Iceland", 65.0, -18.0, "weur"),
    country(*b"IT", "Italy", 42.8, 12.8, "weur"),
    country(*b"JM", "Jamaica", 18.1, -77.3, "enam"),
    country(*b"JO", "Jordan", 31.3, 36.5, "me"),
    country(*b"JP", "Japan", 36.0, 138.0, "apac"),
    country(*b"KE", "Kenya", 0.5, 37.9, "afr"),
    country(*b"KH", "Cambodia", 12.7, 104.9, "apac"),
    country(*b"KR", "South Korea", 36.4, 127.8, "apac"),
    country(*b"KW", "Kuwait", 29.3, 47.6, "me"),
    country(*b"KZ", "Kazakhstan", 48.0, 67.0, "eeur"),
    country(*b"LB", "Lebanon", 33.9, 35.9, "me"),
    country(*b"LK", "Sri Lanka", 7.6, 80.7, "apac"),
    country(*b"LT", "Lithuania", 55.3, 23.9, "eeur"),
    country(*b"LU", "Luxembourg", 49.8, 6.1, "weur"),
    country(*b"LV", "Latvia", 56.9, 24.9, "eeur"),
    country(*b"MA", "Morocco", 32.0, -6.0, "afr"),
    country(*b"MD", "Moldova", 47.2, 28.5, "eeur"),
    country(*b"ME", "Montenegro", 42.8, 19.3, "eeur"),
    country(*b"MK", "North Macedonia", 41.6, 21.7, "eeur"),
    country(*b"MM", "Myanmar", 21.0, 96.5, "apac"),
    country(*b"MN", "Mongolia", 46.8, 103.0, "apac"),
    country(*b"MT", "Malta", 35.9, 14.4, "weur"),
    country(*b"MX", "Mexico", 23.9, -102.5, "wnam"),
    country(*b"MY", "Malaysia", 3.8, 109.7, "apac"),
    country(*b"NG", "Nigeria", 9.6, 8.1, "afr"),
    country(*b"NI", "Nicaragua", 12.9, -85.0, "sam"),
    country(*b"NL", "Netherlands", 52.2, 5.3, "weur"),
    country(*b"NO", "Norway", 61.0, 9.1, "weur"),
    country(*b"NP", "Nepal", 28.3, 83.9, "apac"),
    country(*b"NZ", "New Zealand", -42.0, 172.0, "oc"),
    country(*b"OM", "Oman", 20.6, 56.1, "me"),
    country(*b"PA", "Panama", 8.5, -80.1, "sam"),
    country(*b"PE", "Peru", -9.2, -74.4, "sam"),
    country(*b"PH", "Philippines", 11.8, 122.9, "apac"),
    country(*b"PK", "Pakistan", 29.9, 69.4, "me"),
    country(*b"PL", "Poland", 52.1, 19.4, "eeur"),
    country(*b"PT", "Portugal", 39.6, -8.0, "weur"),
    country(*b"PY", "Paraguay", -23.2, -58.4, "sam"),
    country(*b"QA", "Qatar", 25.3, 51.2, "me"),
    country(*b"RO", "Romania", 45.8, 25.0, "eeur"),
    country(*b"RS", "Serbia", 44.2, 20.8, "eeur"),
    country(*b"RU", "Russia", 61.5, 97.7, "eeur"),
    country(*b"SA", "Saudi Arabia", 24.1, 44.5, "me"),
    country(*b"SE", "Sweden", 62.8, 16.7, "weur"),
    country(*b"SG", "Singapore", 1.4, 103.8, "apac"),
    country(*b"SI", "Slovenia", 46.1, 14.8, "eeur"),
    country(*b"SK", "Slovakia", 48.7, 19.5, "eeur"),
    country(*b"SV", "El Salvador", 13.7, -88.9, "sam"),
    country(*b"TH", "Thailand", 15.1, 101.0, "apac"),
    country(*b"TN", "Tunisia", 34.1, 9.6, "afr"),
    country(*b"TR", "Turkey", 39.0, 35.4, "eeur"),
    country(*b"TW", "Taiwan", 23.8, 121.0, "apac"),
    country(*b"TZ", "Tanzania", -6.3, 34.8, "afr"),
    country(*b"UA", "Ukraine", 49.0, 31.4, "eeur"),
    country(*b"US", "United States", 39.4, -98.9, "enam"),
    country(*b"UY", "Uruguay", -32.8, -56.0, "sam"),
    country(*b"UZ", "Uzbekistan", 41.8, 63.1, "eeur"),
    country(*b"VE", "Venezuela", 7.1, -66.2, "sam"),
    country(*b"VN", "Vietnam", 16.6, 106.3, "apac"),
    country(*b"ZA", "South Africa", -29.0, 25.1, "afr"),
    country(*b"ZM", "Zambia", -13.5, 27.8, "afr"),
    country(*b"ZW", "Zimbabwe", -19.0, 29.9, "afr"),
];
