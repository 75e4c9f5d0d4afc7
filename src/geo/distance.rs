//! Precomputed great-circle distances between every pair of known countries.
//!
//! The table is built once on first access from the static country table and
//! frozen afterwards, so lookups are a single hash probe with no locking.
//! Distances use each country's representative point, which is an
//! approximation intended for gateway locality ranking, not per-request
//! geolocation.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::country::{Alpha2CountryCode, COUNTRIES};

/// Sentinel reported when either side of a lookup is unknown. Slightly above
/// the largest possible great-circle distance on Earth, so unknown pairs sort
/// behind every real one.
pub const MAX_DISTANCE_KM: f64 = 20_100.0;

const EARTH_RADIUS_KM: f64 = 6_371.0;

static DISTANCE_TABLE: LazyLock<HashMap<u32, f64>> = LazyLock::new(build_table);

/// O(1) distance lookups between country codes.
///
/// Zero-sized handle over the process-wide frozen table; constructing one is
/// free and all consumers observe the same data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceLookup;

impl DistanceLookup {
    /// Create a lookup handle, forcing table construction so later lookups
    /// never pay the build cost.
    pub fn new() -> Self {
        LazyLock::force(&DISTANCE_TABLE);
        Self
    }

    /// Distance in kilometers between the representative points of `a` and
    /// `b`, or `None` when either code is not in the reference table.
    ///
    /// Symmetric under operand swap: the table key normalizes operand order.
    pub fn try_distance_between(self, a: Alpha2CountryCode, b: Alpha2CountryCode) -> Option<f64> {
        DISTANCE_TABLE.get(&pair_key(a, b)).copied()
    }

    /// Like [`Self::try_distance_between`] but reporting
    /// [`MAX_DISTANCE_KM`] for unknown pairs instead of failing.
    pub fn distance_between_or_max(self, a: Alpha2CountryCode, b: Alpha2CountryCode) -> f64 {
        self.try_distance_between(a, b).unwrap_or(MAX_DISTANCE_KM)
    }
}

/// Order-independent key for an unordered pair of country codes.
///
/// The smaller 16-bit code point always occupies the high half, so
/// `pair_key(a, b) == pair_key(b, a)` for all codes.
pub fn pair_key(a: Alpha2CountryCode, b: Alpha2CountryCode) -> u32 {
    let (lo, hi) = if a.code_point() <= b.code_point() {
        (a.code_point(), b.code_point())
    } else {
        (b.code_point(), a.code_point())
    };
    (u32::from(lo) << 16) | u32::from(hi)
}

fn build_table() -> HashMap<u32, f64> {
    let n = COUNTRIES.len();
    // C(n, 2) cross pairs plus n zero-distance self pairs.
    let mut table = HashMap::with_capacity(n * (n + 1) / 2);

    for (i, a) in COUNTRIES.iter().enumerate() {
        table.insert(pair_key(a.code, a.code), 0.0);
        for b in &COUNTRIES[i + 1..] {
            let distance = haversine_km(a.latitude, a.longitude, b.latitude, b.longitude);
            table.insert(pair_key(a.code, b.code), distance);
        }
    }

    table
}

/// Great-circle distance between two coordinates using the haversine formula.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(value: &str) -> Alpha2CountryCode {
        value.parse().unwrap()
    }

    #[test]
    fn self_distance_is_zero_for_every_country() {
        let lookup = DistanceLookup::new();
        for info in COUNTRIES {
            assert_eq!(lookup.try_distance_between(info.code, info.code), Some(0.0));
        }
    }

    #[test]
    fn distance_is_symmetric_for_every_pair() {
        let lookup = DistanceLookup::new();
        for a in COUNTRIES {
            for b in COUNTRIES {
                assert_eq!(
                    lookup.try_distance_between(a.code, b.code),
                    lookup.try_distance_between(b.code, a.code),
                    "asymmetric distance for {}/{}",
                    a.code,
                    b.code
                );
            }
        }
    }

    #[test]
    fn pair_key_is_order_independent() {
        for a in COUNTRIES {
            for b in COUNTRIES {
                assert_eq!(pair_key(a.code, b.code), pair_key(b.code, a.code));
            }
        }
    }

    #[test]
    fn unknown_codes_fail_with_sentinel() {
        let lookup = DistanceLookup::new();
        let unknown = Alpha2CountryCode::UNKNOWN;
        let known = code("US");

        assert_eq!(lookup.try_distance_between(unknown, known), None);
        assert_eq!(lookup.try_distance_between(known, unknown), None);
        assert_eq!(lookup.try_distance_between(unknown, unknown), None);
        assert_eq!(
            lookup.distance_between_or_max(unknown, known),
            MAX_DISTANCE_KM
        );
    }

    #[test]
    fn transatlantic_distance_is_plausible() {
        let lookup = DistanceLookup::new();
        let distance = lookup.try_distance_between(code("US"), code("GB")).unwrap();
        // Representative-point distance, so allow a generous band.
        assert!(
            (6_000.0..8_500.0).contains(&distance),
            "unexpected US-GB distance {distance}"
        );
    }

    #[test]
    fn neighbors_are_closer_than_antipodes() {
        let lookup = DistanceLookup::new();
        let de_nl = lookup.try_distance_between(code("DE"), code("NL")).unwrap();
        let de_nz = lookup.try_distance_between(code("DE"), code("NZ")).unwrap();
        assert!(de_nl < 1_000.0);
        assert!(de_nz > 15_000.0);
        assert!(de_nz < MAX_DISTANCE_KM);
    }
}
