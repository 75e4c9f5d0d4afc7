//! Static geographic reference data and the precomputed distance table used
//! for gateway locality decisions.

pub mod country;
pub mod distance;

pub use country::{Alpha2CountryCode, CountryInfo};
pub use distance::{DistanceLookup, MAX_DISTANCE_KM};
