//! Click aggregation.
//!
//! Pure, synchronous transforms from raw click logs into time buckets,
//! ranked categories and uniqueness figures.

pub mod categories;
pub mod timeseries;
pub mod uniques;

pub use categories::*;
pub use timeseries::*;
pub use uniques::*;
