//! Bhunaksha Aggregate - land-holding categorization.
//!
//! Reads every persisted village table under a district folder, buckets
//! each parcel's total area into the standard land-holding classes and
//! writes one summary row per village to a combined CSV file.
//!
//! ```rust,ignore
//! use bhunaksha_aggregate::{aggregate_district, write_csv};
//!
//! let rows = aggregate_district("data/07 Amravati".as_ref())?;
//! write_csv(&rows, "district_data.csv".as_ref())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod category;
pub mod error;
pub mod summary;

pub use category::{categorize, BucketTotals, Category};
pub use error::{AggregateError, Result};
pub use summary::{aggregate_district, aggregate_item, aggregate_taluka, write_csv, AggregateRow};
