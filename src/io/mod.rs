//! Input/output helpers.
//!
//! - CSV and line-oriented ingest (`ingest`)
//! - residual CSV export (`export`)
//! - fit report JSON read/write (`report`)

pub mod export;
pub mod ingest;
pub mod report;

pub use export::*;
pub use ingest::*;
pub use report::*;
