//! Common types used throughout the bulk pipeline.
//!
//! Re-exports the column value model and the materialized row buffer.

mod operation;
mod row;
mod value;

pub use operation::*;
pub use row::*;
pub use value::*;
