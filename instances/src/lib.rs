//! Per-image records of parallel per-instance fields.

mod common;

pub mod error;
pub use error::*;

pub mod field;
pub use field::*;

pub mod instances;
pub use self::instances::*;
