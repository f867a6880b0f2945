use crate::common::*;
use thiserror::Error;

/// The error raised when a box violates the `t <= b && l <= r` invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("invalid geometry: {reason}, but get {values}")]
    InvalidGeometry {
        reason: &'static str,
        values: String,
    },
}

impl GeometryError {
    pub fn invalid(reason: &'static str, values: impl Debug) -> Self {
        Self::InvalidGeometry {
            reason,
            values: format!("{:?}", values),
        }
    }
}
