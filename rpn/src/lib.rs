//! Anchor target assignment, box coding and suppression for region proposal
//! networks.
//!
//! Boxes are TLBR `(y1, x1, y2, x2)` in pixels. Regression deltas are ordered
//! `[dy, dx, dh, dw]`.

mod common;

pub mod anchor;
pub mod coder;
pub mod config;
pub mod error;
pub mod matcher;
pub mod nms;
pub mod postprocess;
pub mod sampler;
pub mod target;

pub use anchor::*;
pub use coder::*;
pub use config::Config;
pub use error::Error;
pub use matcher::*;
pub use nms::*;
pub use postprocess::*;
pub use sampler::*;
pub use target::*;
