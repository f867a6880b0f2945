//! Safe bounding box types and functions.
//!
//! Boxes are kept in pixel units. The canonical ordering is TLBR, that is
//! `(t, l, b, r)` = `(y1, x1, y2, x2)`.

mod common;

pub mod error;
pub use error::*;

pub use rect::*;
pub mod rect;

pub use tlbr::*;
pub mod tlbr;

pub use cycxhw::*;
pub mod cycxhw;

pub use hw::*;
pub mod hw;

pub use iou::*;
pub mod iou;

pub mod prelude {
    pub use crate::rect::{Rect, RectFloat, RectNum};
}
