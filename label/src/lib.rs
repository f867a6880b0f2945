//! Ground truth labels and their validation at the loading boundary.

use anyhow::{ensure, Result};
use bbox::{Rect, TLBR};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label<R, C>
where
    R: Rect,
{
    pub rect: R,
    pub class: C,
}

/// Column ordering of raw box rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxFormat {
    /// `(y1, x1, y2, x2)`, the workspace convention.
    Tlbr,
    /// `(x1, y1, x2, y2)`.
    Xyxy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("shape mismatch: {what}, expect {expect}, but get {actual}")]
    ShapeMismatch {
        what: &'static str,
        expect: usize,
        actual: usize,
    },
    #[error("invalid geometry in label {index}: {reason}")]
    InvalidGeometry { index: usize, reason: String },
}

/// Validate raw `[N, 4]` box rows and pair them with class ids.
///
/// Every row must satisfy `y1 <= y2` and `x1 <= x2` after reordering into TLBR.
/// An empty input is a valid image without objects.
pub fn labels_from_rows<C>(
    rows: ArrayView2<'_, f64>,
    classes: &[C],
    format: BoxFormat,
) -> Result<Vec<Label<TLBR<f64>, C>>>
where
    C: Copy,
{
    let (num_rows, num_cols) = rows.dim();
    ensure!(
        num_cols == 4,
        LabelError::ShapeMismatch {
            what: "box row width",
            expect: 4,
            actual: num_cols,
        }
    );
    ensure!(
        num_rows == classes.len(),
        LabelError::ShapeMismatch {
            what: "number of class ids",
            expect: num_rows,
            actual: classes.len(),
        }
    );

    rows.outer_iter()
        .zip(classes)
        .enumerate()
        .map(|(index, (row, &class))| -> Result<_> {
            let values = [row[0], row[1], row[2], row[3]];
            let rect = match format {
                BoxFormat::Tlbr => TLBR::try_from_tlbr(values),
                BoxFormat::Xyxy => TLBR::try_from_xyxy(values),
            }
            .map_err(|err| LabelError::InvalidGeometry {
                index,
                reason: err.to_string(),
            })?;
            Ok(Label { rect, class })
        })
        .collect()
}
