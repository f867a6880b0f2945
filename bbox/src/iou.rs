use crate::{common::*, Rect, RectFloat};

/// Compute the `[lhs.len(), rhs.len()]` matrix of IoU scores.
///
/// The entry at `(i, j)` is the IoU of `lhs[i]` and `rhs[j]`. Empty inputs
/// produce an empty matrix.
pub fn pairwise_iou<A, B, T>(lhs: &[A], rhs: &[B]) -> Array2<T>
where
    A: Rect<Type = T>,
    B: Rect<Type = T>,
    T: Float + Debug,
{
    Array2::from_shape_fn((lhs.len(), rhs.len()), |(row, col)| {
        lhs[row].iou_with(&rhs[col])
    })
}
