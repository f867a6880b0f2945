//! Turn raw proposal network output into detections.

use crate::{common::*, BoxCoder, BoxCoderInit, Error, NonMaxSuppression, NonMaxSuppressionInit};

#[derive(Debug, Clone)]
pub struct PostProcessorInit {
    pub box_coder: BoxCoderInit,
    pub nms: NonMaxSuppressionInit,
    /// Clip decoded boxes into the image.
    pub clip_to_image: bool,
    /// Boxes with height or width below this are dropped before suppression.
    pub min_size: R64,
}

impl Default for PostProcessorInit {
    fn default() -> Self {
        Self {
            box_coder: Default::default(),
            nms: Default::default(),
            clip_to_image: true,
            min_size: r64(0.0),
        }
    }
}

impl PostProcessorInit {
    pub fn build(self) -> Result<PostProcessor> {
        let Self {
            box_coder,
            nms,
            clip_to_image,
            min_size,
        } = self;

        ensure!(
            min_size >= 0.0,
            Error::config("min_size must be non-negative")
        );

        Ok(PostProcessor {
            coder: box_coder.build()?,
            nms: nms.build()?,
            clip_to_image,
            min_size: min_size.raw(),
        })
    }
}

/// Per-anchor network output of one image.
#[derive(Debug, Clone)]
pub struct RawDetections<'a> {
    /// `[N, 4]` deltas ordered `[dy, dx, dh, dw]`.
    pub deltas: ArrayView2<'a, f64>,
    /// `[N, C]` class probabilities. Column 0 is background unless `C` is 1,
    /// in which case the only column is the objectness score.
    pub class_probs: ArrayView2<'a, f64>,
    /// Optional `[N, K]` per-box uncertainty.
    pub uncertainty: Option<ArrayView2<'a, f64>>,
}

#[derive(Debug, Clone)]
pub struct PostProcessor {
    coder: BoxCoder,
    nms: NonMaxSuppression,
    clip_to_image: bool,
    min_size: f64,
}

impl PostProcessor {
    /// Decode, filter and suppress detections.
    ///
    /// The output has `boxes` (`[M, 4]` TLBR), `scores` (`[M]`), `class`
    /// (`[M]`) and, when given, `uncertainty` (`[M, K]`) fields in descending
    /// score order.
    pub fn process<A>(
        &self,
        anchors: &[A],
        image_size: HW<usize>,
        output: &RawDetections<'_>,
    ) -> Result<Instances>
    where
        A: Rect<Type = f64>,
    {
        let RawDetections {
            deltas,
            class_probs,
            uncertainty,
        } = output;
        let num_anchors = anchors.len();

        let (num_rows, num_classes) = class_probs.dim();
        ensure!(
            num_rows == num_anchors,
            Error::ShapeMismatch {
                what: "number of class probability rows",
                expect: num_anchors,
                actual: num_rows,
            }
        );
        ensure!(
            num_classes >= 1,
            Error::ShapeMismatch {
                what: "number of class probability columns",
                expect: 1,
                actual: num_classes,
            }
        );
        if let Some(uncertainty) = uncertainty {
            ensure!(
                uncertainty.nrows() == num_anchors,
                Error::ShapeMismatch {
                    what: "number of uncertainty rows",
                    expect: num_anchors,
                    actual: uncertainty.nrows(),
                }
            );
        }

        let boxes: Vec<TLBR<f64>> = {
            let boxes = self.coder.decode_all(anchors, deltas.view())?;
            if self.clip_to_image {
                let image_h = image_size.h() as f64;
                let image_w = image_size.w() as f64;
                boxes
                    .iter()
                    .map(|rect| rect.clamp_to(image_h, image_w))
                    .collect()
            } else {
                boxes
            }
        };

        let (scores, classes): (Vec<f64>, Vec<i64>) = class_probs
            .outer_iter()
            .map(|probs| {
                if num_classes == 1 {
                    (probs[0], 0)
                } else {
                    let (offset, score) = probs
                        .iter()
                        .skip(1)
                        .copied()
                        .enumerate()
                        .fold((0, f64::NEG_INFINITY), |best, (offset, prob)| {
                            if prob > best.1 {
                                (offset, prob)
                            } else {
                                best
                            }
                        });
                    (score, offset as i64 + 1)
                }
            })
            .unzip();

        let candidates: Vec<usize> = boxes
            .iter()
            .positions(|rect| rect.h() >= self.min_size && rect.w() >= self.min_size)
            .collect();

        let keep: Vec<usize> = {
            let boxes: Vec<_> = candidates.iter().map(|&index| boxes[index]).collect();
            let scores: Vec<_> = candidates.iter().map(|&index| scores[index]).collect();
            let classes: Vec<_> = candidates.iter().map(|&index| classes[index]).collect();
            self.nms
                .nms_indices_by_class(&boxes, &scores, &classes)?
                .into_iter()
                .map(|index| candidates[index])
                .collect()
        };
        debug!(
            "kept {} of {} proposals, {} passed the size filter",
            keep.len(),
            num_anchors,
            candidates.len()
        );

        let mut instances = Instances::new(image_size);
        instances.set(
            "boxes",
            Array2::from_shape_fn((keep.len(), 4), |(row, col)| boxes[keep[row]].tlbr()[col]),
        )?;
        instances.set(
            "scores",
            keep.iter().map(|&index| scores[index]).collect::<Array1<f64>>(),
        )?;
        instances.set(
            "class",
            keep.iter().map(|&index| classes[index]).collect::<Array1<i64>>(),
        )?;
        if let Some(uncertainty) = uncertainty {
            instances.set("uncertainty", uncertainty.select(Axis(0), &keep))?;
        }

        Ok(instances)
    }
}
