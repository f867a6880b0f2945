//! Greedy non-maximum suppression.

use crate::{common::*, Error};
use ndarray::Ix2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NonMaxSuppressionInit {
    /// Boxes overlapping a kept box by more than this are dropped.
    pub iou_threshold: R64,
    /// Boxes scoring below this are dropped before suppression.
    pub score_threshold: Option<R64>,
    /// Maximum number of kept boxes.
    pub max_detections: Option<usize>,
    /// Suppress only among boxes of the same class.
    pub class_aware: bool,
}

impl Default for NonMaxSuppressionInit {
    fn default() -> Self {
        Self {
            iou_threshold: r64(0.7),
            score_threshold: None,
            max_detections: None,
            class_aware: false,
        }
    }
}

impl NonMaxSuppressionInit {
    pub fn build(self) -> Result<NonMaxSuppression> {
        let Self {
            iou_threshold,
            score_threshold,
            max_detections,
            class_aware,
        } = self;

        ensure!(
            iou_threshold > 0.0 && iou_threshold < 1.0,
            Error::config(format!(
                "iou_threshold must be in range (0, 1), but get {}",
                iou_threshold
            ))
        );
        if let Some(score_threshold) = score_threshold {
            ensure!(
                (0.0..=1.0).contains(&score_threshold.raw()),
                Error::config(format!(
                    "score_threshold must be in range [0, 1], but get {}",
                    score_threshold
                ))
            );
        }
        ensure!(
            max_detections != Some(0),
            Error::config("max_detections must be positive")
        );

        Ok(NonMaxSuppression {
            iou_threshold: iou_threshold.raw(),
            score_threshold: score_threshold.map(|threshold| threshold.raw()),
            max_detections,
            class_aware,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NonMaxSuppression {
    iou_threshold: f64,
    score_threshold: Option<f64>,
    max_detections: Option<usize>,
    class_aware: bool,
}

impl NonMaxSuppression {
    pub fn is_class_aware(&self) -> bool {
        self.class_aware
    }

    /// Indices of kept boxes in descending score order. Equal scores keep the
    /// lower index first.
    ///
    /// A box is dropped only when its IoU with a kept box is strictly greater
    /// than the threshold. Classes are ignored.
    pub fn nms_indices<R>(&self, boxes: &[R], scores: &[f64]) -> Result<Vec<usize>>
    where
        R: Rect<Type = f64>,
    {
        self.check_inputs(boxes, scores)?;
        let mut keep = self.suppress(boxes, scores, self.candidates(scores));
        self.truncate(&mut keep);
        Ok(keep)
    }

    /// Like [nms_indices](Self::nms_indices), but suppresses per class when the
    /// suppressor is class aware.
    pub fn nms_indices_by_class<R>(
        &self,
        boxes: &[R],
        scores: &[f64],
        classes: &[i64],
    ) -> Result<Vec<usize>>
    where
        R: Rect<Type = f64>,
    {
        if !self.class_aware {
            return self.nms_indices(boxes, scores);
        }

        self.check_inputs(boxes, scores)?;
        ensure!(
            classes.len() == boxes.len(),
            Error::ShapeMismatch {
                what: "number of class ids",
                expect: boxes.len(),
                actual: classes.len(),
            }
        );

        let mut keep: Vec<usize> = self
            .candidates(scores)
            .into_iter()
            .map(|index| (classes[index], index))
            .into_group_map()
            .into_values()
            .flat_map(|candidates| self.suppress(boxes, scores, candidates))
            .collect();
        keep.sort_by(|&lhs, &rhs| by_score(scores, lhs, rhs));
        self.truncate(&mut keep);
        Ok(keep)
    }

    /// Keep a subset of detections.
    ///
    /// `instances` must have a `[N, 4]` TLBR `boxes` field and an `[N]`
    /// `scores` field. Class aware suppression also reads the `[N]` `class`
    /// field.
    pub fn suppress_instances(&self, instances: &Instances) -> Result<Instances> {
        if instances.is_empty() {
            return Ok(instances.clone());
        }

        let boxes = boxes_from_field(instances.get("boxes")?)?;
        let scores = vector_from_field(instances.get("scores")?, "scores")?;
        let keep = if self.class_aware {
            let classes: Vec<i64> = vector_from_field(instances.get("class")?, "class")?
                .into_iter()
                .map(|class| class as i64)
                .collect();
            self.nms_indices_by_class(&boxes, &scores, &classes)?
        } else {
            self.nms_indices(&boxes, &scores)?
        };

        debug!("kept {} of {} detections", keep.len(), boxes.len());
        instances.select(&keep)
    }

    fn check_inputs<R>(&self, boxes: &[R], scores: &[f64]) -> Result<()> {
        ensure!(
            scores.len() == boxes.len(),
            Error::ShapeMismatch {
                what: "number of scores",
                expect: boxes.len(),
                actual: scores.len(),
            }
        );
        if let Some((index, score)) = scores
            .iter()
            .enumerate()
            .find(|(_, score)| !score.is_finite())
        {
            return Err(Error::InvalidScore {
                index,
                score: score.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn candidates(&self, scores: &[f64]) -> Vec<usize> {
        match self.score_threshold {
            Some(threshold) => scores.iter().positions(|&score| score >= threshold).collect(),
            None => (0..scores.len()).collect(),
        }
    }

    fn suppress<R>(&self, boxes: &[R], scores: &[f64], mut candidates: Vec<usize>) -> Vec<usize>
    where
        R: Rect<Type = f64>,
    {
        candidates.sort_by(|&lhs, &rhs| by_score(scores, lhs, rhs));

        let mut suppressed = vec![false; boxes.len()];
        let mut keep = vec![];

        for (position, &index) in candidates.iter().enumerate() {
            if suppressed[index] {
                continue;
            }
            keep.push(index);

            let kept = &boxes[index];
            for &other in &candidates[(position + 1)..] {
                if !suppressed[other] && kept.iou_with(&boxes[other]) > self.iou_threshold {
                    suppressed[other] = true;
                }
            }
        }

        keep
    }

    fn truncate(&self, keep: &mut Vec<usize>) {
        if let Some(max_detections) = self.max_detections {
            keep.truncate(max_detections);
        }
    }
}

/// Descending score, then ascending index.
fn by_score(scores: &[f64], lhs: usize, rhs: usize) -> Ordering {
    r64(scores[rhs])
        .cmp(&r64(scores[lhs]))
        .then_with(|| lhs.cmp(&rhs))
}

pub(crate) fn boxes_from_field(field: &Field) -> Result<Vec<TLBR<f64>>> {
    let array = field
        .as_array()
        .ok_or_else(|| Error::geometry("the boxes field must be a numeric array"))?
        .to_f64()
        .into_dimensionality::<Ix2>()
        .map_err(|_| Error::geometry("the boxes field must be a [N, 4] array"))?;
    ensure!(
        array.ncols() == 4,
        Error::ShapeMismatch {
            what: "box row width",
            expect: 4,
            actual: array.ncols(),
        }
    );

    array
        .outer_iter()
        .map(|row| TLBR::try_from_tlbr([row[0], row[1], row[2], row[3]]))
        .collect()
}

fn vector_from_field(field: &Field, name: &'static str) -> Result<Vec<f64>> {
    let array = field
        .as_array()
        .with_context(|| format!("the {} field must be a numeric array", name))?
        .to_f64();
    ensure!(
        array.ndim() == 1,
        Error::ShapeMismatch {
            what: name,
            expect: 1,
            actual: array.ndim(),
        }
    );
    Ok(array.iter().copied().collect())
}
