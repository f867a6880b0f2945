//! Anchor to ground truth matching by IoU.

use crate::{common::*, Error};
use bbox::pairwise_iou;

/// Per-anchor matching result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchLabel {
    /// Matched to the ground truth at this index.
    Positive(usize),
    Background,
    /// Excluded from the loss.
    Ignore,
}

impl MatchLabel {
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive(_))
    }

    pub fn is_background(&self) -> bool {
        matches!(self, Self::Background)
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, Self::Ignore)
    }

    pub fn gt_index(&self) -> Option<usize> {
        match *self {
            Self::Positive(index) => Some(index),
            _ => None,
        }
    }
}

/// How ground truth boxes without a confident match get an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowQualityMatches {
    /// No forced matches.
    Off,
    /// Each ground truth claims its best overlapping anchor. Ground truth
    /// overlapping no anchor stays unmatched.
    Overlapping,
    /// Like `Overlapping`, but ground truth overlapping no anchor claims the
    /// anchor with the nearest center.
    Nearest,
}

impl Default for LowQualityMatches {
    fn default() -> Self {
        Self::Overlapping
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherInit {
    /// Anchors with best IoU at or above this are positive.
    pub high_threshold: R64,
    /// Anchors with best IoU below this are background.
    pub low_threshold: R64,
    pub low_quality: LowQualityMatches,
}

impl Default for MatcherInit {
    fn default() -> Self {
        Self {
            high_threshold: r64(0.7),
            low_threshold: r64(0.3),
            low_quality: LowQualityMatches::default(),
        }
    }
}

impl MatcherInit {
    pub fn build(self) -> Result<Matcher> {
        let Self {
            high_threshold,
            low_threshold,
            low_quality,
        } = self;

        ensure!(
            high_threshold > 0.0 && high_threshold < 1.0,
            Error::config(format!(
                "high_threshold must be in range (0, 1), but get {}",
                high_threshold
            ))
        );
        ensure!(
            low_threshold > 0.0 && low_threshold < 1.0,
            Error::config(format!(
                "low_threshold must be in range (0, 1), but get {}",
                low_threshold
            ))
        );
        ensure!(
            low_threshold <= high_threshold,
            Error::config("low_threshold must not exceed high_threshold")
        );

        Ok(Matcher {
            high_threshold: high_threshold.raw(),
            low_threshold: low_threshold.raw(),
            low_quality,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    high_threshold: f64,
    low_threshold: f64,
    low_quality: LowQualityMatches,
}

impl Matcher {
    pub fn low_quality(&self) -> LowQualityMatches {
        self.low_quality
    }

    /// Match from an `[num_anchors, num_gt]` IoU matrix.
    ///
    /// The `Nearest` policy needs box centers and is rejected here.
    pub fn match_iou(&self, iou: ArrayView2<'_, f64>) -> Result<Vec<MatchLabel>> {
        ensure!(
            self.low_quality != LowQualityMatches::Nearest,
            Error::config("the nearest low quality policy requires match_boxes()")
        );
        ensure!(
            iou.iter().all(|score| score.is_finite()),
            Error::geometry("IoU matrix contains non-finite values")
        );
        Ok(self.assign(iou, |_| None))
    }

    /// Match anchors to ground truth boxes.
    pub fn match_boxes<A, G>(&self, anchors: &[A], gts: &[G]) -> Vec<MatchLabel>
    where
        A: Rect<Type = f64>,
        G: Rect<Type = f64>,
    {
        let iou = pairwise_iou(anchors, gts);
        self.match_boxes_with_iou(anchors, gts, iou.view())
    }

    /// Match with a precomputed `pairwise_iou(anchors, gts)`.
    pub(crate) fn match_boxes_with_iou<A, G>(
        &self,
        anchors: &[A],
        gts: &[G],
        iou: ArrayView2<'_, f64>,
    ) -> Vec<MatchLabel>
    where
        A: Rect<Type = f64>,
        G: Rect<Type = f64>,
    {
        self.assign(iou, |gt_index| {
            let gt = &gts[gt_index];
            if gt.h() <= 0.0 || gt.w() <= 0.0 {
                return None;
            }
            anchors
                .iter()
                .map(|anchor| r64(anchor.center_distance_to(gt)))
                .position_min()
        })
    }

    fn assign<F>(&self, iou: ArrayView2<'_, f64>, nearest: F) -> Vec<MatchLabel>
    where
        F: Fn(usize) -> Option<usize>,
    {
        let (num_anchors, num_gts) = iou.dim();
        if num_gts == 0 {
            return vec![MatchLabel::Background; num_anchors];
        }

        let mut labels: Vec<MatchLabel> = iou
            .outer_iter()
            .map(|row| {
                let (best_index, best_iou) = argmax(row.iter().copied());
                if best_iou >= self.high_threshold {
                    MatchLabel::Positive(best_index)
                } else if best_iou < self.low_threshold {
                    MatchLabel::Background
                } else {
                    MatchLabel::Ignore
                }
            })
            .collect();

        if num_anchors == 0 || self.low_quality == LowQualityMatches::Off {
            return labels;
        }

        // a confident positive keeps its ground truth
        let is_confident = |label: MatchLabel, anchor_index: usize| match label {
            MatchLabel::Positive(matched) => iou[[anchor_index, matched]] >= self.high_threshold,
            _ => false,
        };

        for (gt_index, column) in iou.axis_iter(Axis(1)).enumerate() {
            let (anchor_index, best_iou) = argmax(column.iter().copied());
            let anchor_index = if best_iou > 0.0 {
                anchor_index
            } else {
                let nearest = match self.low_quality {
                    LowQualityMatches::Nearest => nearest(gt_index),
                    _ => None,
                };
                match nearest {
                    Some(anchor_index) => {
                        warn!(
                            "ground truth {} overlaps no anchor, matched to nearest anchor {}",
                            gt_index, anchor_index
                        );
                        anchor_index
                    }
                    None => {
                        warn!("ground truth {} overlaps no anchor", gt_index);
                        continue;
                    }
                }
            };

            if !is_confident(labels[anchor_index], anchor_index) {
                labels[anchor_index] = MatchLabel::Positive(gt_index);
            }
        }

        labels
    }
}

/// Index and value of the maximum. The lowest index wins ties.
fn argmax(values: impl Iterator<Item = f64>) -> (usize, f64) {
    values
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_index, best), (index, value)| {
            if value > best {
                (index, value)
            } else {
                (best_index, best)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matcher(low_quality: LowQualityMatches) -> Matcher {
        MatcherInit {
            high_threshold: r64(0.7),
            low_threshold: r64(0.3),
            low_quality,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn threshold_bands() {
        let iou = array![[0.8, 0.1], [0.5, 0.0], [0.2, 0.1], [0.7, 0.0], [0.0, 0.3]];
        let labels = matcher(LowQualityMatches::Off)
            .match_iou(iou.view())
            .unwrap();
        assert_eq!(
            labels,
            [
                MatchLabel::Positive(0),
                MatchLabel::Ignore,
                MatchLabel::Background,
                MatchLabel::Positive(0),
                MatchLabel::Ignore,
            ]
        );
    }

    #[test]
    fn ties_pick_lowest_index() {
        let iou = array![[0.8, 0.8], [0.9, 0.95]];
        let labels = matcher(LowQualityMatches::Off)
            .match_iou(iou.view())
            .unwrap();
        assert_eq!(labels, [MatchLabel::Positive(0), MatchLabel::Positive(1)]);

        let iou = array![[0.4], [0.4], [0.1]];
        let labels = matcher(LowQualityMatches::Overlapping)
            .match_iou(iou.view())
            .unwrap();
        assert_eq!(
            labels,
            [
                MatchLabel::Positive(0),
                MatchLabel::Ignore,
                MatchLabel::Background
            ]
        );
    }

    #[test]
    fn no_ground_truth_is_background() {
        let iou = Array2::<f64>::zeros((5, 0));
        let labels = matcher(LowQualityMatches::Overlapping)
            .match_iou(iou.view())
            .unwrap();
        assert_eq!(labels, vec![MatchLabel::Background; 5]);
    }

    #[test]
    fn force_match_low_quality_ground_truth() {
        // neither gt reaches the high threshold anywhere
        let iou = array![[0.1, 0.0], [0.4, 0.0], [0.0, 0.2], [0.0, 0.0]];
        let labels = matcher(LowQualityMatches::Overlapping)
            .match_iou(iou.view())
            .unwrap();
        assert_eq!(
            labels,
            [
                MatchLabel::Background,
                MatchLabel::Positive(0),
                MatchLabel::Positive(1),
                MatchLabel::Background,
            ]
        );

        let labels = matcher(LowQualityMatches::Off)
            .match_iou(iou.view())
            .unwrap();
        assert_eq!(
            labels,
            [
                MatchLabel::Background,
                MatchLabel::Ignore,
                MatchLabel::Background,
                MatchLabel::Background,
            ]
        );
    }

    #[test]
    fn later_ground_truth_overrides_forced_match() {
        let iou = array![[0.5, 0.6], [0.1, 0.1]];
        let labels = matcher(LowQualityMatches::Overlapping)
            .match_iou(iou.view())
            .unwrap();
        assert_eq!(labels, [MatchLabel::Positive(1), MatchLabel::Background]);
    }

    #[test]
    fn zero_overlap_policies() {
        let anchors = vec![
            TLBR::try_from_tlbr([0.0, 0.0, 10.0, 10.0]).unwrap(),
            TLBR::try_from_tlbr([50.0, 50.0, 60.0, 60.0]).unwrap(),
        ];
        let gts = vec![TLBR::try_from_tlbr([40.0, 40.0, 45.0, 45.0]).unwrap()];

        let labels = matcher(LowQualityMatches::Overlapping).match_boxes(&anchors, &gts);
        assert_eq!(labels, [MatchLabel::Background, MatchLabel::Background]);

        let labels = matcher(LowQualityMatches::Nearest).match_boxes(&anchors, &gts);
        assert_eq!(labels, [MatchLabel::Background, MatchLabel::Positive(0)]);
    }

    #[test]
    fn nearest_policy_needs_geometry() {
        let iou = array![[0.5]];
        let err = matcher(LowQualityMatches::Nearest)
            .match_iou(iou.view())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn positives_follow_argmax() {
        let mut rng = StdRng::seed_from_u64(7);

        for low_quality in [LowQualityMatches::Off, LowQualityMatches::Overlapping] {
            let matcher = matcher(low_quality);

            for _ in 0..50 {
                let num_anchors = rng.gen_range(1..40);
                let num_gts = rng.gen_range(1..6);
                let iou =
                    Array2::from_shape_fn((num_anchors, num_gts), |_| rng.gen_range(0.0..1.0));
                let labels = matcher.match_iou(iou.view()).unwrap();

                for (anchor_index, (row, label)) in iou.outer_iter().zip(&labels).enumerate() {
                    let best = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    match *label {
                        MatchLabel::Positive(index) if best >= 0.7 => {
                            assert_eq!(row[index], best);
                            assert!(row.iter().take(index).all(|&score| score < best));
                        }
                        MatchLabel::Positive(index) => {
                            // forced onto the best anchor of its ground truth
                            assert_eq!(low_quality, LowQualityMatches::Overlapping);
                            let (best_anchor, _) = argmax(iou.column(index).iter().copied());
                            assert_eq!(best_anchor, anchor_index);
                        }
                        MatchLabel::Background => assert!(best < 0.3),
                        MatchLabel::Ignore => assert!((0.3..0.7).contains(&best)),
                    }
                }
            }
        }
    }

    #[test]
    fn forced_match_keeps_confident_positives() {
        let iou = array![[0.9, 0.2], [0.0, 0.1]];
        let labels = matcher(LowQualityMatches::Overlapping)
            .match_iou(iou.view())
            .unwrap();
        assert_eq!(labels, [MatchLabel::Positive(0), MatchLabel::Background]);
    }

    #[test]
    fn degenerate_ground_truth_is_never_forced() {
        let anchors = vec![
            TLBR::try_from_tlbr([0.0, 0.0, 10.0, 10.0]).unwrap(),
            TLBR::try_from_tlbr([20.0, 20.0, 30.0, 30.0]).unwrap(),
        ];
        let gts = vec![TLBR::try_from_tlbr([5.0, 5.0, 5.0, 8.0]).unwrap()];
        let labels = matcher(LowQualityMatches::Nearest).match_boxes(&anchors, &gts);
        assert_eq!(labels, [MatchLabel::Background, MatchLabel::Background]);
    }

    #[test]
    fn reject_invalid_thresholds() {
        let init = |high: f64, low: f64| MatcherInit {
            high_threshold: r64(high),
            low_threshold: r64(low),
            low_quality: LowQualityMatches::Off,
        };
        assert!(init(1.0, 0.3).build().is_err());
        assert!(init(0.7, 0.0).build().is_err());
        assert!(init(0.3, 0.7).build().is_err());
        assert!(init(0.5, 0.5).build().is_ok());
    }
}
