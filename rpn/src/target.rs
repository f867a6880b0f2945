//! Per-image training targets for anchors.

use crate::{
    common::*, AnchorGenerator, AnchorGeneratorInit, AnchorSet, BoxCoder, BoxCoderInit,
    FeatureShape, LabelSampler, LabelSamplerInit, MatchLabel, Matcher, MatcherInit,
};
use bbox::pairwise_iou;

#[derive(Debug, Clone, Default)]
pub struct TargetAssignerInit {
    pub anchor: AnchorGeneratorInit,
    pub matcher: MatcherInit,
    pub sampler: LabelSamplerInit,
    pub box_coder: BoxCoderInit,
    /// Anchors crossing the image border by more than this many pixels are
    /// ignored. Border crossing anchors are kept when unset.
    pub allowed_border: Option<R64>,
}

impl TargetAssignerInit {
    pub fn build(self) -> Result<TargetAssigner> {
        let Self {
            anchor,
            matcher,
            sampler,
            box_coder,
            allowed_border,
        } = self;

        if let Some(allowed_border) = allowed_border {
            ensure!(
                allowed_border >= 0.0,
                crate::Error::config("allowed_border must be non-negative")
            );
        }

        Ok(TargetAssigner {
            generator: anchor.build()?,
            matcher: matcher.build()?,
            sampler: sampler.build()?,
            coder: box_coder.build()?,
            allowed_border: allowed_border.map(|border| border.raw()),
        })
    }
}

/// Ground truth of one image in a batch.
#[derive(Debug, Clone)]
pub struct ImageLabels<C> {
    pub feature_shape: FeatureShape,
    pub image_size: HW<usize>,
    pub labels: Vec<Label<TLBR<f64>, C>>,
}

/// Targets aligned with the anchor order.
#[derive(Debug, Clone)]
pub struct RpnTargets<C = usize> {
    pub anchors: Arc<AnchorSet>,
    /// Sampled labels. Unsampled anchors are `Ignore`.
    pub labels: Vec<MatchLabel>,
    /// `[num_anchors, 4]` deltas, zero except at sampled positives. It is
    /// `[0, 4]` when the image has no ground truth.
    pub regression_targets: Array2<f64>,
    /// Class of the matched ground truth at sampled positives.
    pub class_targets: Vec<Option<C>>,
}

impl<C> RpnTargets<C> {
    /// Objectness targets, 1 for positive, 0 for background and -1 for ignored
    /// anchors.
    pub fn loss_labels(&self) -> Array1<i64> {
        self.labels
            .iter()
            .map(|label| match label {
                MatchLabel::Positive(_) => 1,
                MatchLabel::Background => 0,
                MatchLabel::Ignore => -1,
            })
            .collect()
    }

    /// Indices of anchors that take part in the loss.
    pub fn used_indices(&self) -> Vec<usize> {
        self.labels
            .iter()
            .positions(|label| !label.is_ignore())
            .collect()
    }

    pub fn positive_indices(&self) -> Vec<usize> {
        self.labels
            .iter()
            .positions(|label| label.is_positive())
            .collect()
    }

    pub fn num_positives(&self) -> usize {
        self.labels.iter().filter(|label| label.is_positive()).count()
    }

    pub fn num_negatives(&self) -> usize {
        self.labels
            .iter()
            .filter(|label| label.is_background())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct TargetAssigner {
    generator: AnchorGenerator,
    matcher: Matcher,
    sampler: LabelSampler,
    coder: BoxCoder,
    allowed_border: Option<f64>,
}

impl TargetAssigner {
    pub fn generator(&self) -> &AnchorGenerator {
        &self.generator
    }

    pub fn coder(&self) -> &BoxCoder {
        &self.coder
    }

    /// Targets for the anchors of a feature map.
    pub fn assign<C, G>(
        &self,
        feature_shape: &FeatureShape,
        image_size: HW<usize>,
        gts: &[Label<TLBR<f64>, C>],
        rng: &mut G,
    ) -> Result<RpnTargets<C>>
    where
        C: Copy,
        G: Rng + ?Sized,
    {
        let anchors = self.generator.anchors_for(feature_shape)?;
        self.assign_with_anchors(anchors, image_size, gts, rng)
    }

    /// Targets for an explicit anchor set.
    pub fn assign_with_anchors<C, G>(
        &self,
        anchors: Arc<AnchorSet>,
        image_size: HW<usize>,
        gts: &[Label<TLBR<f64>, C>],
        rng: &mut G,
    ) -> Result<RpnTargets<C>>
    where
        C: Copy,
        G: Rng + ?Sized,
    {
        let gt_rects: Vec<TLBR<f64>> = gts.iter().map(|gt| gt.rect).collect();
        let mut iou = pairwise_iou(anchors.anchors(), &gt_rects);

        let inside = self
            .allowed_border
            .map(|border| anchors.inside_mask(image_size, border));
        if let Some(inside) = &inside {
            for (mut row, _) in iou
                .outer_iter_mut()
                .zip(inside)
                .filter(|(_, &inside)| !inside)
            {
                row.fill(0.0);
            }
        }

        let mut labels = self
            .matcher
            .match_boxes_with_iou(anchors.anchors(), &gt_rects, iou.view());
        if let Some(inside) = &inside {
            for (label, _) in labels.iter_mut().zip(inside).filter(|(_, &inside)| !inside) {
                *label = MatchLabel::Ignore;
            }
        }

        let labels = self.sampler.sample(&labels, rng);

        let regression_targets = if gts.is_empty() {
            Array2::zeros((0, 4))
        } else {
            let mut targets = Array2::zeros((anchors.len(), 4));
            for (anchor_index, gt_index) in labels
                .iter()
                .enumerate()
                .filter_map(|(anchor_index, label)| Some((anchor_index, label.gt_index()?)))
            {
                let deltas = self
                    .coder
                    .encode(&anchors.anchors()[anchor_index], &gt_rects[gt_index])
                    .with_context(|| {
                        format!(
                            "unable to encode ground truth {} against anchor {}",
                            gt_index, anchor_index
                        )
                    })?;
                targets
                    .row_mut(anchor_index)
                    .assign(&ArrayView1::from(&deltas[..]));
            }
            targets
        };

        let class_targets = labels
            .iter()
            .map(|label| label.gt_index().map(|gt_index| gts[gt_index].class))
            .collect();

        let targets = RpnTargets {
            anchors,
            labels,
            regression_targets,
            class_targets,
        };
        debug!(
            "assigned {} positive and {} negative anchors for {} ground truth boxes",
            targets.num_positives(),
            targets.num_negatives(),
            gts.len()
        );

        Ok(targets)
    }

    /// Assign targets for a batch in parallel.
    ///
    /// Image `i` samples with an RNG seeded by `seed + i`, so the output does
    /// not depend on scheduling.
    pub fn assign_batch<C>(
        &self,
        items: &[ImageLabels<C>],
        seed: u64,
    ) -> Result<Vec<RpnTargets<C>>>
    where
        C: Copy + Send + Sync,
    {
        items
            .par_iter()
            .enumerate()
            .map(|(index, item)| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                self.assign(&item.feature_shape, item.image_size, &item.labels, &mut rng)
                    .with_context(|| format!("unable to assign targets for image {}", index))
            })
            .collect()
    }
}
