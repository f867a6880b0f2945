//! Balanced positive and negative anchor sampling.

use crate::{common::*, Error, MatchLabel};
use rand::seq::index;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelSamplerInit {
    /// Maximum number of sampled anchors per image.
    pub num_samples: usize,
    /// Target share of positives among the samples.
    pub positive_fraction: R64,
}

impl Default for LabelSamplerInit {
    fn default() -> Self {
        Self {
            num_samples: 256,
            positive_fraction: r64(0.5),
        }
    }
}

impl LabelSamplerInit {
    pub fn build(self) -> Result<LabelSampler> {
        let Self {
            num_samples,
            positive_fraction,
        } = self;

        ensure!(num_samples > 0, Error::config("num_samples must be positive"));
        ensure!(
            (0.0..=1.0).contains(&positive_fraction.raw()),
            Error::config(format!(
                "positive_fraction must be in range [0, 1], but get {}",
                positive_fraction
            ))
        );

        Ok(LabelSampler {
            num_samples,
            positive_fraction: positive_fraction.raw(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LabelSampler {
    num_samples: usize,
    positive_fraction: f64,
}

impl LabelSampler {
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Upper bound of sampled positives.
    pub fn max_positives(&self) -> usize {
        (self.num_samples as f64 * self.positive_fraction).round() as usize
    }

    /// Keep a random balanced subset of positive and background anchors.
    /// Everything else becomes `Ignore`.
    ///
    /// Missing positives are not made up with extra negatives beyond
    /// `num_samples`.
    pub fn sample<G>(&self, labels: &[MatchLabel], rng: &mut G) -> Vec<MatchLabel>
    where
        G: Rng + ?Sized,
    {
        let (positives, negatives): (Vec<usize>, Vec<usize>) = {
            let positives = labels
                .iter()
                .positions(|label| label.is_positive())
                .collect();
            let negatives = labels
                .iter()
                .positions(|label| label.is_background())
                .collect();
            (positives, negatives)
        };

        let num_pos = positives.len().min(self.max_positives());
        let num_neg = negatives.len().min(self.num_samples - num_pos);

        let mut sampled = vec![MatchLabel::Ignore; labels.len()];
        index::sample(rng, positives.len(), num_pos)
            .into_iter()
            .map(|pick| positives[pick])
            .for_each(|anchor_index| sampled[anchor_index] = labels[anchor_index]);
        index::sample(rng, negatives.len(), num_neg)
            .into_iter()
            .map(|pick| negatives[pick])
            .for_each(|anchor_index| sampled[anchor_index] = MatchLabel::Background);

        debug!(
            "sampled {} of {} positives and {} of {} negatives",
            num_pos,
            positives.len(),
            num_neg,
            negatives.len()
        );

        sampled
    }
}
