//! Target assignment and post-processing configuration.

use crate::{
    common::*, AnchorGeneratorInit, BoxCoderInit, Error, LabelSamplerInit, MatcherInit,
    NonMaxSuppressionInit, PostProcessor, PostProcessorInit, TargetAssigner, TargetAssignerInit,
};

/// The main configuration. Every section falls back to its defaults when
/// omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub anchor: AnchorConfig,
    pub matcher: MatcherInit,
    pub sampler: LabelSamplerInit,
    pub box_coder: BoxCoderInit,
    pub nms: NonMaxSuppressionInit,
    pub postprocess: PostProcessConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("unable to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn target_assigner_init(&self) -> TargetAssignerInit {
        let AnchorConfig {
            stride,
            ref scales,
            ref ratios,
            allowed_border,
        } = self.anchor;

        TargetAssignerInit {
            anchor: AnchorGeneratorInit {
                stride,
                scales: scales.clone(),
                ratios: ratios.clone(),
            },
            matcher: self.matcher.clone(),
            sampler: self.sampler.clone(),
            box_coder: self.box_coder.clone(),
            allowed_border,
        }
    }

    pub fn target_assigner(&self) -> Result<TargetAssigner> {
        self.target_assigner_init().build()
    }

    pub fn postprocessor_init(&self) -> PostProcessorInit {
        let PostProcessConfig {
            clip_to_image,
            min_size,
        } = self.postprocess;

        PostProcessorInit {
            box_coder: self.box_coder.clone(),
            nms: self.nms.clone(),
            clip_to_image,
            min_size,
        }
    }

    pub fn postprocessor(&self) -> Result<PostProcessor> {
        self.postprocessor_init().build()
    }

    /// Build every component once to surface configuration errors early.
    pub fn validate(&self) -> Result<()> {
        self.target_assigner()?;
        self.postprocessor()?;
        Ok(())
    }
}

/// Anchor generation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnchorConfig {
    /// Pixels per feature map cell.
    pub stride: R64,
    /// Anchor sizes in pixels.
    pub scales: Vec<R64>,
    /// Width over height ratios.
    pub ratios: Vec<R64>,
    /// Anchors crossing the image border by more than this many pixels are
    /// ignored in training.
    pub allowed_border: Option<R64>,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        let AnchorGeneratorInit {
            stride,
            scales,
            ratios,
        } = AnchorGeneratorInit::default();

        Self {
            stride,
            scales,
            ratios,
            allowed_border: None,
        }
    }
}

/// Detection output options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostProcessConfig {
    pub clip_to_image: bool,
    pub min_size: R64,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        let PostProcessorInit {
            clip_to_image,
            min_size,
            ..
        } = PostProcessorInit::default();

        Self {
            clip_to_image,
            min_size,
        }
    }
}

impl std::str::FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let config: Self = json5::from_str(text)
            .map_err(|err| Error::config(format!("unable to parse config: {}", err)))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = "{}".parse().unwrap();
        assert_eq!(config.anchor.stride, 16.0);
        assert_eq!(config.sampler.num_samples, 256);
        assert!(config.postprocess.clip_to_image);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections() {
        let config: Config = r#"{
            matcher: { high_threshold: 0.6, low_quality: "nearest" },
            nms: { iou_threshold: 0.5, class_aware: true },
        }"#
        .parse()
        .unwrap();
        assert_eq!(config.matcher.high_threshold, 0.6);
        assert_eq!(config.matcher.low_threshold, 0.3);
        assert!(config.nms.class_aware);
        config.validate().unwrap();
    }

    #[test]
    fn reject_unknown_fields() {
        assert!("{ matcher: { high: 0.6 } }".parse::<Config>().is_err());
    }

    #[test]
    fn invalid_values_fail_at_build() {
        let config: Config = "{ nms: { iou_threshold: 1.5 } }".parse().unwrap();
        let err = config.postprocessor().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidConfiguration(_))
        ));
    }
}
