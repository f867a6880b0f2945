//! Anchor boxes tiled over a feature map.

use crate::{common::*, Error};

/// The grid position and shape parameters an anchor was generated from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorTag {
    pub row: usize,
    pub col: usize,
    pub stride: f64,
    pub scale: f64,
    pub ratio: f64,
    pub scale_index: usize,
    pub ratio_index: usize,
}

/// A reference box. Anchors built from raw coordinates carry no grid tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    rect: TLBR<f64>,
    tag: Option<AnchorTag>,
}

impl Anchor {
    pub fn rect(&self) -> &TLBR<f64> {
        &self.rect
    }

    pub fn tag(&self) -> Option<&AnchorTag> {
        self.tag.as_ref()
    }
}

impl From<TLBR<f64>> for Anchor {
    fn from(rect: TLBR<f64>) -> Self {
        Self { rect, tag: None }
    }
}

impl Rect for Anchor {
    type Type = f64;

    fn t(&self) -> f64 {
        self.rect.t()
    }

    fn l(&self) -> f64 {
        self.rect.l()
    }

    fn b(&self) -> f64 {
        self.rect.b()
    }

    fn r(&self) -> f64 {
        self.rect.r()
    }

    fn cy(&self) -> f64 {
        self.rect.cy()
    }

    fn cx(&self) -> f64 {
        self.rect.cx()
    }

    fn h(&self) -> f64 {
        self.rect.h()
    }

    fn w(&self) -> f64 {
        self.rect.w()
    }

    fn try_from_tlbr(tlbr: [f64; 4]) -> Result<Self> {
        Ok(TLBR::try_from_tlbr(tlbr)?.into())
    }

    fn try_from_tlhw(tlhw: [f64; 4]) -> Result<Self> {
        Ok(TLBR::try_from_tlhw(tlhw)?.into())
    }

    fn try_from_cycxhw(cycxhw: [f64; 4]) -> Result<Self> {
        Ok(TLBR::try_from_cycxhw(cycxhw)?.into())
    }
}

/// An immutable, ordered set of anchors.
///
/// Generated sets are ordered row-major over feature cells, then by scale,
/// then by ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSet {
    feature_size: Option<HW<usize>>,
    anchors: Vec<Anchor>,
}

impl AnchorSet {
    /// Wrap an explicit list of anchors.
    pub fn from_anchors(anchors: impl IntoIterator<Item = impl Into<Anchor>>) -> Self {
        Self {
            feature_size: None,
            anchors: anchors.into_iter().map(Into::into).collect(),
        }
    }

    /// Feature map size the set was generated for.
    pub fn feature_size(&self) -> Option<HW<usize>> {
        self.feature_size
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// The `[N, 4]` TLBR coordinates.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.anchors.len(), 4), |(index, coord)| {
            self.anchors[index].tlbr()[coord]
        })
    }

    /// Whether each anchor lies inside the image grown by `allowed_border`
    /// pixels on every side.
    pub fn inside_mask(&self, image_size: HW<usize>, allowed_border: f64) -> Vec<bool> {
        let image_h = image_size.h() as f64;
        let image_w = image_size.w() as f64;
        self.anchors
            .iter()
            .map(|anchor| {
                anchor.t() >= -allowed_border
                    && anchor.l() >= -allowed_border
                    && anchor.b() <= image_h + allowed_border
                    && anchor.r() <= image_w + allowed_border
            })
            .collect()
    }
}

/// Spatial size of a feature map given as `[C, H, W]` or `[N, C, H, W]` dims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureShape {
    pub batch_size: Option<usize>,
    pub channels: usize,
    pub size: HW<usize>,
}

impl FeatureShape {
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        let shape = match *dims {
            [channels, h, w] => Self {
                batch_size: None,
                channels,
                size: HW::from_hw([h, w]),
            },
            [batch_size, channels, h, w] => Self {
                batch_size: Some(batch_size),
                channels,
                size: HW::from_hw([h, w]),
            },
            _ => {
                return Err(Error::ShapeMismatch {
                    what: "feature map rank",
                    expect: 4,
                    actual: dims.len(),
                }
                .into())
            }
        };
        Ok(shape)
    }
}

/// Cache key of an anchor set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnchorKey {
    h: usize,
    w: usize,
    stride: R64,
    scales: Vec<R64>,
    ratios: Vec<R64>,
}

/// Anchor sets shared between generators, keyed by feature size, stride,
/// scales and ratios.
pub type AnchorCache = flurry::HashMap<AnchorKey, Arc<AnchorSet>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnchorGeneratorInit {
    /// Pixels per feature map cell.
    pub stride: R64,
    /// Anchor sizes in pixels, the square root of the anchor area.
    pub scales: Vec<R64>,
    /// Width over height ratios.
    pub ratios: Vec<R64>,
}

impl Default for AnchorGeneratorInit {
    fn default() -> Self {
        Self {
            stride: r64(16.0),
            scales: vec![r64(128.0), r64(256.0), r64(512.0)],
            ratios: vec![r64(0.5), r64(1.0), r64(2.0)],
        }
    }
}

impl AnchorGeneratorInit {
    pub fn build(self) -> Result<AnchorGenerator> {
        self.build_with_cache(Arc::new(flurry::HashMap::new()))
    }

    /// Build a generator that shares `cache` with other generators.
    pub fn build_with_cache(self, cache: Arc<AnchorCache>) -> Result<AnchorGenerator> {
        let Self {
            stride,
            scales,
            ratios,
        } = self;

        ensure!(stride > 0.0, Error::config("stride must be positive"));
        ensure!(!scales.is_empty(), Error::config("scales must not be empty"));
        ensure!(!ratios.is_empty(), Error::config("ratios must not be empty"));
        ensure!(
            scales.iter().all(|&scale| scale > 0.0),
            Error::config("scales must be positive")
        );
        ensure!(
            ratios.iter().all(|&ratio| ratio > 0.0),
            Error::config("ratios must be positive")
        );

        Ok(AnchorGenerator {
            stride,
            scales,
            ratios,
            cache,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnchorGenerator {
    stride: R64,
    scales: Vec<R64>,
    ratios: Vec<R64>,
    cache: Arc<AnchorCache>,
}

impl AnchorGenerator {
    pub fn stride(&self) -> f64 {
        self.stride.raw()
    }

    /// Number of anchors placed on each feature cell.
    pub fn anchors_per_cell(&self) -> usize {
        self.scales.len() * self.ratios.len()
    }

    /// Anchors for an `h x w` feature map, taken from the cache when possible.
    ///
    /// Concurrent misses on the same key may generate the set more than once,
    /// but only the first stored set is ever returned.
    pub fn anchors(&self, h: usize, w: usize) -> Result<Arc<AnchorSet>> {
        let key = AnchorKey {
            h,
            w,
            stride: self.stride,
            scales: self.scales.clone(),
            ratios: self.ratios.clone(),
        };

        let cache = self.cache.pin();
        if let Some(anchors) = cache.get(&key) {
            return Ok(anchors.clone());
        }

        let anchors = Arc::new(self.generate(h, w)?);
        debug!(
            "generated {} anchors for {}x{} feature map",
            anchors.len(),
            h,
            w
        );
        let anchors = match cache.try_insert(key, anchors) {
            Ok(anchors) => anchors.clone(),
            Err(err) => err.current.clone(),
        };
        Ok(anchors)
    }

    /// Anchors for a feature map given by its dims.
    pub fn anchors_for(&self, shape: &FeatureShape) -> Result<Arc<AnchorSet>> {
        self.anchors(shape.size.h(), shape.size.w())
    }

    /// Generate without touching the cache.
    pub fn generate(&self, h: usize, w: usize) -> Result<AnchorSet> {
        let stride = self.stride.raw();
        let shapes: Vec<_> = iproduct_shapes(&self.scales, &self.ratios).collect();

        let anchors: Vec<Anchor> = itertools::iproduct!(0..h, 0..w, shapes.iter())
            .map(|(row, col, &(scale_index, scale, ratio_index, ratio))| -> Result<_> {
                let cy = (row as f64 + 0.5) * stride;
                let cx = (col as f64 + 0.5) * stride;
                let sqrt_ratio = ratio.sqrt();
                let anchor_h = scale / sqrt_ratio;
                let anchor_w = scale * sqrt_ratio;
                let rect = TLBR::try_from_cycxhw([cy, cx, anchor_h, anchor_w])?;
                Ok(Anchor {
                    rect,
                    tag: Some(AnchorTag {
                        row,
                        col,
                        stride,
                        scale,
                        ratio,
                        scale_index,
                        ratio_index,
                    }),
                })
            })
            .try_collect()?;

        Ok(AnchorSet {
            feature_size: Some(HW::from_hw([h, w])),
            anchors,
        })
    }
}

fn iproduct_shapes<'a>(
    scales: &'a [R64],
    ratios: &'a [R64],
) -> impl Iterator<Item = (usize, f64, usize, f64)> + 'a {
    itertools::iproduct!(scales.iter().enumerate(), ratios.iter().enumerate()).map(
        |((scale_index, scale), (ratio_index, ratio))| {
            (scale_index, scale.raw(), ratio_index, ratio.raw())
        },
    )
}
