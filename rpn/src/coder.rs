//! Log-space box regression deltas relative to anchors.
//!
//! A delta is `[dy, dx, dh, dw]`:
//!
//! ```text
//! dy = wy * (cy_gt - cy_a) / h_a
//! dx = wx * (cx_gt - cx_a) / w_a
//! dh = wh * ln(h_gt / h_a)
//! dw = ww * ln(w_gt / w_a)
//! ```

use crate::{common::*, Error};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoxCoderInit {
    /// Multipliers of `[dy, dx, dh, dw]`.
    pub weights: [R64; 4],
    /// Upper bound of `dh` and `dw` before exponentiation in decoding.
    pub max_log_scale: R64,
}

impl Default for BoxCoderInit {
    fn default() -> Self {
        Self {
            weights: [r64(1.0); 4],
            max_log_scale: r64((1000.0f64 / 16.0).ln()),
        }
    }
}

impl BoxCoderInit {
    pub fn build(self) -> Result<BoxCoder> {
        let Self {
            weights,
            max_log_scale,
        } = self;

        ensure!(
            weights
                .iter()
                .all(|weight| weight.raw().is_finite() && *weight > 0.0),
            Error::config(format!(
                "weights must be positive and finite, but get {:?}",
                weights
            ))
        );
        ensure!(
            max_log_scale.raw().is_finite() && max_log_scale > 0.0,
            Error::config("max_log_scale must be positive and finite")
        );

        Ok(BoxCoder {
            weights: weights.map(|weight| weight.raw()),
            max_log_scale: max_log_scale.raw(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BoxCoder {
    weights: [f64; 4],
    max_log_scale: f64,
}

impl BoxCoder {
    /// Regression target of `gt` relative to `anchor`.
    pub fn encode<A, G>(&self, anchor: &A, gt: &G) -> Result<[f64; 4]>
    where
        A: Rect<Type = f64>,
        G: Rect<Type = f64>,
    {
        let [anchor_cy, anchor_cx, anchor_h, anchor_w] = anchor.cycxhw();
        let [gt_cy, gt_cx, gt_h, gt_w] = gt.cycxhw();

        ensure!(
            anchor_h > 0.0 && anchor_w > 0.0 && anchor_h.is_finite() && anchor_w.is_finite(),
            Error::geometry(format!(
                "cannot encode against anchor with size {:?}",
                [anchor_h, anchor_w]
            ))
        );
        ensure!(
            gt_h > 0.0 && gt_w > 0.0 && gt_h.is_finite() && gt_w.is_finite(),
            Error::geometry(format!(
                "cannot encode ground truth with size {:?}",
                [gt_h, gt_w]
            ))
        );

        let [wy, wx, wh, ww] = self.weights;
        Ok([
            wy * (gt_cy - anchor_cy) / anchor_h,
            wx * (gt_cx - anchor_cx) / anchor_w,
            wh * (gt_h / anchor_h).ln(),
            ww * (gt_w / anchor_w).ln(),
        ])
    }

    /// Box reconstructed from `deltas` relative to `anchor`.
    pub fn decode<A>(&self, anchor: &A, deltas: [f64; 4]) -> Result<TLBR<f64>>
    where
        A: Rect<Type = f64>,
    {
        ensure!(
            deltas.iter().all(|delta| delta.is_finite()),
            Error::geometry(format!("non-finite deltas {:?}", deltas))
        );

        let [anchor_cy, anchor_cx, anchor_h, anchor_w] = anchor.cycxhw();
        let [wy, wx, wh, ww] = self.weights;
        let [dy, dx, dh, dw] = deltas;
        let dy = dy / wy;
        let dx = dx / wx;
        let dh = (dh / wh).min(self.max_log_scale);
        let dw = (dw / ww).min(self.max_log_scale);

        let cy = dy * anchor_h + anchor_cy;
        let cx = dx * anchor_w + anchor_cx;
        let h = dh.exp() * anchor_h;
        let w = dw.exp() * anchor_w;

        ensure!(
            [cy, cx, h, w].iter().all(|value| value.is_finite()),
            Error::geometry(format!(
                "decoding {:?} against anchor {:?} overflows",
                deltas,
                anchor.tlbr()
            ))
        );
        TLBR::try_from_cycxhw([cy, cx, h, w])
    }

    /// Encode pairs of anchors and ground truth into an `[N, 4]` array.
    pub fn encode_all<A, G>(&self, anchors: &[A], gts: &[G]) -> Result<Array2<f64>>
    where
        A: Rect<Type = f64>,
        G: Rect<Type = f64>,
    {
        ensure!(
            anchors.len() == gts.len(),
            Error::ShapeMismatch {
                what: "number of ground truth boxes to encode",
                expect: anchors.len(),
                actual: gts.len(),
            }
        );

        let mut output = Array2::zeros((anchors.len(), 4));
        for ((anchor, gt), mut row) in anchors.iter().zip(gts).zip(output.outer_iter_mut()) {
            let deltas = self.encode(anchor, gt)?;
            row.assign(&ArrayView1::from(&deltas[..]));
        }
        Ok(output)
    }

    /// Decode an `[N, 4]` delta array against `N` anchors.
    pub fn decode_all<A>(
        &self,
        anchors: &[A],
        deltas: ArrayView2<'_, f64>,
    ) -> Result<Vec<TLBR<f64>>>
    where
        A: Rect<Type = f64>,
    {
        let (num_rows, num_cols) = deltas.dim();
        ensure!(
            num_cols == 4,
            Error::ShapeMismatch {
                what: "delta row width",
                expect: 4,
                actual: num_cols,
            }
        );
        ensure!(
            num_rows == anchors.len(),
            Error::ShapeMismatch {
                what: "number of delta rows",
                expect: anchors.len(),
                actual: num_rows,
            }
        );

        anchors
            .iter()
            .zip(deltas.outer_iter())
            .map(|(anchor, row)| self.decode(anchor, [row[0], row[1], row[2], row[3]]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    fn rect(tlbr: [f64; 4]) -> TLBR<f64> {
        TLBR::try_from_tlbr(tlbr).unwrap()
    }

    fn random_rect(rng: &mut StdRng) -> TLBR<f64> {
        let t = rng.gen_range(-100.0..500.0);
        let l = rng.gen_range(-100.0..500.0);
        let h = rng.gen_range(5.0..300.0);
        let w = rng.gen_range(5.0..300.0);
        TLBR::try_from_tlhw([t, l, h, w]).unwrap()
    }

    #[test]
    fn encode_known_values() {
        let coder = BoxCoderInit::default().build().unwrap();
        let anchor = rect([0.0, 0.0, 10.0, 20.0]);
        let gt = rect([5.0, 0.0, 25.0, 20.0]);
        let [dy, dx, dh, dw] = coder.encode(&anchor, &gt).unwrap();
        assert_abs_diff_eq!(dy, 1.0);
        assert_abs_diff_eq!(dx, 0.0);
        assert_abs_diff_eq!(dh, 2f64.ln());
        assert_abs_diff_eq!(dw, 0.0);

        assert_eq!(coder.encode(&anchor, &anchor).unwrap(), [0.0; 4]);
    }

    #[test]
    fn round_trip() {
        let mut rng = StdRng::seed_from_u64(17);
        let coders = [
            BoxCoderInit::default().build().unwrap(),
            BoxCoderInit {
                weights: [r64(10.0), r64(10.0), r64(5.0), r64(5.0)],
                ..Default::default()
            }
            .build()
            .unwrap(),
        ];

        for coder in &coders {
            for _ in 0..500 {
                let anchor = random_rect(&mut rng);
                let gt = random_rect(&mut rng);
                let deltas = coder.encode(&anchor, &gt).unwrap();
                let decoded = coder.decode(&anchor, deltas).unwrap();
                for (lhs, rhs) in decoded.tlbr().iter().zip(gt.tlbr()) {
                    assert_relative_eq!(*lhs, rhs, epsilon = 1e-9, max_relative = 1e-5);
                }
            }
        }
    }

    #[test]
    fn decode_clamps_log_scale() {
        let coder = BoxCoderInit::default().build().unwrap();
        let anchor = rect([0.0, 0.0, 16.0, 16.0]);
        let decoded = coder.decode(&anchor, [0.0, 0.0, 1e4, 1e4]).unwrap();
        assert!(decoded.tlbr().iter().all(|value| value.is_finite()));
        assert_relative_eq!(decoded.h(), 1000.0, max_relative = 1e-9);
        assert_relative_eq!(decoded.w(), 1000.0, max_relative = 1e-9);
    }

    #[test]
    fn reject_degenerate_encoding() {
        let coder = BoxCoderInit::default().build().unwrap();
        let anchor = rect([0.0, 0.0, 10.0, 10.0]);
        let line = rect([0.0, 0.0, 0.0, 10.0]);

        let err = coder.encode(&line, &anchor).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidGeometry(_))
        ));
        assert!(coder.encode(&anchor, &line).is_err());
    }

    #[test]
    fn reject_non_finite_deltas() {
        let coder = BoxCoderInit::default().build().unwrap();
        let anchor = rect([0.0, 0.0, 10.0, 10.0]);
        let err = coder.decode(&anchor, [f64::NAN, 0.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidGeometry(_))
        ));
        assert!(coder.decode(&anchor, [0.0, f64::INFINITY, 0.0, 0.0]).is_err());
    }

    #[test]
    fn batch_forms_check_counts() {
        let coder = BoxCoderInit::default().build().unwrap();
        let anchors = vec![rect([0.0, 0.0, 10.0, 10.0]), rect([5.0, 5.0, 15.0, 25.0])];
        let gts = vec![rect([1.0, 1.0, 11.0, 11.0])];

        let err = coder.encode_all(&anchors, &gts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ShapeMismatch { .. })
        ));

        let deltas = array![[0.0, 0.0, 0.0, 0.0]];
        assert!(coder.decode_all(&anchors, deltas.view()).is_err());

        let encoded = coder.encode_all(&anchors, &anchors).unwrap();
        assert_eq!(encoded, Array2::<f64>::zeros((2, 4)));
        let decoded = coder.decode_all(&anchors, encoded.view()).unwrap();
        assert_eq!(decoded, anchors);
    }

    #[test]
    fn reject_invalid_config() {
        assert!(BoxCoderInit {
            weights: [r64(1.0), r64(0.0), r64(1.0), r64(1.0)],
            ..Default::default()
        }
        .build()
        .is_err());
        assert!(BoxCoderInit {
            max_log_scale: r64(0.0),
            ..Default::default()
        }
        .build()
        .is_err());
    }
}
