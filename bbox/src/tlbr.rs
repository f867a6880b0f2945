use super::{CyCxHW, GeometryError, Rect};
use crate::common::*;

/// Bounding box in TLBR format, that is `(y1, x1, y2, x2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TLBR<T> {
    pub(crate) t: T,
    pub(crate) l: T,
    pub(crate) b: T,
    pub(crate) r: T,
}

impl<T> TLBR<T> {
    /// Build from `(x1, y1, x2, y2)` corners.
    pub fn try_from_xyxy(xyxy: [T; 4]) -> Result<Self>
    where
        T: Copy + Num + PartialOrd + Debug,
    {
        let [x1, y1, x2, y2] = xyxy;
        Self::try_from_tlbr([y1, x1, y2, x2])
    }

    /// The `(x1, y1, x2, y2)` corners.
    pub fn xyxy(&self) -> [T; 4]
    where
        T: Copy,
    {
        [self.l, self.t, self.r, self.b]
    }
}

impl<T> Rect for TLBR<T>
where
    T: Copy + Num + PartialOrd + Debug,
{
    type Type = T;

    fn t(&self) -> Self::Type {
        self.t
    }

    fn l(&self) -> Self::Type {
        self.l
    }

    fn b(&self) -> Self::Type {
        self.b
    }

    fn r(&self) -> Self::Type {
        self.r
    }

    fn cy(&self) -> Self::Type {
        let one = T::one();
        let two = one + one;
        self.t + self.h() / two
    }

    fn cx(&self) -> Self::Type {
        let one = T::one();
        let two = one + one;
        self.l + self.w() / two
    }

    fn h(&self) -> Self::Type {
        self.b - self.t
    }

    fn w(&self) -> Self::Type {
        self.r - self.l
    }

    fn try_from_cycxhw(cycxhw: [Self::Type; 4]) -> Result<Self> {
        let [cy, cx, h, w] = cycxhw;
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            GeometryError::invalid("h and w must be non-negative", cycxhw)
        );

        let two = T::one() + T::one();
        let t = cy - h / two;
        let b = cy + h / two;
        let l = cx - w / two;
        let r = cx + w / two;

        Ok(Self { t, l, b, r })
    }

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self> {
        let [t, l, b, r] = tlbr;
        ensure!(
            b >= t && r >= l,
            GeometryError::invalid("b >= t and r >= l must hold", tlbr)
        );

        Ok(Self { t, l, b, r })
    }

    fn try_from_tlhw(tlhw: [Self::Type; 4]) -> Result<Self> {
        let [t, l, h, w] = tlhw;
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            GeometryError::invalid("h and w must be non-negative", tlhw)
        );
        let b = t + h;
        let r = l + w;
        Self::try_from_tlbr([t, l, b, r])
    }
}

impl<T> From<CyCxHW<T>> for TLBR<T>
where
    T: Copy + Num,
{
    fn from(from: CyCxHW<T>) -> Self {
        Self::from(&from)
    }
}

impl<T> From<&CyCxHW<T>> for TLBR<T>
where
    T: Copy + Num,
{
    fn from(from: &CyCxHW<T>) -> Self {
        let two = T::one() + T::one();
        let CyCxHW { cy, cx, h, w, .. } = *from;
        let t = cy - h / two;
        let l = cx - w / two;
        let b = cy + h / two;
        let r = cx + w / two;
        Self { t, l, b, r }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RectNum;

    #[test]
    fn reject_inverted_corners() {
        let err = TLBR::try_from_tlbr([10.0, 0.0, 5.0, 10.0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GeometryError>(),
            Some(GeometryError::InvalidGeometry { .. })
        ));
        assert!(TLBR::try_from_tlbr([0.0, 10.0, 5.0, 0.0]).is_err());
        assert!(TLBR::try_from_tlbr([f64::NAN, 0.0, 5.0, 5.0]).is_err());
    }

    #[test]
    fn xyxy_conversion() {
        let rect = TLBR::try_from_xyxy([1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(rect.tlbr(), [2.0, 1.0, 4.0, 3.0]);
        assert_eq!(rect.xyxy(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn cycxhw_round_trip() {
        let rect = TLBR::try_from_tlbr([2.0, 4.0, 6.0, 10.0]).unwrap();
        let center = rect.to_cycxhw();
        assert_eq!(center.cycxhw(), [4.0, 7.0, 4.0, 6.0]);
        assert_eq!(TLBR::from(&center), rect);
    }
}
