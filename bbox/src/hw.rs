use crate::{common::*, GeometryError};

/// Height and width of an image or a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HW<T> {
    h: T,
    w: T,
}

impl<T> HW<T>
where
    T: Num + PartialOrd + Copy + Debug,
{
    pub fn try_from_hw(hw: [T; 2]) -> Result<Self> {
        let [h, w] = hw;
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            GeometryError::invalid("height and width parameters must be non-negative", hw)
        );
        Ok(Self { h, w })
    }

    pub fn area(&self) -> T {
        self.w * self.h
    }

    pub fn w(&self) -> T {
        self.w
    }

    pub fn h(&self) -> T {
        self.h
    }

    pub fn hw(&self) -> [T; 2] {
        [self.h, self.w]
    }
}

impl HW<usize> {
    /// Build from unsigned dimensions, which are never negative.
    pub fn from_hw(hw: [usize; 2]) -> Self {
        let [h, w] = hw;
        Self { h, w }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn size_area() {
        let s1 = HW::try_from_hw([3.0, 2.0]).unwrap();
        let area: f64 = s1.area();
        assert_abs_diff_eq!(area, 6.0);
    }

    #[test]
    fn reject_negative_size() {
        assert!(HW::try_from_hw([-1.0, 2.0]).is_err());
    }
}
