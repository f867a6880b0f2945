pub use anyhow::{ensure, Result};
pub use ndarray::Array2;
pub use num_traits::{Float, Num, Zero};
pub use std::{fmt::Debug, ops::Mul};
