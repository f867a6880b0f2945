pub use anyhow::{ensure, Context as _, Result};
pub use bbox::{prelude::*, HW, TLBR};
pub use instances::{Field, Instances};
pub use itertools::Itertools as _;
pub use label::Label;
pub use log::{debug, warn};
pub use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use rayon::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{cmp::Ordering, path::Path, sync::Arc};
