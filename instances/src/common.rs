pub use anyhow::{ensure, Context as _, Result};
pub use bbox::HW;
pub use indexmap::IndexMap;
pub use itertools::Itertools as _;
pub use ndarray::{Array, ArrayD, ArrayViewD, Axis, Dimension, IxDyn};
pub use serde::{Deserialize, Serialize};
pub use serde_json::Value;
pub use std::{
    any::Any,
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
