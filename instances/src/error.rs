use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstancesError {
    #[error("field '{name}' has {actual} instances, but the container has {expect}")]
    ShapeMismatch {
        name: String,
        expect: usize,
        actual: usize,
    },
    #[error("incompatible array shapes: {0}")]
    IncompatibleShape(String),
    #[error("an array field must have an instance axis")]
    ScalarArray,
    #[error("empty Instances does not have a length")]
    Empty,
    #[error("cannot find field '{0}'")]
    MissingField(String),
    #[error("field names differ, expect {expect:?}, but get {actual:?}")]
    FieldSetMismatch {
        expect: Vec<String>,
        actual: Vec<String>,
    },
    #[error("image sizes differ, expect {expect:?}, but get {actual:?}")]
    ImageSizeMismatch { expect: [usize; 2], actual: [usize; 2] },
    #[error("field kinds differ, expect {expect}, but get {actual}")]
    KindMismatch { expect: String, actual: String },
    #[error("'{operation}' is not supported by the opaque field tagged '{tag}'")]
    UnsupportedField {
        operation: &'static str,
        tag: String,
    },
    #[error("index {index} is out of bounds for {len} instances")]
    IndexOutOfBounds { index: usize, len: usize },
}
