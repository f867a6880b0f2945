//! Field values stored in [Instances](crate::Instances).

use crate::{common::*, Instances, InstancesError};

/// Element kind of a numeric array field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    F32,
    F64,
    I64,
}

/// Numeric array whose first axis is the instance axis.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayField {
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    I64(ArrayD<i64>),
}

macro_rules! map_array_field {
    ($field:expr, $array:ident => $body:expr) => {
        match $field {
            ArrayField::F32($array) => ArrayField::F32($body),
            ArrayField::F64($array) => ArrayField::F64($body),
            ArrayField::I64($array) => ArrayField::I64($body),
        }
    };
}

impl ArrayField {
    pub fn kind(&self) -> Kind {
        match self {
            Self::F32(_) => Kind::F32,
            Self::F64(_) => Kind::F64,
            Self::I64(_) => Kind::I64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(array) => array.shape(),
            Self::F64(array) => array.shape(),
            Self::I64(array) => array.shape(),
        }
    }

    pub fn len(&self) -> Result<usize> {
        let len = *self.shape().first().ok_or(InstancesError::ScalarArray)?;
        Ok(len)
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        map_array_field!(self, array => array.select(Axis(0), indices))
    }

    /// Convert the elements to another kind. Float to integer casts truncate.
    pub fn to_kind(&self, kind: Kind) -> Self {
        match kind {
            Kind::F32 => Self::F32(match self {
                Self::F32(array) => array.clone(),
                Self::F64(array) => array.mapv(|value| value as f32),
                Self::I64(array) => array.mapv(|value| value as f32),
            }),
            Kind::F64 => Self::F64(self.to_f64()),
            Kind::I64 => Self::I64(match self {
                Self::F32(array) => array.mapv(|value| value as i64),
                Self::F64(array) => array.mapv(|value| value as i64),
                Self::I64(array) => array.clone(),
            }),
        }
    }

    /// A copy of the values as `f64`.
    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            Self::F32(array) => array.mapv(f64::from),
            Self::F64(array) => array.clone(),
            Self::I64(array) => array.mapv(|value| value as f64),
        }
    }

    pub fn as_f64(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::F64(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            Self::I64(array) => Some(array),
            _ => None,
        }
    }

    /// Concatenate along the instance axis. All fields must share the same
    /// kind and trailing dimensions.
    pub fn cat(fields: &[&ArrayField]) -> Result<Self> {
        let kind = fields.first().ok_or(InstancesError::Empty)?.kind();
        if let Some(other) = fields.iter().find(|field| field.kind() != kind) {
            return Err(InstancesError::KindMismatch {
                expect: format!("{:?}", kind),
                actual: format!("{:?}", other.kind()),
            }
            .into());
        }

        let output = match kind {
            Kind::F32 => Self::F32(cat_arrays(
                fields.iter().filter_map(|field| match field {
                    Self::F32(array) => Some(array.view()),
                    _ => None,
                }),
            )?),
            Kind::F64 => Self::F64(cat_arrays(
                fields.iter().filter_map(|field| match field {
                    Self::F64(array) => Some(array.view()),
                    _ => None,
                }),
            )?),
            Kind::I64 => Self::I64(cat_arrays(
                fields.iter().filter_map(|field| match field {
                    Self::I64(array) => Some(array.view()),
                    _ => None,
                }),
            )?),
        };
        Ok(output)
    }
}

fn cat_arrays<'a, A>(views: impl IntoIterator<Item = ArrayViewD<'a, A>>) -> Result<ArrayD<A>>
where
    A: Clone + 'a,
{
    let views: Vec<_> = views.into_iter().collect();
    let output = ndarray::concatenate(Axis(0), &views)
        .map_err(|err| InstancesError::IncompatibleShape(err.to_string()))?;
    Ok(output)
}

/// A tagged value that the container carries but cannot index or concatenate.
#[derive(Clone)]
pub struct OpaqueField {
    tag: String,
    len: usize,
    data: Arc<dyn Any + Send + Sync>,
}

impl OpaqueField {
    pub fn new<T>(tag: impl Into<String>, len: usize, data: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            tag: tag.into(),
            len,
            data: Arc::new(data),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.data.downcast_ref()
    }

    fn unsupported(&self, operation: &'static str) -> InstancesError {
        InstancesError::UnsupportedField {
            operation,
            tag: self.tag.clone(),
        }
    }
}

impl fmt::Debug for OpaqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueField")
            .field("tag", &self.tag)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl PartialEq for OpaqueField {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.len == other.len && Arc::ptr_eq(&self.data, &other.data)
    }
}

/// The value of a named field.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Array(ArrayField),
    Nested(Instances),
    List(Vec<Value>),
    Opaque(OpaqueField),
}

impl Field {
    fn variant_name(&self) -> &'static str {
        match self {
            Self::Array(_) => "array",
            Self::Nested(_) => "nested",
            Self::List(_) => "list",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Number of instances held by the field.
    pub fn len(&self) -> Result<usize> {
        match self {
            Self::Array(array) => array.len(),
            Self::Nested(nested) => nested.len(),
            Self::List(values) => Ok(values.len()),
            Self::Opaque(opaque) => Ok(opaque.len()),
        }
    }

    pub fn as_array(&self) -> Option<&ArrayField> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&Instances> {
        match self {
            Self::Nested(nested) => Some(nested),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueField> {
        match self {
            Self::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }

    /// Pick instances at `indices`. Indices are expected to be in bounds.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let output = match self {
            Self::Array(array) => Self::Array(array.select(indices)),
            Self::Nested(nested) => Self::Nested(nested.select(indices)?),
            Self::List(values) => {
                Self::List(indices.iter().map(|&index| values[index].clone()).collect())
            }
            Self::Opaque(opaque) => return Err(opaque.unsupported("select").into()),
        };
        Ok(output)
    }

    /// Concatenate fields of the same variant along the instance axis.
    pub fn cat(fields: &[&Field]) -> Result<Self> {
        let first = *fields.first().ok_or(InstancesError::Empty)?;
        if let Some(other) = fields
            .iter()
            .find(|field| field.variant_name() != first.variant_name())
        {
            return Err(InstancesError::KindMismatch {
                expect: first.variant_name().to_string(),
                actual: other.variant_name().to_string(),
            }
            .into());
        }

        let output = match first {
            Self::Array(_) => {
                let arrays: Vec<_> = fields.iter().filter_map(|field| field.as_array()).collect();
                Self::Array(ArrayField::cat(&arrays)?)
            }
            Self::Nested(_) => {
                Self::Nested(Instances::cat(fields.iter().filter_map(|field| field.as_nested()))?)
            }
            Self::List(_) => Self::List(
                fields
                    .iter()
                    .filter_map(|field| field.as_list())
                    .flatten()
                    .cloned()
                    .collect(),
            ),
            Self::Opaque(opaque) => return Err(opaque.unsupported("cat").into()),
        };
        Ok(output)
    }

    /// Convert numeric arrays to `kind`, recursing into nested containers.
    /// Other fields are passed through.
    pub fn to_kind(&self, kind: Kind) -> Result<Self> {
        let output = match self {
            Self::Array(array) => Self::Array(array.to_kind(kind)),
            Self::Nested(nested) => Self::Nested(nested.to_kind(kind)?),
            Self::List(_) | Self::Opaque(_) => self.clone(),
        };
        Ok(output)
    }

    /// Try to turn a list of numbers, or a list of equally long number lists,
    /// into an array. Lists holding only integers become `I64` arrays.
    pub(crate) fn list_to_array(values: &[Value]) -> Option<ArrayField> {
        let rows: Vec<Vec<&Value>> = values
            .iter()
            .map(|value| match value {
                Value::Array(items) => Some(items.iter().collect()),
                Value::Number(_) => Some(vec![value]),
                _ => None,
            })
            .collect::<Option<_>>()?;
        let is_nested = values.iter().any(|value| value.is_array());
        let width = rows.first().map(|row| row.len()).unwrap_or(0);
        if rows.iter().any(|row| row.len() != width)
            || (is_nested && !values.iter().all(|value| value.is_array()))
        {
            return None;
        }

        let shape: Vec<usize> = if is_nested {
            vec![values.len(), width]
        } else {
            vec![values.len()]
        };
        let flat: Vec<&Value> = rows.into_iter().flatten().collect();

        if flat.iter().all(|value| value.is_i64()) {
            let data: Vec<i64> = flat.iter().filter_map(|value| value.as_i64()).collect();
            ArrayD::from_shape_vec(IxDyn(&shape), data)
                .ok()
                .map(ArrayField::I64)
        } else {
            let data: Vec<f64> = flat
                .iter()
                .map(|value| value.as_f64())
                .collect::<Option<_>>()?;
            ArrayD::from_shape_vec(IxDyn(&shape), data)
                .ok()
                .map(ArrayField::F64)
        }
    }
}

impl From<ArrayField> for Field {
    fn from(from: ArrayField) -> Self {
        Self::Array(from)
    }
}

impl<D> From<Array<f32, D>> for Field
where
    D: Dimension,
{
    fn from(from: Array<f32, D>) -> Self {
        Self::Array(ArrayField::F32(from.into_dyn()))
    }
}

impl<D> From<Array<f64, D>> for Field
where
    D: Dimension,
{
    fn from(from: Array<f64, D>) -> Self {
        Self::Array(ArrayField::F64(from.into_dyn()))
    }
}

impl<D> From<Array<i64, D>> for Field
where
    D: Dimension,
{
    fn from(from: Array<i64, D>) -> Self {
        Self::Array(ArrayField::I64(from.into_dyn()))
    }
}

impl From<Instances> for Field {
    fn from(from: Instances) -> Self {
        Self::Nested(from)
    }
}

impl From<Vec<Value>> for Field {
    fn from(from: Vec<Value>) -> Self {
        Self::List(from)
    }
}

impl From<OpaqueField> for Field {
    fn from(from: OpaqueField) -> Self {
        Self::Opaque(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use serde_json::json;

    #[test]
    fn array_len_requires_instance_axis() {
        let scalar = ArrayField::F64(ArrayD::from_elem(IxDyn(&[]), 1.0));
        assert!(scalar.len().is_err());
        let boxes: Field = Array2::<f64>::zeros((3, 4)).into();
        assert_eq!(boxes.len().unwrap(), 3);
    }

    #[test]
    fn cat_rejects_mixed_kinds() {
        let lhs = ArrayField::F64(array![1.0, 2.0].into_dyn());
        let rhs = ArrayField::I64(array![3].into_dyn());
        let err = ArrayField::cat(&[&lhs, &rhs]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstancesError>(),
            Some(InstancesError::KindMismatch { .. })
        ));
    }

    #[test]
    fn cat_rejects_trailing_shape_mismatch() {
        let lhs = ArrayField::F64(Array2::<f64>::zeros((2, 4)).into_dyn());
        let rhs = ArrayField::F64(Array2::<f64>::zeros((1, 3)).into_dyn());
        assert!(ArrayField::cat(&[&lhs, &rhs]).is_err());
    }

    #[test]
    fn opaque_fields_cannot_be_indexed() {
        let field = Field::from(OpaqueField::new("track-state", 2, 42_u32));
        assert_eq!(field.len().unwrap(), 2);
        let err = field.select(&[0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstancesError>(),
            Some(InstancesError::UnsupportedField { .. })
        ));
        assert_eq!(
            field.as_opaque().and_then(|opaque| opaque.downcast_ref::<u32>()),
            Some(&42)
        );
    }

    #[test]
    fn list_conversion() {
        let ints = Field::list_to_array(&[json!(1), json!(2)]).unwrap();
        assert_eq!(ints, ArrayField::I64(array![1, 2].into_dyn()));

        let rows = Field::list_to_array(&[json!([0.5, 1]), json!([2, 3])]).unwrap();
        assert_eq!(
            rows,
            ArrayField::F64(array![[0.5, 1.0], [2.0, 3.0]].into_dyn())
        );

        assert!(Field::list_to_array(&[json!("car"), json!(1)]).is_none());
        assert!(Field::list_to_array(&[json!([1, 2]), json!([3])]).is_none());
    }

    #[test]
    fn to_kind_casts_arrays_only() {
        let field = Field::from(array![1.5_f64, 2.5]);
        let cast = field.to_kind(Kind::F32).unwrap();
        assert_eq!(cast.as_array().unwrap().kind(), Kind::F32);

        let list = Field::from(vec![json!("a")]);
        assert_eq!(list.to_kind(Kind::F32).unwrap(), list);
    }
}
