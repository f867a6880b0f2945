use crate::{common::*, Field, InstancesError, Kind};

/// Per-image record of named fields that share one instance count.
///
/// The first field added fixes the instance count. Every later field must have
/// the same length along its first axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Instances {
    image_size: HW<usize>,
    image_path: Option<PathBuf>,
    fields: IndexMap<String, Field>,
}

impl Instances {
    pub fn new(image_size: HW<usize>) -> Self {
        Self {
            image_size,
            image_path: None,
            fields: IndexMap::new(),
        }
    }

    pub fn with_image_path(mut self, path: impl AsRef<Path>) -> Self {
        self.image_path = Some(path.as_ref().to_owned());
        self
    }

    pub fn image_size(&self) -> HW<usize> {
        self.image_size
    }

    pub fn image_path(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    /// Insert or replace a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Field>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        let actual = value
            .len()
            .with_context(|| format!("unable to set field '{}'", name))?;

        if !self.fields.is_empty() {
            let expect = self.len()?;
            ensure!(
                expect == actual,
                InstancesError::ShapeMismatch {
                    name,
                    expect,
                    actual,
                }
            );
        }

        self.fields.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Field> {
        let field = self
            .fields
            .get(name)
            .ok_or_else(|| InstancesError::MissingField(name.to_string()))?;
        Ok(field)
    }

    /// Mutable access to a field. The caller must keep its length unchanged.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Field> {
        let field = self
            .fields
            .get_mut(name)
            .ok_or_else(|| InstancesError::MissingField(name.to_string()))?;
        Ok(field)
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<Field> {
        let field = self
            .fields
            .shift_remove(name)
            .ok_or_else(|| InstancesError::MissingField(name.to_string()))?;
        Ok(field)
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|name| name.as_str())
    }

    /// Number of instances. A container without fields has no length.
    pub fn len(&self) -> Result<usize> {
        let field = self.fields.values().next().ok_or(InstancesError::Empty)?;
        field.len()
    }

    /// True when there are no fields or no instances.
    pub fn is_empty(&self) -> bool {
        self.len().map(|len| len == 0).unwrap_or(true)
    }

    fn len_or_zero(&self) -> Result<usize> {
        if self.fields.is_empty() {
            Ok(0)
        } else {
            self.len()
        }
    }

    /// Pick instances by position. Indices may repeat and appear in any order.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let len = self.len_or_zero()?;
        if let Some(&index) = indices.iter().find(|&&index| index >= len) {
            return Err(InstancesError::IndexOutOfBounds { index, len }.into());
        }

        let fields = self
            .fields
            .iter()
            .map(|(name, field)| -> Result<_> {
                let selected = field
                    .select(indices)
                    .with_context(|| format!("unable to select field '{}'", name))?;
                Ok((name.clone(), selected))
            })
            .try_collect()?;

        Ok(Self {
            image_size: self.image_size,
            image_path: self.image_path.clone(),
            fields,
        })
    }

    /// Keep the instances whose mask entry is true.
    pub fn filter_mask(&self, mask: &[bool]) -> Result<Self> {
        let len = self.len_or_zero()?;
        ensure!(
            mask.len() == len,
            InstancesError::ShapeMismatch {
                name: "mask".to_string(),
                expect: len,
                actual: mask.len(),
            }
        );
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(index, &keep)| keep.then(|| index))
            .collect();
        self.select(&indices)
    }

    /// Concatenate containers along the instance axis.
    ///
    /// All inputs must share the image size and the set of field names. The
    /// image path is kept only when every input has the same one.
    pub fn cat<'a>(instances: impl IntoIterator<Item = &'a Instances>) -> Result<Self> {
        let instances: Vec<&Instances> = instances.into_iter().collect();
        let (first, rest) = instances.split_first().ok_or(InstancesError::Empty)?;
        if rest.is_empty() {
            return Ok((*first).clone());
        }

        let names: HashSet<&str> = first.field_names().collect();
        for other in rest {
            ensure!(
                other.image_size == first.image_size,
                InstancesError::ImageSizeMismatch {
                    expect: first.image_size.hw(),
                    actual: other.image_size.hw(),
                }
            );
            let other_names: HashSet<&str> = other.field_names().collect();
            ensure!(
                other_names == names,
                InstancesError::FieldSetMismatch {
                    expect: first.field_names().map(String::from).collect(),
                    actual: other.field_names().map(String::from).collect(),
                }
            );
        }

        let image_path = rest
            .iter()
            .all(|other| other.image_path == first.image_path)
            .then(|| first.image_path.clone())
            .flatten();

        let fields = first
            .fields
            .keys()
            .map(|name| -> Result<_> {
                let parts: Vec<&Field> = instances
                    .iter()
                    .map(|instances| instances.get(name))
                    .try_collect()?;
                let field = Field::cat(&parts)
                    .with_context(|| format!("unable to concatenate field '{}'", name))?;
                Ok((name.clone(), field))
            })
            .try_collect()?;

        Ok(Self {
            image_size: first.image_size,
            image_path,
            fields,
        })
    }

    /// Convert every numeric array, including nested ones, to `kind`.
    pub fn to_kind(&self, kind: Kind) -> Result<Self> {
        let fields = self
            .fields
            .iter()
            .map(|(name, field)| -> Result<_> { Ok((name.clone(), field.to_kind(kind)?)) })
            .try_collect()?;
        Ok(Self {
            image_size: self.image_size,
            image_path: self.image_path.clone(),
            fields,
        })
    }

    /// Turn numeric list fields into arrays in place, recursing into nested
    /// containers. Lists that are not numeric, or ragged, are left alone.
    /// Returns the number of converted fields.
    pub fn lists_to_arrays(&mut self) -> usize {
        self.fields
            .values_mut()
            .map(|field| match field {
                Field::List(values) => match Field::list_to_array(values) {
                    Some(array) => {
                        *field = Field::Array(array);
                        1
                    }
                    None => 0,
                },
                Field::Nested(nested) => nested.lists_to_arrays(),
                Field::Array(_) | Field::Opaque(_) => 0,
            })
            .sum()
    }
}

impl fmt::Display for Instances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let num_instances = self.len().unwrap_or(0);
        let image_path = match &self.image_path {
            Some(path) => path.display().to_string(),
            None => "None".to_string(),
        };
        write!(
            f,
            "Instances(num_instances={}, image_path={}, image_height={}, image_width={}, fields=[{}])",
            num_instances,
            image_path,
            self.image_size.h(),
            self.image_size.w(),
            self.field_names().join(", ")
        )
    }
}
