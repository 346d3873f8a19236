//! External data that nodes read, write and condition on.
//!
//! A [`DataAsset`] is a named bag of typed fields. Assets are registered once
//! as templates in a [`DataCatalog`]; every later version lives either in the
//! active node's cache or in the transition history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Type tag of a [`Value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Name,
    Class,
    Object,
    Array,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Name => "name",
            Self::Class => "class",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// A single field value.
///
/// Arrays carry their element kind so that an empty array is still typed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Name(String),
    Class(String),
    /// Nullable reference to a nested asset.
    Object(Option<Box<DataAsset>>),
    Array { element: ValueKind, items: Vec<Value> },
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Name(_) => ValueKind::Name,
            Self::Class(_) => ValueKind::Class,
            Self::Object(_) => ValueKind::Object,
            Self::Array { .. } => ValueKind::Array,
        }
    }

    /// Build a typed array value.
    pub fn array(element: ValueKind, items: Vec<Value>) -> Self {
        Self::Array { element, items }
    }

    pub fn object(asset: DataAsset) -> Self {
        Self::Object(Some(Box::new(asset)))
    }

    pub fn null_object() -> Self {
        Self::Object(None)
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Whether two values have the same type, including array element kinds.
    pub fn same_type(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Array { element: a, .. }, Self::Array { element: b, .. }) => a == b,
            _ => self.kind() == other.kind(),
        }
    }

    /// The element kind of an array value.
    pub fn element_kind(&self) -> Option<ValueKind> {
        match self {
            Self::Array { element, .. } => Some(*element),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&DataAsset> {
        match self {
            Self::Object(Some(asset)) => Some(asset),
            _ => None,
        }
    }
}

/// Errors raised while following a [`PropertyPath`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PathError {
    #[error("property path is empty")]
    EmptyPath,

    #[error("field '{field}' does not exist on asset '{asset}'")]
    UnknownField { asset: String, field: String },

    #[error("field '{field}' is a null object reference")]
    NullReference { field: String },

    #[error("field '{field}' is not an object and cannot be traversed")]
    NotAnObject { field: String },
}

/// One step of a [`PropertyPath`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub field: String,
    /// Substituted for a null object while binding, never while evaluating.
    #[serde(default)]
    pub validation_default: Option<DataAsset>,
}

/// Ordered chain of field names leading from an asset to a leaf value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

impl PropertyPath {
    /// Create a path from plain field names.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dynamic_state_machine::core::PropertyPath;
    ///
    /// let path = PropertyPath::new(["weapon", "damage"]);
    /// assert_eq!(path.to_string(), "weapon.damage");
    /// ```
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: fields
                .into_iter()
                .map(|field| PathSegment {
                    field: field.into(),
                    validation_default: None,
                })
                .collect(),
        }
    }

    /// Attach a validation-only default to the segment named `field`.
    pub fn with_validation_default(mut self, field: &str, default: DataAsset) -> Self {
        if let Some(segment) = self.segments.iter_mut().find(|s| s.field == field) {
            segment.validation_default = Some(default);
        }
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.segments.iter().map(|s| s.field.as_str()).collect();
        f.write_str(&fields.join("."))
    }
}

/// A named, typed property bag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataAsset {
    id: String,
    class: String,
    fields: BTreeMap<String, Value>,
}

impl DataAsset {
    /// Create an empty asset.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dynamic_state_machine::core::{DataAsset, Value};
    ///
    /// let quest = DataAsset::new("quest_state", "QuestData")
    ///     .with("accepted", Value::Bool(false))
    ///     .with("stage", Value::Int(0));
    ///
    /// assert_eq!(quest.get("stage"), Some(&Value::Int(0)));
    /// ```
    pub fn new(id: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Follow `path` through nested objects and return the leaf value.
    ///
    /// With `validating` set, a null object is replaced by the segment's
    /// validation default when one is present.
    pub fn resolve<'a>(
        &'a self,
        path: &'a PropertyPath,
        validating: bool,
    ) -> Result<&'a Value, PathError> {
        let (last, intermediate) = path.segments.split_last().ok_or(PathError::EmptyPath)?;

        let mut current = self;
        for segment in intermediate {
            let value = current.lookup(&segment.field)?;
            current = match value {
                Value::Object(Some(asset)) => asset,
                Value::Object(None) => match (&segment.validation_default, validating) {
                    (Some(default), true) => default,
                    _ => {
                        return Err(PathError::NullReference {
                            field: segment.field.clone(),
                        })
                    }
                },
                _ => {
                    return Err(PathError::NotAnObject {
                        field: segment.field.clone(),
                    })
                }
            };
        }

        current.lookup(&last.field)
    }

    fn lookup(&self, field: &str) -> Result<&Value, PathError> {
        self.fields.get(field).ok_or_else(|| PathError::UnknownField {
            asset: self.id.clone(),
            field: field.to_string(),
        })
    }
}

/// Registry of asset templates keyed by asset id.
#[derive(Clone, Debug, Default)]
pub struct DataCatalog {
    templates: BTreeMap<String, DataAsset>,
}

impl DataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any previous one with the same id.
    pub fn register(&mut self, asset: DataAsset) {
        self.templates.insert(asset.id.clone(), asset);
    }

    pub fn template(&self, id: &str) -> Option<&DataAsset> {
        self.templates.get(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
