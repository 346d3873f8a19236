//! Built-in condition kinds.

use super::{Condition, ConditionContext, ConditionError};
use crate::core::data::{PropertyPath, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A data key plus the property path inside its asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRef {
    pub key: String,
    pub path: PropertyPath,
}

impl FieldRef {
    pub fn new<I, S>(key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            path: PropertyPath::new(fields),
        }
    }

    pub fn with_path(key: impl Into<String>, path: PropertyPath) -> Self {
        Self {
            key: key.into(),
            path,
        }
    }

    /// The leaf value in the declared template.
    fn declared<'a>(&'a self, ctx: &'a dyn ConditionContext) -> Result<&'a Value, ConditionError> {
        let asset = ctx.declared(&self.key)?;
        Ok(asset.resolve(&self.path, true)?)
    }

    /// The leaf value in the latest data version.
    fn current<'a>(&'a self, ctx: &'a dyn ConditionContext) -> Option<&'a Value> {
        let resolved = ctx
            .fetch(&self.key)
            .map_err(ConditionError::from)
            .and_then(|asset| asset.resolve(&self.path, false).map_err(ConditionError::from));
        match resolved {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(node = %ctx.node_id(), field = %self, "cannot read field: {}", err);
                None
            }
        }
    }

    fn expect_kind(&self, value: &Value, expected: ValueKind) -> Result<(), ConditionError> {
        if value.kind() == expected {
            Ok(())
        } else {
            Err(ConditionError::WrongType {
                field: self.to_string(),
                expected,
                found: value.kind(),
            })
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.key, self.path)
    }
}

/// Always the wrapped value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Constant(pub bool);

impl Condition for Constant {
    fn bind(&self, _ctx: &dyn ConditionContext) -> Result<(), ConditionError> {
        Ok(())
    }

    fn evaluate(&self, _ctx: &dyn ConditionContext) -> bool {
        self.0
    }
}

/// Reads a boolean field.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolField {
    pub field: FieldRef,
}

impl BoolField {
    pub fn new<I, S>(key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: FieldRef::new(key, fields),
        }
    }
}

impl Condition for BoolField {
    fn bind(&self, ctx: &dyn ConditionContext) -> Result<(), ConditionError> {
        let value = self.field.declared(ctx)?;
        self.field.expect_kind(value, ValueKind::Bool)
    }

    fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        self.field
            .current(ctx)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// True when an object reference is set.
#[derive(Clone, Debug, PartialEq)]
pub struct PointerValid {
    pub field: FieldRef,
}

impl PointerValid {
    pub fn new<I, S>(key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: FieldRef::new(key, fields),
        }
    }
}

impl Condition for PointerValid {
    fn bind(&self, ctx: &dyn ConditionContext) -> Result<(), ConditionError> {
        let value = self.field.declared(ctx)?;
        self.field.expect_kind(value, ValueKind::Object)
    }

    fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        matches!(self.field.current(ctx), Some(Value::Object(Some(_))))
    }
}

/// True while a component of the node's owner overlaps the player.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentOverlap {
    pub component: String,
}

impl ComponentOverlap {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl Condition for ComponentOverlap {
    fn bind(&self, ctx: &dyn ConditionContext) -> Result<(), ConditionError> {
        if ctx.has_component(&self.component) {
            Ok(())
        } else {
            Err(ConditionError::UnknownComponent(self.component.clone()))
        }
    }

    fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        ctx.is_overlapping(&self.component)
    }
}

/// True when a name or class array contains a value, or every element of
/// another array of the same type.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainedInArray {
    pub array: FieldRef,
    pub should_contain: FieldRef,
}

impl ContainedInArray {
    pub fn new(array: FieldRef, should_contain: FieldRef) -> Self {
        Self {
            array,
            should_contain,
        }
    }
}

impl Condition for ContainedInArray {
    fn bind(&self, ctx: &dyn ConditionContext) -> Result<(), ConditionError> {
        let array = self.array.declared(ctx)?;
        let element = match array.element_kind() {
            Some(element) => element,
            None => {
                return Err(ConditionError::WrongType {
                    field: self.array.to_string(),
                    expected: ValueKind::Array,
                    found: array.kind(),
                })
            }
        };
        if !matches!(element, ValueKind::Name | ValueKind::Class) {
            return Err(ConditionError::UnsupportedElement(element));
        }

        let wanted = self.should_contain.declared(ctx)?;
        let compatible = match wanted.element_kind() {
            Some(wanted_element) => wanted_element == element,
            None => wanted.kind() == element,
        };
        if compatible {
            Ok(())
        } else {
            Err(ConditionError::TypeMismatch {
                left: self.array.to_string(),
                right: self.should_contain.to_string(),
            })
        }
    }

    fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        let (Some(Value::Array { items, .. }), Some(wanted)) =
            (self.array.current(ctx), self.should_contain.current(ctx))
        else {
            return false;
        };

        match wanted {
            Value::Array { items: wanted, .. } => wanted.iter().all(|w| items.contains(w)),
            scalar => items.contains(scalar),
        }
    }
}

/// Structural equality of two same-typed fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Compare {
    pub left: FieldRef,
    pub right: FieldRef,
}

impl Compare {
    pub fn new(left: FieldRef, right: FieldRef) -> Self {
        Self { left, right }
    }
}

impl Condition for Compare {
    fn bind(&self, ctx: &dyn ConditionContext) -> Result<(), ConditionError> {
        let left = self.left.declared(ctx)?;
        let right = self.right.declared(ctx)?;
        if left.same_type(right) {
            Ok(())
        } else {
            Err(ConditionError::TypeMismatch {
                left: self.left.to_string(),
                right: self.right.to_string(),
            })
        }
    }

    fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        match (self.left.current(ctx), self.right.current(ctx)) {
            (Some(left), Some(right)) => left.same_type(right) && left == right,
            _ => false,
        }
    }
}

/// Relation used by [`NumberCompare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberComparison {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

impl NumberComparison {
    pub fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Self::Equal => left == right,
            Self::NotEqual => left != right,
            Self::Greater => left > right,
            Self::Less => left < right,
            Self::GreaterOrEqual => left >= right,
            Self::LessOrEqual => left <= right,
        }
    }
}

/// Numeric comparison of two int fields or two float fields.
///
/// A missing comparison operator fails binding.
#[derive(Clone, Debug, PartialEq)]
pub struct NumberCompare {
    pub left: FieldRef,
    pub comparison: Option<NumberComparison>,
    pub right: FieldRef,
}

impl NumberCompare {
    pub fn new(left: FieldRef, comparison: NumberComparison, right: FieldRef) -> Self {
        Self {
            left,
            comparison: Some(comparison),
            right,
        }
    }
}

impl Condition for NumberCompare {
    fn bind(&self, ctx: &dyn ConditionContext) -> Result<(), ConditionError> {
        self.comparison.ok_or(ConditionError::MissingComparison)?;

        let left = self.left.declared(ctx)?;
        if !matches!(left.kind(), ValueKind::Int | ValueKind::Float) {
            return Err(ConditionError::WrongType {
                field: self.left.to_string(),
                expected: ValueKind::Float,
                found: left.kind(),
            });
        }
        let right = self.right.declared(ctx)?;
        if left.kind() != right.kind() {
            return Err(ConditionError::TypeMismatch {
                left: self.left.to_string(),
                right: self.right.to_string(),
            });
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        let Some(comparison) = self.comparison else {
            return false;
        };
        match (self.left.current(ctx), self.right.current(ctx)) {
            (Some(Value::Int(left)), Some(Value::Int(right))) => comparison.holds(left, right),
            (Some(Value::Float(left)), Some(Value::Float(right))) => comparison.holds(left, right),
            _ => false,
        }
    }
}
