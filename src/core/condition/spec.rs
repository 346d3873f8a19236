//! Declarative description of built-in conditions.

use super::builtin::{
    BoolField, Compare, ComponentOverlap, Constant, ContainedInArray, FieldRef, NumberCompare,
    NumberComparison, PointerValid,
};
use super::Condition;
use serde::{Deserialize, Serialize};

/// Serializable form of every built-in condition.
///
/// # Example
///
/// ```rust
/// use dynamic_state_machine::core::ConditionSpec;
///
/// let spec: ConditionSpec = serde_json::from_str(
///     r#"{ "type": "bool", "field": { "key": "door", "path": [{ "field": "open" }] } }"#,
/// ).unwrap();
///
/// assert!(matches!(spec, ConditionSpec::Bool { .. }));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionSpec {
    True,
    False,
    Bool {
        field: FieldRef,
    },
    PointerValid {
        field: FieldRef,
    },
    ComponentOverlap {
        component: String,
    },
    ContainedInArray {
        array: FieldRef,
        should_contain: FieldRef,
    },
    Compare {
        left: FieldRef,
        right: FieldRef,
    },
    NumberCompare {
        left: FieldRef,
        #[serde(default)]
        comparison: Option<NumberComparison>,
        right: FieldRef,
    },
}

impl ConditionSpec {
    pub fn into_condition(self) -> Box<dyn Condition> {
        match self {
            Self::True => Box::new(Constant(true)),
            Self::False => Box::new(Constant(false)),
            Self::Bool { field } => Box::new(BoolField { field }),
            Self::PointerValid { field } => Box::new(PointerValid { field }),
            Self::ComponentOverlap { component } => Box::new(ComponentOverlap { component }),
            Self::ContainedInArray {
                array,
                should_contain,
            } => Box::new(ContainedInArray {
                array,
                should_contain,
            }),
            Self::Compare { left, right } => Box::new(Compare { left, right }),
            Self::NumberCompare {
                left,
                comparison,
                right,
            } => Box::new(NumberCompare {
                left,
                comparison,
                right,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::TestContext;
    use super::super::ConditionError;
    use super::*;
    use crate::core::data::{DataAsset, Value};

    #[test]
    fn number_compare_without_comparison_parses_but_fails_binding() {
        let json = r#"{
            "type": "number_compare",
            "left": { "key": "stats", "path": [{ "field": "hp" }] },
            "right": { "key": "stats", "path": [{ "field": "max_hp" }] }
        }"#;
        let spec: ConditionSpec = serde_json::from_str(json).unwrap();
        let ctx = TestContext::new().with(
            "stats",
            DataAsset::new("stats", "Stats")
                .with("hp", Value::Int(3))
                .with("max_hp", Value::Int(10)),
        );

        let condition = spec.into_condition();
        assert_eq!(condition.bind(&ctx), Err(ConditionError::MissingComparison));
    }

    #[test]
    fn constants_round_trip_through_json() {
        let json = serde_json::to_string(&ConditionSpec::False).unwrap();
        assert_eq!(json, r#"{"type":"false"}"#);

        let condition = serde_json::from_str::<ConditionSpec>(&json)
            .unwrap()
            .into_condition();
        assert!(!condition.evaluate(&TestContext::new()));
    }
}
