//! Two-operand condition evaluation.
//!
//! Used both to gate steps (a false condition skips the step) and as the
//! body of `condition` steps, whose result is the boolean itself.

use std::cmp::Ordering;
use std::str::FromStr;

use serde_json::Value;
use toolweave_types::workflow::ConditionExpr;

use super::step_executor::StepError;
use super::variables::resolve_operand;

/// Supported comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
    Exists,
    NotExists,
}

impl ConditionOperator {
    /// Whether the operator reads `right_operand`.
    pub fn is_binary(&self) -> bool {
        !matches!(self, ConditionOperator::Exists | ConditionOperator::NotExists)
    }
}

impl FromStr for ConditionOperator {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Self::Equals),
            "not_equals" => Ok(Self::NotEquals),
            "greater_than" => Ok(Self::GreaterThan),
            "less_than" => Ok(Self::LessThan),
            "contains" => Ok(Self::Contains),
            "not_contains" => Ok(Self::NotContains),
            "exists" => Ok(Self::Exists),
            "not_exists" => Ok(Self::NotExists),
            other => Err(StepError::Configuration(format!(
                "unsupported condition operator '{other}'"
            ))),
        }
    }
}

/// Evaluate `expr` against `scope`.
///
/// Configuration errors: unknown operator, or a binary operator without a
/// right operand. Evaluation errors: ordering incomparable values, or
/// `contains` on something that is not a string, array or object.
pub fn evaluate(expr: &ConditionExpr, scope: &Value) -> Result<bool, StepError> {
    let op: ConditionOperator = expr.operator.parse()?;
    let left = resolve_operand(&expr.left_operand, scope);

    let right = match (&expr.right_operand, op.is_binary()) {
        (Some(r), _) => resolve_operand(r, scope),
        (None, false) => Value::Null,
        (None, true) => {
            return Err(StepError::Configuration(format!(
                "operator '{}' requires a right_operand",
                expr.operator
            )));
        }
    };

    match op {
        ConditionOperator::Equals => Ok(values_equal(&left, &right)),
        ConditionOperator::NotEquals => Ok(!values_equal(&left, &right)),
        ConditionOperator::GreaterThan => Ok(compare(&left, &right)? == Ordering::Greater),
        ConditionOperator::LessThan => Ok(compare(&left, &right)? == Ordering::Less),
        ConditionOperator::Contains => contains(&left, &right),
        ConditionOperator::NotContains => contains(&left, &right).map(|c| !c),
        ConditionOperator::Exists => Ok(!left.is_null()),
        ConditionOperator::NotExists => Ok(left.is_null()),
    }
}

/// JSON equality where numbers compare by value (`1 == 1.0`).
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, x)| b.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, StepError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .ok_or_else(|| StepError::Condition(format!("cannot order {a} and {b}"))),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(StepError::Condition(format!(
            "cannot order {} and {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn contains(container: &Value, needle: &Value) -> Result<bool, StepError> {
    match container {
        Value::String(haystack) => match needle {
            Value::String(n) => Ok(haystack.contains(n.as_str())),
            other => Err(StepError::Condition(format!(
                "cannot search a string for {}",
                type_name(other)
            ))),
        },
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            other => Err(StepError::Condition(format!(
                "object keys are strings, got {}",
                type_name(other)
            ))),
        },
        other => Err(StepError::Condition(format!(
            "contains needs a string, array or object, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
