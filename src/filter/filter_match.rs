use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{FilterOp, FilterOrderInfo, SortDirection};

/// Evaluates WHERE documents against JSON rows with SQL null semantics:
/// a missing or null field fails every comparison except `IS NULL`.
pub struct FilterMatch;

impl FilterMatch {
    pub fn matches(where_data: &Value, row: &Map<String, Value>) -> Result<bool, FilterError> {
        let obj = where_data
            .as_object()
            .ok_or_else(|| FilterError::InvalidWhereClause("Expected an object".to_string()))?;

        for (key, value) in obj {
            let satisfied = match key.as_str() {
                "$and" => Self::logical(value, row, true)?,
                "$or" => Self::logical(value, row, false)?,
                "$not" => !Self::matches(value, row)?,
                op if op.starts_with('$') => return Err(FilterError::UnsupportedOperator(op.to_string())),
                field => Self::field(row.get(field), value)?,
            };
            if !satisfied {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn logical(value: &Value, row: &Map<String, Value>, all: bool) -> Result<bool, FilterError> {
        let groups = value
            .as_array()
            .ok_or_else(|| FilterError::InvalidOperatorData("Logical operator requires array".to_string()))?;
        for group in groups {
            let matched = Self::matches(group, row)?;
            if all && !matched {
                return Ok(false);
            }
            if !all && matched {
                return Ok(true);
            }
        }
        Ok(all)
    }

    fn field(actual: Option<&Value>, condition: &Value) -> Result<bool, FilterError> {
        match condition {
            Value::Object(ops) => {
                for (op_key, operand) in ops {
                    let op = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    if !Self::apply(op, actual, operand)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Self::apply(FilterOp::Eq, actual, condition),
        }
    }

    fn apply(op: FilterOp, actual: Option<&Value>, operand: &Value) -> Result<bool, FilterError> {
        let actual = actual.filter(|v| !v.is_null());

        if operand.is_null() {
            return Ok(match op {
                FilterOp::Eq => actual.is_none(),
                FilterOp::Ne => actual.is_some(),
                _ => false,
            });
        }

        let Some(actual) = actual else {
            // NOT IN over an empty list is trivially true, as in SQL's 1=1
            return Ok(matches!(op, FilterOp::NIn | FilterOp::All)
                && operand.as_array().map(|a| a.is_empty()).unwrap_or(false));
        };

        Ok(match op {
            FilterOp::Eq => Self::compare(actual, operand) == Some(Ordering::Equal),
            FilterOp::Ne => matches!(Self::compare(actual, operand), Some(o) if o != Ordering::Equal),
            FilterOp::Gt => Self::compare(actual, operand) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(Self::compare(actual, operand), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => Self::compare(actual, operand) == Some(Ordering::Less),
            FilterOp::Lte => matches!(Self::compare(actual, operand), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Like | FilterOp::ILike => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| FilterError::InvalidOperatorData("Pattern must be a string".to_string()))?;
                match actual.as_str() {
                    Some(text) if op == FilterOp::ILike => {
                        like(&text.to_lowercase(), &pattern.to_lowercase())
                    }
                    Some(text) => like(text, pattern),
                    None => false,
                }
            }
            FilterOp::In => Self::array(operand)?
                .iter()
                .any(|v| Self::compare(actual, v) == Some(Ordering::Equal)),
            FilterOp::NIn => Self::array(operand)?
                .iter()
                .all(|v| matches!(Self::compare(actual, v), Some(o) if o != Ordering::Equal)),
            FilterOp::Between => {
                let bounds = Self::array(operand)?;
                if bounds.len() != 2 {
                    return Err(FilterError::InvalidOperatorData(
                        "$between requires exactly 2 values".to_string(),
                    ));
                }
                matches!(Self::compare(actual, &bounds[0]), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(Self::compare(actual, &bounds[1]), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOp::Any => {
                let wanted = Self::array(operand)?;
                actual
                    .as_array()
                    .map(|items| items.iter().any(|i| wanted.contains(i)))
                    .unwrap_or(false)
            }
            FilterOp::All => {
                let wanted = Self::array(operand)?;
                actual
                    .as_array()
                    .map(|items| wanted.iter().all(|w| items.contains(w)))
                    .unwrap_or(false)
            }
            FilterOp::Size => {
                let size = operand.as_u64().ok_or_else(|| {
                    FilterError::InvalidOperatorData("$size requires a non-negative integer".to_string())
                })?;
                actual.as_array().map(|a| a.len() as u64 == size).unwrap_or(false)
            }
        })
    }

    fn array(operand: &Value) -> Result<&Vec<Value>, FilterError> {
        operand
            .as_array()
            .ok_or_else(|| FilterError::InvalidOperatorData("Operator requires an array".to_string()))
    }

    /// Orders comparable scalars; strings that both parse as RFC 3339 compare as instants
    fn compare(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
            (Value::String(x), Value::String(y)) => {
                match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                    (Ok(x), Ok(y)) => Some(x.cmp(&y)),
                    _ => Some(x.cmp(y)),
                }
            }
            (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
            (x, y) if x == y => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Sorts rows like ORDER BY, with nulls last for ascending keys
    pub fn sort(rows: &mut [Map<String, Value>], order: &[FilterOrderInfo]) {
        if order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for info in order {
                let left = a.get(&info.column).filter(|v| !v.is_null());
                let right = b.get(&info.column).filter(|v| !v.is_null());
                let ordering = match (left, right) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(x), Some(y)) => Self::compare(x, y).unwrap_or(Ordering::Equal),
                };
                let ordering = match info.sort {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}
