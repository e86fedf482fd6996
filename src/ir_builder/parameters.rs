//! Parameter table: typed `{param_n: Type}` placeholders for literal values.
//!
//! Strings and non-empty arrays become parameters; numbers inline verbatim
//! and booleans inline as `1`/`0`, so no parameter slot is spent on them.
//! Names are assigned in encounter order starting at `param_1`.

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::screener_query::{ConstantValue, FilterOp};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParameterError {
    #[error("Array parameter mixes element types")]
    MixedTypeArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Float64,
    ArrayString,
    ArrayFloat64,
    ArrayBoolean,
}

impl ParamType {
    pub fn sql(&self) -> &'static str {
        match self {
            ParamType::String => "String",
            ParamType::Float64 => "Float64",
            ParamType::ArrayString => "Array(String)",
            ParamType::ArrayFloat64 => "Array(Float64)",
            ParamType::ArrayBoolean => "Array(Boolean)",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    values: IndexMap<String, Value>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `value` for SQL: either an inlined literal (returned as-is in
    /// the statement text) or a typed placeholder backed by a parameter
    /// slot. LIKE-family operators wrap string values as `%value%` at
    /// creation time.
    pub fn create_parameter(
        &mut self,
        value: &ConstantValue,
        op: Option<FilterOp>,
    ) -> Result<String, ParameterError> {
        match value {
            ConstantValue::Number(n) => Ok(format_number(*n)),
            ConstantValue::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
            ConstantValue::String(s) => {
                let stored = if op.map(|o| o.is_like()).unwrap_or(false) {
                    format!("%{}%", s)
                } else {
                    s.clone()
                };
                Ok(self.push(ParamType::String, Value::String(stored)))
            }
            ConstantValue::List(items) => {
                if items.is_empty() {
                    return Ok("[]".to_string());
                }
                let param_type = array_type(items)?;
                Ok(self.push(param_type, Value::Array(items.clone())))
            }
        }
    }

    fn push(&mut self, param_type: ParamType, value: Value) -> String {
        let name = format!("param_{}", self.values.len() + 1);
        self.values.insert(name.clone(), value);
        format!("{{{}: {}}}", name, param_type.sql())
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> IndexMap<String, Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn array_type(items: &[Value]) -> Result<ParamType, ParameterError> {
    let first = &items[0];
    if first.is_string() {
        if items.iter().all(Value::is_string) {
            return Ok(ParamType::ArrayString);
        }
    } else if first.is_number() {
        if items.iter().all(Value::is_number) {
            return Ok(ParamType::ArrayFloat64);
        }
    } else if first.is_boolean() && items.iter().all(Value::is_boolean) {
        return Ok(ParamType::ArrayBoolean);
    }
    Err(ParameterError::MixedTypeArray)
}

/// Inline numeric literal. Whole numbers drop the fractional part so
/// `100.0` renders as `100`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_and_booleans_inline() {
        let mut table = ParameterTable::new();
        assert_eq!(
            table
                .create_parameter(&ConstantValue::Number(100.0), None)
                .unwrap(),
            "100"
        );
        assert_eq!(
            table
                .create_parameter(&ConstantValue::Number(0.001), None)
                .unwrap(),
            "0.001"
        );
        assert_eq!(
            table
                .create_parameter(&ConstantValue::Bool(true), None)
                .unwrap(),
            "1"
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_strings_are_parameterized_in_order() {
        let mut table = ParameterTable::new();
        let first = table
            .create_parameter(&ConstantValue::String("Technology".to_string()), None)
            .unwrap();
        let second = table
            .create_parameter(&ConstantValue::String("US".to_string()), None)
            .unwrap();
        assert_eq!(first, "{param_1: String}");
        assert_eq!(second, "{param_2: String}");
        let names: Vec<&String> = table.values().keys().collect();
        assert_eq!(names, vec!["param_1", "param_2"]);
    }

    #[test]
    fn test_like_wraps_value_at_creation_time() {
        let mut table = ParameterTable::new();
        table
            .create_parameter(
                &ConstantValue::String("tech".to_string()),
                Some(FilterOp::Contains),
            )
            .unwrap();
        assert_eq!(table.values()["param_1"], json!("%tech%"));
    }

    #[test]
    fn test_array_typing() {
        let mut table = ParameterTable::new();
        let placeholder = table
            .create_parameter(&ConstantValue::List(vec![json!("a"), json!("b")]), None)
            .unwrap();
        assert_eq!(placeholder, "{param_1: Array(String)}");

        let placeholder = table
            .create_parameter(&ConstantValue::List(vec![json!(1), json!(2.5)]), None)
            .unwrap();
        assert_eq!(placeholder, "{param_2: Array(Float64)}");

        let placeholder = table
            .create_parameter(&ConstantValue::List(vec![json!(true)]), None)
            .unwrap();
        assert_eq!(placeholder, "{param_3: Array(Boolean)}");
    }

    #[test]
    fn test_empty_array_inlines() {
        let mut table = ParameterTable::new();
        assert_eq!(
            table
                .create_parameter(&ConstantValue::List(vec![]), None)
                .unwrap(),
            "[]"
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_mixed_array_rejected() {
        let mut table = ParameterTable::new();
        let result =
            table.create_parameter(&ConstantValue::List(vec![json!("a"), json!(1)]), None);
        assert_eq!(result, Err(ParameterError::MixedTypeArray));
    }
}
