//! Hyperparameter values and name-ordered parameter sets.

use crate::domain::error::StockfitError;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    None,
}

impl ParamValue {
    pub fn as_usize(&self, family: &str, key: &str) -> Result<usize, StockfitError> {
        match *self {
            ParamValue::Int(v) if v >= 0 => Ok(v as usize),
            _ => Err(StockfitError::invalid_param(
                family,
                format!("{key} must be a non-negative integer, got {self}"),
            )),
        }
    }

    /// `None` maps to no limit.
    pub fn as_opt_usize(&self, family: &str, key: &str) -> Result<Option<usize>, StockfitError> {
        match self {
            ParamValue::None => Ok(None),
            other => other.as_usize(family, key).map(Some),
        }
    }

    pub fn as_f64(&self, family: &str, key: &str) -> Result<f64, StockfitError> {
        match *self {
            ParamValue::Float(v) => Ok(v),
            ParamValue::Int(v) => Ok(v as f64),
            _ => Err(StockfitError::invalid_param(
                family,
                format!("{key} must be a number, got {self}"),
            )),
        }
    }

    pub fn as_bool(&self, family: &str, key: &str) -> Result<bool, StockfitError> {
        match *self {
            ParamValue::Bool(v) => Ok(v),
            _ => Err(StockfitError::invalid_param(
                family,
                format!("{key} must be a boolean, got {self}"),
            )),
        }
    }

    pub fn as_text(&self, family: &str, key: &str) -> Result<&str, StockfitError> {
        match self {
            ParamValue::Text(v) => Ok(v),
            _ => Err(StockfitError::invalid_param(
                family,
                format!("{key} must be text, got {self}"),
            )),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
            ParamValue::None => f.write_str("None"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<Option<usize>> for ParamValue {
    fn from(v: Option<usize>) -> Self {
        v.map_or(ParamValue::None, |n| ParamValue::Int(n as i64))
    }
}

/// Parameter set keyed by name, iterated in name order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

pub(crate) fn unknown_param(family: &str, key: &str) -> StockfitError {
    StockfitError::invalid_param(family, format!("unknown parameter {key}"))
}
