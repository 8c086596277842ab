//! Declarative payload schemas.
//!
//! A [`Schema`] checks a whole payload in one pass and reports every problem.
//! Fields it does not declare are dropped from the output. Query and path
//! input arrives as text, so those sources get string coercion.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::error::FieldError;
use crate::validation::object_id::is_object_id;

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Where a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Body,
    Query,
    Path,
}

impl Source {
    fn coerces(self) -> bool {
        !matches!(self, Source::Body)
    }
}

#[derive(Debug, Clone)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Email,
    ObjectId,
    Enum(&'static [&'static str]),
    Array(Box<FieldType>),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: &'static str,
    kind: FieldType,
    required: bool,
    default: Option<Value>,
    min: Option<f64>,
    max: Option<f64>,
    min_len: Option<usize>,
    max_len: Option<usize>,
    pattern: Option<Regex>,
}

impl FieldSpec {
    pub fn new(name: &'static str, kind: FieldType) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            min: None,
            max: None,
            min_len: None,
            max_len: None,
            pattern: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn email(name: &'static str) -> Self {
        Self::new(name, FieldType::Email)
    }

    pub fn object_id(name: &'static str) -> Self {
        Self::new(name, FieldType::ObjectId)
    }

    pub fn one_of(name: &'static str, values: &'static [&'static str]) -> Self {
        Self::new(name, FieldType::Enum(values))
    }

    pub fn array(name: &'static str, items: FieldType) -> Self {
        Self::new(name, FieldType::Array(Box::new(items)))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Inclusive numeric bounds.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Length bounds: characters for strings, items for arrays.
    pub fn len(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    pub fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    fn check(&self, value: &Value, coerce: bool) -> Result<Value, String> {
        let checked = check_type(self.name, &self.kind, value, coerce)?;
        self.check_bounds(&checked)?;
        Ok(checked)
    }

    fn check_bounds(&self, value: &Value) -> Result<(), String> {
        let name = self.name;
        match value {
            Value::Number(n) => {
                let n = n.as_f64().unwrap_or_default();
                if let Some(min) = self.min.filter(|min| n < *min) {
                    return Err(format!("{name} must be at least {min}"));
                }
                if let Some(max) = self.max.filter(|max| n > *max) {
                    return Err(format!("{name} must be at most {max}"));
                }
            }
            Value::String(s) => {
                let len = s.chars().count();
                if let Some(min) = self.min_len.filter(|min| len < *min) {
                    return Err(format!("{name} must be at least {min} characters"));
                }
                if let Some(max) = self.max_len.filter(|max| len > *max) {
                    return Err(format!("{name} must be at most {max} characters"));
                }
                if let Some(pattern) = self.pattern.as_ref().filter(|p| !p.is_match(s)) {
                    return Err(format!("{name} does not match {}", pattern.as_str()));
                }
            }
            Value::Array(items) => {
                if let Some(min) = self.min_len.filter(|min| items.len() < *min) {
                    return Err(format!("{name} must contain at least {min} items"));
                }
                if let Some(max) = self.max_len.filter(|max| items.len() > *max) {
                    return Err(format!("{name} must contain at most {max} items"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn check_type(name: &str, kind: &FieldType, value: &Value, coerce: bool) -> Result<Value, String> {
    match (kind, value) {
        (FieldType::String, Value::String(s)) => Ok(Value::String(s.trim().to_string())),
        (FieldType::String, _) => Err(format!("{name} must be a string")),

        (FieldType::Number, Value::Number(_)) => Ok(value.clone()),
        (FieldType::Number, Value::String(s)) if coerce => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("{name} must be a number")),
        (FieldType::Number, _) => Err(format!("{name} must be a number")),

        (FieldType::Integer, Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Value::from(i)),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| Value::from(f as i64))
                .ok_or_else(|| format!("{name} must be an integer")),
        },
        (FieldType::Integer, Value::String(s)) if coerce => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("{name} must be an integer")),
        (FieldType::Integer, _) => Err(format!("{name} must be an integer")),

        (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
        (FieldType::Boolean, Value::String(s)) if coerce => match s.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(format!("{name} must be a boolean")),
        },
        (FieldType::Boolean, _) => Err(format!("{name} must be a boolean")),

        (FieldType::Email, Value::String(s)) => {
            let email = s.trim().to_lowercase();
            if EMAIL.is_match(&email) {
                Ok(Value::String(email))
            } else {
                Err(format!("{name} must be a valid email"))
            }
        }
        (FieldType::Email, _) => Err(format!("{name} must be a valid email")),

        (FieldType::ObjectId, Value::String(s)) if is_object_id(s.trim()) => {
            Ok(Value::String(s.trim().to_string()))
        }
        (FieldType::ObjectId, _) => Err(format!("Invalid {name} format")),

        (FieldType::Enum(allowed), Value::String(s)) if allowed.iter().any(|a| *a == s.trim()) => {
            Ok(Value::String(s.trim().to_string()))
        }
        (FieldType::Enum(allowed), _) => {
            Err(format!("{name} must be one of {}", allowed.join(", ")))
        }

        (FieldType::Array(items), Value::Array(values)) => values
            .iter()
            .enumerate()
            .map(|(i, v)| check_type(&format!("{name}[{i}]"), items, v, coerce))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        // `?tags=a,b` in a query string
        (FieldType::Array(items), Value::String(s)) if coerce => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .enumerate()
            .map(|(i, part)| {
                check_type(&format!("{name}[{i}]"), items, &Value::String(part.into()), coerce)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (FieldType::Array(_), _) => Err(format!("{name} must be an array")),
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Ordered set of field specs for one payload.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate `input`, returning the cleaned payload or every field error.
    pub fn validate(&self, input: &Value, source: Source) -> Result<Value, Vec<FieldError>> {
        let empty = Map::new();
        let object = match input {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(vec![FieldError::new("body", "must be an object")
                    .with_value(other.clone())])
            }
        };

        let mut output = Map::new();
        let mut errors = Vec::new();

        for spec in &self.fields {
            let value = object.get(spec.name);
            if is_missing(value) {
                if spec.required {
                    errors.push(FieldError::new(spec.name, format!("{} is required", spec.name)));
                } else if let Some(default) = &spec.default {
                    output.insert(spec.name.to_string(), default.clone());
                }
                continue;
            }

            let Some(value) = value else { continue };
            match spec.check(value, source.coerces()) {
                Ok(checked) => {
                    output.insert(spec.name.to_string(), checked);
                }
                Err(message) => {
                    errors.push(FieldError::new(spec.name, message).with_value(value.clone()))
                }
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(output))
        } else {
            Err(errors)
        }
    }
}
