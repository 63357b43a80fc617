//! Typed parameter schemas for tools
//!
//! A [`ParameterSchema`] is written with a typed builder and rendered as JSON
//! Schema. That schema is both the function-calling export and, compiled with
//! `jsonschema`, the validator for the raw JSON object an LLM sends.

use crate::error::FieldError;
use jsonschema::error::{ValidationError, ValidationErrorKind};
use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Map, Value};

/// Validated parameter object handed to executors
pub type Params = Map<String, Value>;

/// Accepted value type of one parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    /// String restricted to the listed values
    Enum(Vec<String>),
    Array(Box<ParamType>),
}

impl ParamType {
    fn json_type(&self) -> &'static str {
        match self {
            ParamType::String | ParamType::Enum(_) => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array(_) => "array",
        }
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = json!({ "type": self.json_type() });
        match self {
            ParamType::Enum(values) => {
                schema["enum"] = json!(values);
            }
            ParamType::Array(item) => {
                schema["items"] = item.to_json_schema();
            }
            _ => {}
        }
        schema
    }
}

/// One named parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Accept numeric strings for number and integer parameters
    pub coerce: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: None,
            description: None,
            minimum: None,
            maximum: None,
            coerce: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean)
    }

    pub fn one_of<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self::new(name, ParamType::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn array(name: impl Into<String>, item: ParamType) -> Self {
        Self::new(name, ParamType::Array(Box::new(item)))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the parameter is absent; implies optional
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn min(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn coerce(mut self) -> Self {
        self.coerce = true;
        self
    }

    /// Accepted numeric strings become numbers; everything else is left to the schema
    fn coerced(&self, value: &Value) -> Value {
        if !self.coerce {
            return value.clone();
        }

        match (&self.ty, value) {
            (ParamType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            (ParamType::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        }
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = self.ty.to_json_schema();
        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        if let Some(min) = self.minimum {
            schema["minimum"] = json!(min);
        }
        if let Some(max) = self.maximum {
            schema["maximum"] = json!(max);
        }
        schema
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

/// Ordered set of parameters accepted by one tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    params: Vec<ParamSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Compile the exported JSON Schema for validation
    pub fn compile(&self) -> Result<ParamValidator, String> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&self.to_json_schema())
            .map_err(|e| e.to_string())?;

        Ok(ParamValidator {
            schema: self.clone(),
            compiled,
        })
    }

    /// Compile and validate in one step; see [`ParamValidator::validate`]
    pub fn validate(&self, raw: &Value) -> Result<Params, Vec<FieldError>> {
        self.compile()
            .map_err(|reason| vec![FieldError::new("", reason)])?
            .validate(raw)
    }

    fn position(&self, name: &str) -> usize {
        self.params
            .iter()
            .position(|p| p.name == name)
            .unwrap_or(usize::MAX)
    }

    /// JSON Schema object describing the parameters
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|spec| (spec.name.clone(), spec.to_json_schema()))
            .collect();

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A [`ParameterSchema`] compiled once at registration
pub struct ParamValidator {
    schema: ParameterSchema,
    compiled: JSONSchema,
}

impl ParamValidator {
    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// Validate `raw`, returning the normalized parameters or every field error
    ///
    /// `null` is treated as an empty object. Explicit `null` values count as
    /// absent and unknown keys are dropped before validation. Defaults are
    /// filled in afterwards.
    pub fn validate(&self, raw: &Value) -> Result<Params, Vec<FieldError>> {
        let input = match raw {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(self.normalize(map)),
            other => other.clone(),
        };

        if let Err(errors) = self.compiled.validate(&input) {
            let mut details: Vec<(usize, FieldError)> = errors
                .map(|e| {
                    let error = self.field_error(&e);
                    let top = error.field.split('.').next().unwrap_or_default();
                    (self.schema.position(top), error)
                })
                .collect();
            details.sort_by_key(|(position, _)| *position);
            return Err(details.into_iter().map(|(_, error)| error).collect());
        }

        let mut params = match input {
            Value::Object(map) => map,
            _ => Params::new(),
        };
        for spec in &self.schema.params {
            if let Some(default) = &spec.default {
                params
                    .entry(spec.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        Ok(params)
    }

    fn normalize(&self, raw: &Map<String, Value>) -> Params {
        self.schema
            .params
            .iter()
            .filter_map(|spec| {
                raw.get(&spec.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (spec.name.clone(), spec.coerced(v)))
            })
            .collect()
    }

    fn field_error(&self, error: &ValidationError<'_>) -> FieldError {
        let path: Vec<String> = error
            .instance_path
            .to_string()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        let field = path.join(".");
        let spec = path.first().and_then(|name| self.schema.get(name));

        match &error.kind {
            ValidationErrorKind::Required { property } => {
                let name = property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string());
                FieldError::new(name, "is required")
            }
            ValidationErrorKind::Enum { .. } => match spec.map(|s| &s.ty) {
                Some(ParamType::Enum(values)) => {
                    FieldError::new(field, format!("must be one of: {}", values.join(", ")))
                }
                _ => FieldError::new(field, error.to_string()),
            },
            ValidationErrorKind::Maximum { .. } => match spec.and_then(|s| s.maximum) {
                Some(max) => FieldError::new(field, format!("must be at most {}", number_text(max))),
                None => FieldError::new(field, error.to_string()),
            },
            ValidationErrorKind::Minimum { .. } => match spec.and_then(|s| s.minimum) {
                Some(min) => FieldError::new(field, format!("must be at least {}", number_text(min))),
                None => FieldError::new(field, error.to_string()),
            },
            ValidationErrorKind::Type { .. } => {
                let expected = match (spec.map(|s| &s.ty), path.len()) {
                    (None, _) => "object",
                    (Some(ParamType::Array(item)), n) if n > 1 => item.json_type(),
                    (Some(ty), _) => ty.json_type(),
                };
                FieldError::new(
                    field,
                    format!("expected {}, received {}", expected, type_name(&error.instance)),
                )
            }
            _ => FieldError::new(field, error.to_string()),
        }
    }
}

impl std::fmt::Debug for ParamValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn number_text(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
