//! Declared parameter schemas and binding.
//!
//! A worker type declares its parameters as a list of [`ParamSpec`]s.
//! Binding raw queue input against that schema happens once, at worker
//! construction; the bound [`Params`] are immutable afterwards. Every
//! declared parameter is present in the bound result - supplied,
//! defaulted, or (if required and missing) binding fails.

use serde_json::{Map, Value};

use crate::worker::WorkerError;

/// The declared kind of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A text value. Numbers are rendered to text on binding.
    String,
    /// An integer or float. Numeric strings parse on binding.
    Number,
    /// A boolean. The strings "true"/"false" parse on binding.
    Boolean,
    /// A list of strings. A single string promotes to a one-element list.
    StringList,
    /// An opaque JSON value, forwarded verbatim and never inspected.
    Json,
}

/// One declared parameter: name, kind, whether it is required, an
/// optional default, and a human-readable description.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: &'static str,
    kind: ParamKind,
    required: bool,
    default: Option<Value>,
    description: &'static str,
}

impl ParamSpec {
    /// A parameter that must be supplied.
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    /// A parameter that may be absent; it binds to null.
    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            description,
        }
    }

    /// A parameter that binds to `default` when absent.
    pub fn with_default(
        name: &'static str,
        kind: ParamKind,
        default: impl Into<Value>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default.into()),
            description,
        }
    }

    /// The parameter name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared kind.
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// The human-readable description.
    pub fn description(&self) -> &'static str {
        self.description
    }
}

/// Parameters bound against a declared schema.
///
/// Constructed once per worker invocation and immutable thereafter.
/// Continuations get fresh parameter maps built by the emitting worker,
/// never a shared reference to these.
#[derive(Debug, Clone)]
pub struct Params {
    values: Map<String, Value>,
}

impl Params {
    /// Bind raw input against a declared schema.
    ///
    /// Undeclared keys in the input are ignored. Declared values are
    /// coerced to their kind; a required parameter that is missing (or a
    /// value that cannot be coerced) is a configuration error.
    pub fn bind(spec: &[ParamSpec], raw: &Value) -> Result<Self, WorkerError> {
        let empty = Map::new();
        let input = raw.as_object().unwrap_or(&empty);

        let mut values = Map::new();
        for param in spec {
            let bound = match input.get(param.name) {
                Some(value) if !value.is_null() => {
                    coerce(param.kind, value).ok_or_else(|| WorkerError::Configuration {
                        param: param.name.to_string(),
                        reason: format!("expected {:?}, got {value}", param.kind),
                    })?
                }
                _ => match &param.default {
                    Some(default) => default.clone(),
                    None if param.required => {
                        return Err(WorkerError::Configuration {
                            param: param.name.to_string(),
                            reason: "required parameter missing".to_string(),
                        });
                    }
                    None => Value::Null,
                },
            };
            values.insert(param.name.to_string(), bound);
        }

        Ok(Self { values })
    }

    /// A required string value.
    pub fn str(&self, name: &str) -> Result<&str, WorkerError> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| missing(name, "string"))
    }

    /// An optional string value; `None` when absent or null.
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// A required unsigned integer value.
    pub fn u32(&self, name: &str) -> Result<u32, WorkerError> {
        self.values
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| missing(name, "unsigned integer"))
    }

    /// A required boolean value.
    pub fn bool(&self, name: &str) -> Result<bool, WorkerError> {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| missing(name, "boolean"))
    }

    /// A required list-of-strings value.
    pub fn str_list(&self, name: &str) -> Result<Vec<String>, WorkerError> {
        let items = self
            .values
            .get(name)
            .and_then(Value::as_array)
            .ok_or_else(|| missing(name, "string list"))?;
        Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    /// The raw bound value, `None` when absent or null.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }
}

fn missing(name: &str, kind: &str) -> WorkerError {
    WorkerError::Configuration {
        param: name.to_string(),
        reason: format!("{kind} value not bound"),
    }
}

fn coerce(kind: ParamKind, value: &Value) -> Option<Value> {
    match kind {
        ParamKind::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
        ParamKind::Number => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(Value::from)),
            _ => None,
        },
        ParamKind::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        ParamKind::StringList => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => Some(value.clone()),
            Value::String(s) => Some(Value::Array(vec![Value::String(s.clone())])),
            _ => None,
        },
        ParamKind::Json => Some(value.clone()),
    }
}
