//! Parameter schemas and argument validation.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// The JSON type a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// A JSON string.
    String,
    /// A JSON number with no fractional part.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
}

impl ParamType {
    /// The JSON Schema name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parameter of a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Expected JSON type.
    pub ty: ParamType,
    /// Whether the parameter must be supplied.
    pub required: bool,
    /// Human-readable description.
    pub description: &'static str,
}

/// A template argument as advertised by `templates/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentDescriptor {
    /// Argument name.
    pub name: &'static str,
    /// Expected JSON type.
    #[serde(rename = "type")]
    pub ty: ParamType,
    /// Human-readable description.
    pub description: &'static str,
    /// Whether the argument must be supplied.
    pub required: bool,
}

/// A schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Arguments were not a JSON object.
    #[error("Arguments must be an object")]
    NotAnObject,

    /// A required parameter was absent.
    #[error("Missing required parameter: {parameter}")]
    Missing {
        /// Parameter name.
        parameter: String,
    },

    /// A parameter had the wrong JSON type.
    #[error("Parameter '{parameter}' must be of type {expected}")]
    WrongType {
        /// Parameter name.
        parameter: String,
        /// The type the schema asks for.
        expected: ParamType,
    },

    /// A parameter the schema does not define.
    #[error("Unknown parameter: {parameter}")]
    Unexpected {
        /// Parameter name.
        parameter: String,
    },
}

impl ValidationError {
    /// The offending parameter, when there is one.
    #[must_use]
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::NotAnObject => None,
            Self::Missing { parameter }
            | Self::WrongType { parameter, .. }
            | Self::Unexpected { parameter } => Some(parameter),
        }
    }

    /// Machine-readable problem tag.
    #[must_use]
    pub const fn problem(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::Missing { .. } => "missing",
            Self::WrongType { .. } => "wrong_type",
            Self::Unexpected { .. } => "unexpected",
        }
    }
}

/// Ordered parameter definitions for one capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSchema {
    params: IndexMap<&'static str, ParamSpec>,
}

impl ParamSchema {
    /// A schema with no parameters.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a required parameter.
    #[must_use]
    pub fn required(self, name: &'static str, ty: ParamType, description: &'static str) -> Self {
        self.with(name, ty, true, description)
    }

    /// Adds an optional parameter.
    #[must_use]
    pub fn optional(self, name: &'static str, ty: ParamType, description: &'static str) -> Self {
        self.with(name, ty, false, description)
    }

    fn with(
        mut self,
        name: &'static str,
        ty: ParamType,
        required: bool,
        description: &'static str,
    ) -> Self {
        self.params.insert(
            name,
            ParamSpec {
                ty,
                required,
                description,
            },
        );
        self
    }

    /// Renders as a JSON Schema object.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|(name, spec)| {
                (
                    (*name).to_string(),
                    json!({ "type": spec.ty, "description": spec.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| *name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Renders as a template argument list.
    #[must_use]
    pub fn to_arguments(&self) -> Vec<ArgumentDescriptor> {
        self.params
            .iter()
            .map(|(name, spec)| ArgumentDescriptor {
                name: *name,
                ty: spec.ty,
                description: spec.description,
                required: spec.required,
            })
            .collect()
    }

    /// Checks `arguments` against this schema.
    ///
    /// `null` is treated as an empty object.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, checking declared parameters in
    /// order before looking for unknown ones.
    pub fn validate(&self, arguments: &Value) -> Result<Arguments, ValidationError> {
        let map = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => return Err(ValidationError::NotAnObject),
        };

        for (name, spec) in &self.params {
            match map.get(*name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(ValidationError::Missing {
                        parameter: (*name).to_string(),
                    });
                }
                Some(value) if !value.is_null() && !spec.ty.accepts(value) => {
                    return Err(ValidationError::WrongType {
                        parameter: (*name).to_string(),
                        expected: spec.ty,
                    });
                }
                _ => {}
            }
        }

        if let Some(unknown) = map.keys().find(|k| !self.params.contains_key(k.as_str())) {
            return Err(ValidationError::Unexpected {
                parameter: unknown.clone(),
            });
        }

        Ok(Arguments(map))
    }
}

/// Arguments that passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    /// A string argument, if supplied.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}
