use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A tool descriptor the model can be offered. The invocation schema is
/// built once at registration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema for the tool's arguments
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool with an explicit JSON schema
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Build a tool descriptor declaratively, parameter by parameter
    pub fn builder<N, D>(name: N, description: D) -> ToolBuilder
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolBuilder {
            name: name.into(),
            description: description.into(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

/// Coarse parameter types accepted by the schema builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    fn type_name(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }
}

/// Declarative schema builder: the tool author states each parameter
/// explicitly instead of relying on signature reflection. Building the
/// same parameter list twice yields an identical schema.
pub struct ToolBuilder {
    name: String,
    description: String,
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ToolBuilder {
    /// Add a required parameter
    pub fn param<N, D>(mut self, name: N, kind: ParamKind, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            json!({"type": kind.type_name(), "description": description.into()}),
        );
        self.required.push(name);
        self
    }

    /// Add an optional parameter
    pub fn optional_param<N, D>(mut self, name: N, kind: ParamKind, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        self.properties.insert(
            name.into(),
            json!({"type": kind.type_name(), "description": description.into()}),
        );
        self
    }

    pub fn build(self) -> Tool {
        let schema = json!({
            "type": "object",
            "properties": Value::Object(self.properties),
            "required": self.required,
        });
        Tool::new(self.name, self.description, schema)
    }
}
