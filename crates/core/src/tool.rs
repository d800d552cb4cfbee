//! Tool trait: the abstraction over assistant capabilities.
//!
//! Every tool declares a name, an input schema and a classification.
//! Read-only tools run as soon as the model asks for them; mutating tools
//! change state in an external system and are held for user approval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::ToolError;

/// A request from the model to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, unique within one model turn (matches the backend's tool_use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// Whether running a tool changes anything outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolClass {
    ReadOnly,
    Mutating,
}

/// The immutable catalog entry advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
    pub class: ToolClass,
}

impl ToolSpec {
    pub fn is_mutating(&self) -> bool {
        self.class == ToolClass::Mutating
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool reports success
    pub success: bool,

    /// Structured output, sent back to the model as JSON text
    pub data: serde_json::Value,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::json!({ "error": reason.into() }),
        }
    }

    /// Serialized form placed into the tool-result message.
    pub fn to_content(&self) -> String {
        self.data.to_string()
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "query_database").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Read-only unless the tool says otherwise.
    fn class(&self) -> ToolClass {
        ToolClass::ReadOnly
    }

    /// One-line summary of what running this call would do, shown to the
    /// user before a mutating call is approved.
    fn describe_action(&self, _arguments: &serde_json::Value) -> String {
        format!("Execute {}", self.name())
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
            class: self.class(),
        }
    }
}

struct Registered {
    tool: Box<dyn Tool>,
    validator: Option<jsonschema::Validator>,
}

/// The static tool catalog.
///
/// Built once at startup and shared read-only (`Arc<ToolRegistry>`) by every
/// request, so lookups need no locking.
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        let validator = match jsonschema::validator_for(&tool.parameters_schema()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(tool = %name, error = %e, "Input schema does not compile; arguments will not be validated");
                None
            }
        };
        self.tools.insert(name, Registered { tool, validator });
    }

    fn entry(&self, name: &str) -> Result<&Registered, ToolError> {
        self.tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Result<ToolSpec, ToolError> {
        self.entry(name).map(|e| e.tool.spec())
    }

    pub fn classify(&self, name: &str) -> Result<ToolClass, ToolError> {
        self.entry(name).map(|e| e.tool.class())
    }

    /// Every tool spec, sorted by name so the advertised catalog is stable.
    pub fn catalog(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|e| e.tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Check a call's arguments against the tool's input schema.
    pub fn validate(&self, call: &ToolCall) -> Result<(), ToolError> {
        let entry = self.entry(&call.name)?;
        let Some(validator) = &entry.validator else {
            return Ok(());
        };
        let errors: Vec<String> = validator
            .iter_errors(&call.arguments)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(errors.join("; ")))
        }
    }

    /// Human description for a call; falls back to the generic form for unknown tools.
    pub fn describe(&self, call: &ToolCall) -> String {
        match self.entry(&call.name) {
            Ok(e) => e.tool.describe_action(&call.arguments),
            Err(_) => format!("Execute {}", call.name),
        }
    }

    /// Validate and execute a tool call.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        self.validate(call)?;
        let entry = self.entry(&call.name)?;
        entry.tool.execute(call.arguments.clone()).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
