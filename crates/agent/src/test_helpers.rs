//! Shared test doubles: a scripted provider and a pair of counting tools.

use async_trait::async_trait;
use ledgerclaw_core::error::{ProviderError, ToolError};
use ledgerclaw_core::provider::{ModelTurn, Provider, ProviderRequest, ProviderResponse, Usage};
use ledgerclaw_core::tool::{Tool, ToolCall, ToolClass, ToolRegistry, ToolResult};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Returns queued responses in order and records every request.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a backend failure after the scripted responses.
    pub fn then_fail(self, error: ProviderError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::MalformedResponse("script exhausted".into())))
    }
}

fn response(turn: ModelTurn) -> ProviderResponse {
    ProviderResponse {
        turn,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    response(ModelTurn::Final { text: text.into() })
}

pub fn tool_response(calls: Vec<ToolCall>) -> ProviderResponse {
    response(ModelTurn::ToolUse {
        text: String::new(),
        calls,
    })
}

pub fn make_tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

/// Read-only tool that echoes its `key` argument.
pub struct LookupTool {
    pub name: &'static str,
    pub runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for LookupTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "Look something up"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"key": {"type": "string"}}})
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if arguments["key"] == "boom" {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name.into(),
                reason: "lookup exploded".into(),
            });
        }
        Ok(ToolResult::ok(serde_json::json!({"tool": self.name, "key": arguments["key"]})))
    }
}

/// Mutating tool that counts executions.
pub struct WriteTool {
    pub runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write_record"
    }
    fn description(&self) -> &str {
        "Write a record"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"value": {"type": "string"}},
            "required": ["value"]
        })
    }
    fn class(&self) -> ToolClass {
        ToolClass::Mutating
    }
    fn describe_action(&self, arguments: &serde_json::Value) -> String {
        format!("Write {}", arguments["value"].as_str().unwrap_or("?"))
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::ok(serde_json::json!({"written": arguments["value"]})))
    }
}

/// Execution counters for the tools in [`registry`].
#[derive(Clone, Default)]
pub struct Counters {
    pub lookups: Arc<AtomicUsize>,
    pub writes: Arc<AtomicUsize>,
}

impl Counters {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

/// `lookup_a`, `lookup_b`, `lookup_c` (read-only) and `write_record` (mutating).
pub fn registry() -> (Arc<ToolRegistry>, Counters) {
    let counters = Counters::default();
    let mut registry = ToolRegistry::new();
    for name in ["lookup_a", "lookup_b", "lookup_c"] {
        registry.register(Box::new(LookupTool {
            name,
            runs: counters.lookups.clone(),
        }));
    }
    registry.register(Box::new(WriteTool {
        runs: counters.writes.clone(),
    }));
    (Arc::new(registry), counters)
}
