//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not OpenAI-compatible proxy).
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - `stop_reason == "tool_use"` decides between a final answer and tool calls

use async_trait::async_trait;
use ledgerclaw_core::error::ProviderError;
use ledgerclaw_core::message::{Message, Role};
use ledgerclaw_core::provider::*;
use ledgerclaw_core::tool::{ToolCall, ToolSpec};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert messages to Anthropic API format with content blocks.
    ///
    /// Consecutive tool results are merged into a single user message, which
    /// is how the API expects the answers to one multi-call turn.
    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Text(msg.content.clone()),
                    });
                }
                Role::Assistant if msg.tool_calls.is_empty() => {
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Text(msg.content.clone()),
                    });
                }
                Role::Assistant => {
                    let mut blocks: Vec<ContentBlock> = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    for tc in &msg.tool_calls {
                        blocks.push(ContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: tc.arguments.clone(),
                        });
                    }
                    result.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::Tool => {
                    let block = ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: msg.is_error,
                    };
                    match result.last_mut() {
                        Some(AnthropicMessage {
                            role,
                            content: AnthropicContent::Blocks(blocks),
                        }) if role == "user" => blocks.push(block),
                        _ => result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Blocks(vec![block]),
                        }),
                    }
                }
            }
        }

        result
    }

    fn to_api_tools(tools: &[ToolSpec]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }

    /// Convert Anthropic API response to our ProviderResponse.
    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text = String::new();
        let mut calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&t);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    calls.push(ToolCall {
                        id,
                        name,
                        arguments: input,
                    });
                }
            }
        }

        let wants_tools = resp.stop_reason.as_deref() == Some("tool_use");
        let turn = if wants_tools && !calls.is_empty() {
            ModelTurn::ToolUse { text, calls }
        } else {
            if !calls.is_empty() {
                warn!(
                    stop_reason = ?resp.stop_reason,
                    dropped = calls.len(),
                    "tool_use blocks without tool_use stop reason; treating as final answer"
                );
            }
            ModelTurn::Final { text }
        };

        ProviderResponse {
            turn,
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            model: resp.model,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "system": request.system,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(
            provider = "anthropic",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Anthropic: {e}")))?;

        Ok(Self::response_to_provider_response(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerclaw_core::tool::ToolClass;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: serde_json::json!({"search": "Acme"}),
        }
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = AnthropicProvider::new("sk-ant-test")
            .with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_calls("Let me look", vec![call("toolu_1", "get_contact_details")]);
        let api_msgs = AnthropicProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs.len(), 1);
        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                match &blocks[1] {
                    ContentBlock::ToolUse { id, input, .. } => {
                        assert_eq!(id, "toolu_1");
                        assert_eq!(input["search"], "Acme");
                    }
                    _ => panic!("Expected tool_use block"),
                }
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn consecutive_tool_results_share_one_user_message() {
        let messages = vec![
            Message::user("Who owes us?"),
            Message::assistant_with_calls("", vec![call("t1", "a"), call("t2", "b")]),
            Message::tool_result("t1", r#"{"ok":1}"#),
            Message::tool_error("t2", "Unknown tool: b"),
        ];
        let api_msgs = AnthropicProvider::to_api_messages(&messages);
        assert_eq!(api_msgs.len(), 3);
        assert_eq!(api_msgs[2].role, "user");

        let json = serde_json::to_value(&api_msgs[2]).unwrap();
        let blocks = json["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "tool_result");
        assert!(blocks[0].get("is_error").is_none());
        assert_eq!(blocks[1]["tool_use_id"], "t2");
        assert_eq!(blocks[1]["is_error"], true);
    }

    #[test]
    fn tool_spec_conversion() {
        let tools = vec![ToolSpec {
            name: "query_database".into(),
            description: "Run a SELECT".into(),
            input_schema: serde_json::json!({"type": "object"}),
            class: ToolClass::ReadOnly,
        }];
        let api_tools = AnthropicProvider::to_api_tools(&tools);
        assert_eq!(api_tools[0].name, "query_database");
        assert_eq!(api_tools[0].input_schema["type"], "object");
    }

    #[test]
    fn parse_text_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-sonnet-4-20250514",
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();

        let pr = AnthropicProvider::response_to_provider_response(resp);
        assert_eq!(pr.turn, ModelTurn::Final { text: "Hello!".into() });
        assert_eq!(pr.usage.unwrap().total_tokens, 15);
        assert_eq!(pr.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn parse_tool_use_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_02",
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "text", "text": "Checking"},
                    {"type": "tool_use", "id": "toolu_abc", "name": "get_overdue_invoices", "input": {"type": "receivable"}},
                    {"type": "tool_use", "id": "toolu_def", "name": "create_invoice", "input": {"contact_id": "C-1"}}
                ],
                "usage": {"input_tokens": 20, "output_tokens": 10},
                "stop_reason": "tool_use"
            }"#,
        )
        .unwrap();

        match AnthropicProvider::response_to_provider_response(resp).turn {
            ModelTurn::ToolUse { text, calls } => {
                assert_eq!(text, "Checking");
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].name, "get_overdue_invoices");
                assert_eq!(calls[1].id, "toolu_def");
                assert_eq!(calls[0].arguments["type"], "receivable");
            }
            other => panic!("Expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn tool_blocks_without_tool_use_stop_are_final() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "model": "m",
                "content": [
                    {"type": "text", "text": "Partial"},
                    {"type": "tool_use", "id": "t", "name": "x", "input": {}}
                ],
                "usage": {"input_tokens": 1, "output_tokens": 1},
                "stop_reason": "max_tokens"
            }"#,
        )
        .unwrap();
        let pr = AnthropicProvider::response_to_provider_response(resp);
        assert_eq!(pr.turn, ModelTurn::Final { text: "Partial".into() });
    }
}
