//! The agent reasoning loop implementation.
//!
//! One `run` turns a message history into either a final answer or a
//! suspension at the first mutating tool call. Read-only tools execute
//! inline; tool failures become error tool-results the model can react to.

use crate::pending::PendingAction;
use crate::stream_event::AgentStreamEvent;
use chrono::Utc;
use ledgerclaw_core::error::AgentError;
use ledgerclaw_core::event::{DomainEvent, EventBus};
use ledgerclaw_core::history::ToolUsage;
use ledgerclaw_core::message::{ConversationId, Message};
use ledgerclaw_core::provider::{ModelTurn, Provider, ProviderRequest, ProviderResponse};
use ledgerclaw_core::tool::{ToolCall, ToolClass, ToolRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Sent when the model ends a turn without any text.
pub const EMPTY_ANSWER: &str = "I could not put together an answer to that. Could you rephrase the question?";

/// Loop state captured at a mutating tool call.
#[derive(Debug, Clone)]
pub struct Suspension {
    /// History up to and including the assistant turn that asked for the
    /// tool, followed by results of read-only calls that ran before it
    pub snapshot: Vec<Message>,
    pub invocation: ToolCall,
    /// Calls of the same turn after `invocation`; never executed
    pub skipped: Vec<ToolCall>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub enum LoopOutcome {
    Answer { text: String, tools_used: Vec<ToolUsage> },
    Suspended(Suspension),
}

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    /// The model backend
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Maximum model turns per message
    max_iterations: u32,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            event_bus,
        }
    }

    /// Set the maximum number of model turns per message.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    async fn complete(
        &self,
        conversation_id: &ConversationId,
        model: &str,
        system: &str,
        messages: &[Message],
    ) -> Result<ProviderResponse, AgentError> {
        let request = ProviderRequest {
            model: model.to_string(),
            system: system.to_string(),
            messages: messages.to_vec(),
            tools: self.tools.catalog(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self.provider.complete(request).await?;

        if let Some(usage) = &response.usage {
            self.event_bus.publish(DomainEvent::ResponseGenerated {
                conversation_id: conversation_id.to_string(),
                model: response.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }
        Ok(response)
    }

    /// Execute one call and turn the outcome into a tool-result message.
    async fn dispatch(&self, call: &ToolCall) -> Message {
        let start = std::time::Instant::now();
        let result = self.tools.execute(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let success = matches!(&result, Ok(r) if r.success);
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        match result {
            Ok(tool_result) => {
                debug!(tool = %call.name, success, duration_ms, "Tool executed");
                let mut msg = Message::tool_result(&call.id, tool_result.to_content());
                msg.is_error = !tool_result.success;
                msg
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                Message::tool_error(&call.id, e)
            }
        }
    }

    /// Drive the model until it answers or asks for a mutating tool.
    ///
    /// `messages` is the loaded history followed by the new user message.
    /// When `events` is given, a `tool_started` event is sent for every
    /// call reached.
    pub async fn run(
        &self,
        conversation_id: &ConversationId,
        system: &str,
        mut messages: Vec<Message>,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<LoopOutcome, AgentError> {
        let mut tools_used = Vec::new();

        for iteration in 1..=self.max_iterations {
            debug!(conversation_id = %conversation_id, iteration, "Agent loop iteration");

            let response = self
                .complete(conversation_id, &self.model, system, &messages)
                .await?;

            let (text, calls) = match response.turn {
                ModelTurn::Final { text } => {
                    let text = match text.trim() {
                        "" => {
                            warn!(conversation_id = %conversation_id, "Model returned an empty answer");
                            EMPTY_ANSWER.to_string()
                        }
                        trimmed => trimmed.to_string(),
                    };
                    return Ok(LoopOutcome::Answer { text, tools_used });
                }
                ModelTurn::ToolUse { text, calls } => (text, calls),
            };

            debug!(tool_count = calls.len(), "Executing tool calls");
            let assistant = Message::assistant_with_calls(text, calls.clone());
            let mut results = Vec::with_capacity(calls.len());

            for (i, call) in calls.iter().enumerate() {
                if let Some(tx) = events {
                    let _ = tx
                        .send(AgentStreamEvent::ToolStarted {
                            id: call.id.clone(),
                            tool: call.name.clone(),
                        })
                        .await;
                }

                match self.tools.classify(&call.name) {
                    Ok(ToolClass::Mutating) => {
                        // Never ask the user to approve a call that cannot run.
                        if let Err(e) = self.tools.validate(call) {
                            warn!(tool = %call.name, error = %e, "Rejected mutating call with invalid input");
                            results.push(Message::tool_error(&call.id, e));
                            continue;
                        }

                        let skipped = calls[i + 1..].to_vec();
                        if !skipped.is_empty() {
                            warn!(
                                tool = %call.name,
                                dropped = skipped.len(),
                                "Dropping tool calls after mutating call"
                            );
                        }
                        info!(conversation_id = %conversation_id, tool = %call.name, "Suspending for confirmation");

                        let mut snapshot = messages;
                        snapshot.push(assistant);
                        snapshot.extend(results);
                        return Ok(LoopOutcome::Suspended(Suspension {
                            snapshot,
                            invocation: call.clone(),
                            skipped,
                            description: self.tools.describe(call),
                        }));
                    }
                    Ok(ToolClass::ReadOnly) => {
                        tools_used.push(ToolUsage::for_call(call));
                        results.push(self.dispatch(call).await);
                    }
                    Err(e) => {
                        warn!(tool = %call.name, "Model requested an unknown tool");
                        results.push(Message::tool_error(&call.id, e));
                    }
                }
            }

            messages.push(assistant);
            messages.extend(results);
        }

        warn!(
            conversation_id = %conversation_id,
            iterations = self.max_iterations,
            "Max tool iterations reached"
        );
        Err(AgentError::IterationLimit(self.max_iterations))
    }

    /// Execute an approved action and ask the model for closing text.
    ///
    /// Exactly one model turn follows the write; tool requests in it are
    /// ignored.
    pub async fn resume(&self, action: &PendingAction) -> Result<String, AgentError> {
        let suspension = &action.suspension;
        let mut messages = suspension.snapshot.clone();
        messages.push(self.dispatch(&suspension.invocation).await);
        for call in &suspension.skipped {
            messages.push(Message::tool_error(
                &call.id,
                format!(
                    "Not executed: held back while {} awaited confirmation. Request it again if still needed.",
                    suspension.invocation.name
                ),
            ));
        }

        let response = self
            .complete(&action.conversation_id, &action.model, &action.system_prompt, &messages)
            .await?;

        if let ModelTurn::ToolUse { calls, .. } = &response.turn {
            warn!(
                conversation_id = %action.conversation_id,
                ignored = calls.len(),
                "Ignoring tool requests after confirmed action"
            );
        }

        let text = response.turn.text().trim();
        Ok(if text.is_empty() {
            format!("Done: {}.", suspension.description)
        } else {
            text.to_string()
        })
    }
}
