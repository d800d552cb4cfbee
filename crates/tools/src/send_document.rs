//! send_document: email a document to its contact.

use crate::business::{write_result, BusinessClient, BusinessWrite};
use async_trait::async_trait;
use ledgerclaw_core::error::ToolError;
use ledgerclaw_core::tool::{Tool, ToolClass, ToolResult};
use std::sync::Arc;

pub struct SendDocumentTool {
    client: Arc<dyn BusinessClient>,
}

impl SendDocumentTool {
    pub fn new(client: Arc<dyn BusinessClient>) -> Self {
        Self { client }
    }
}

fn string_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[async_trait]
impl Tool for SendDocumentTool {
    fn name(&self) -> &str {
        "send_document"
    }

    fn description(&self) -> &str {
        "Send a document (invoice, estimate, purchase) by email with its PDF attached. \
         Requires user confirmation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "doc_type": {"type": "string", "enum": ["invoice", "estimate", "purchase"]},
                "doc_id": {"type": "string"},
                "emails": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Email addresses. If omitted, sends to the contact's email on file."
                },
                "subject": {"type": "string", "description": "Email subject (optional)"},
                "body": {"type": "string", "description": "Email body text (optional)"}
            },
            "required": ["doc_type", "doc_id"]
        })
    }

    fn class(&self) -> ToolClass {
        ToolClass::Mutating
    }

    fn describe_action(&self, arguments: &serde_json::Value) -> String {
        let emails = string_list(&arguments["emails"]);
        let to = if emails.is_empty() {
            "contact's email on file".to_string()
        } else {
            emails.join(", ")
        };
        format!(
            "Send {} {} to {}",
            arguments["doc_type"].as_str().unwrap_or("document"),
            arguments["doc_id"].as_str().unwrap_or("?"),
            to
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let field = |key: &str| {
            arguments[key]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
        };

        let receipt = self
            .client
            .submit(BusinessWrite::SendDocument {
                doc_type: field("doc_type")?,
                doc_id: field("doc_id")?,
                emails: string_list(&arguments["emails"]),
                subject: field("subject").ok(),
                body: field("body").ok(),
            })
            .await?;

        Ok(ToolResult::ok(write_result(self.client.as_ref(), receipt, "Document sent")))
    }
}
