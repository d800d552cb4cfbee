//! update_invoice_status: move an invoice or purchase to a new status.

use crate::business::{write_result, BusinessClient, BusinessWrite};
use async_trait::async_trait;
use ledgerclaw_core::error::ToolError;
use ledgerclaw_core::tool::{Tool, ToolClass, ToolResult};
use std::sync::Arc;

pub fn status_label(status: u64) -> Option<&'static str> {
    match status {
        0 => Some("draft"),
        1 => Some("issued"),
        2 => Some("partial"),
        3 => Some("paid"),
        4 => Some("overdue"),
        5 => Some("cancelled"),
        _ => None,
    }
}

pub struct UpdateInvoiceStatusTool {
    client: Arc<dyn BusinessClient>,
}

impl UpdateInvoiceStatusTool {
    pub fn new(client: Arc<dyn BusinessClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for UpdateInvoiceStatusTool {
    fn name(&self) -> &str {
        "update_invoice_status"
    }

    fn description(&self) -> &str {
        "Update the status of an invoice or purchase invoice (e.g., mark as paid). Requires user confirmation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "doc_type": {"type": "string", "enum": ["invoice", "purchase"]},
                "doc_id": {"type": "string", "description": "The document ID"},
                "status": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 5,
                    "description": "New status: 0=draft, 1=issued, 2=partial, 3=paid, 4=overdue, 5=cancelled"
                }
            },
            "required": ["doc_type", "doc_id", "status"]
        })
    }

    fn class(&self) -> ToolClass {
        ToolClass::Mutating
    }

    fn describe_action(&self, arguments: &serde_json::Value) -> String {
        let status = match arguments["status"].as_u64() {
            Some(n) => status_label(n).map(str::to_string).unwrap_or_else(|| n.to_string()),
            None => arguments["status"].to_string(),
        };
        format!(
            "Update {} {} status to {}",
            arguments["doc_type"].as_str().unwrap_or("document"),
            arguments["doc_id"].as_str().unwrap_or("?"),
            status
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let doc_type = arguments["doc_type"].as_str().unwrap_or_default();
        if !matches!(doc_type, "invoice" | "purchase") {
            return Ok(ToolResult::failed(format!("Unknown doc_type: {doc_type}")));
        }
        let doc_id = arguments["doc_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'doc_id' argument".into()))?;
        let status = arguments["status"]
            .as_u64()
            .filter(|s| status_label(*s).is_some())
            .ok_or_else(|| ToolError::InvalidArguments("'status' must be an integer 0-5".into()))?;

        let receipt = self
            .client
            .submit(BusinessWrite::UpdateStatus {
                doc_type: doc_type.to_string(),
                doc_id: doc_id.to_string(),
                status: status as u8,
            })
            .await?;

        let done = format!("Status updated to {}", status_label(status).unwrap_or_default());
        Ok(ToolResult::ok(write_result(self.client.as_ref(), receipt, &done)))
    }
}
