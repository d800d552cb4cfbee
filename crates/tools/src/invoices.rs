//! create_invoice / create_estimate: new sales documents.

use crate::business::{format_amount, write_result, BusinessClient, BusinessWrite, DocumentKind, LineItem};
use async_trait::async_trait;
use ledgerclaw_core::error::ToolError;
use ledgerclaw_core::tool::{Tool, ToolClass, ToolResult};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct DocumentDraft {
    contact_id: String,
    items: Vec<LineItem>,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    date: Option<String>,
}

/// One tool type serves both document kinds; they differ only in name and wording.
pub struct CreateDocumentTool {
    kind: DocumentKind,
    client: Arc<dyn BusinessClient>,
}

impl CreateDocumentTool {
    pub fn invoice(client: Arc<dyn BusinessClient>) -> Self {
        Self {
            kind: DocumentKind::Invoice,
            client,
        }
    }

    pub fn estimate(client: Arc<dyn BusinessClient>) -> Self {
        Self {
            kind: DocumentKind::Estimate,
            client,
        }
    }
}

#[async_trait]
impl Tool for CreateDocumentTool {
    fn name(&self) -> &str {
        match self.kind {
            DocumentKind::Invoice => "create_invoice",
            DocumentKind::Estimate => "create_estimate",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            DocumentKind::Invoice => {
                "Create a new sales invoice. Requires contact_id and line items. Requires user confirmation."
            }
            DocumentKind::Estimate => {
                "Create a new estimate as a draft. Requires contact_id and line items. Requires user confirmation."
            }
        }
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "contact_id": {"type": "string", "description": "Contact ID"},
                "items": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "units": {"type": "number"},
                            "price": {"type": "number"},
                            "tax": {"type": "number", "description": "Tax % (e.g. 21 for VAT)"},
                            "retention": {"type": "number", "description": "Withholding %, 0 if N/A"}
                        },
                        "required": ["name", "units", "price"]
                    }
                },
                "desc": {"type": "string", "description": "Description/notes"},
                "date": {"type": "string", "description": "Date YYYY-MM-DD, defaults to today"}
            },
            "required": ["contact_id", "items"]
        })
    }

    fn class(&self) -> ToolClass {
        ToolClass::Mutating
    }

    fn describe_action(&self, arguments: &serde_json::Value) -> String {
        let items = arguments["items"].as_array().map(Vec::as_slice).unwrap_or_default();
        let subtotal: f64 = items
            .iter()
            .map(|i| i["units"].as_f64().unwrap_or(1.0) * i["price"].as_f64().unwrap_or(0.0))
            .sum();
        format!(
            "Create an {} for contact {} with {} items (subtotal: {} EUR)",
            self.kind.as_str(),
            arguments["contact_id"].as_str().unwrap_or("?"),
            items.len(),
            format_amount(subtotal)
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let draft: DocumentDraft = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let receipt = self
            .client
            .submit(BusinessWrite::CreateDocument {
                kind: self.kind,
                contact_id: draft.contact_id,
                desc: draft.desc,
                date: draft.date,
                items: draft.items,
            })
            .await?;

        let done = match self.kind {
            DocumentKind::Invoice => "Invoice created",
            DocumentKind::Estimate => "Estimate created",
        };
        Ok(ToolResult::ok(write_result(self.client.as_ref(), receipt, done)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business::DryRunClient;

    fn args() -> serde_json::Value {
        serde_json::json!({
            "contact_id": "C-1",
            "items": [
                {"name": "Server rack", "units": 1, "price": 1000.0, "tax": 21},
                {"name": "Install", "units": 2, "price": 125.0}
            ]
        })
    }

    #[test]
    fn describes_subtotal() {
        let tool = CreateDocumentTool::invoice(Arc::new(DryRunClient::new()));
        assert_eq!(
            tool.describe_action(&args()),
            "Create an invoice for contact C-1 with 2 items (subtotal: 1,250.00 EUR)"
        );

        let tool = CreateDocumentTool::estimate(Arc::new(DryRunClient::new()));
        assert_eq!(tool.name(), "create_estimate");
        assert!(tool.describe_action(&args()).starts_with("Create an estimate"));
    }

    #[test]
    fn describes_malformed_input_without_panicking() {
        let tool = CreateDocumentTool::invoice(Arc::new(DryRunClient::new()));
        assert_eq!(
            tool.describe_action(&serde_json::json!({"items": "many"})),
            "Create an invoice for contact ? with 0 items (subtotal: 0.00 EUR)"
        );
    }

    #[tokio::test]
    async fn submits_document_write() {
        let client = Arc::new(DryRunClient::new());
        let tool = CreateDocumentTool::invoice(client.clone());
        let result = tool.execute(args()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["message"], "Invoice created (dry run)");
        assert_eq!(result.data["id"], "dry-run-1");

        match &client.writes()[0] {
            BusinessWrite::CreateDocument { kind, items, .. } => {
                assert_eq!(*kind, DocumentKind::Invoice);
                assert_eq!(items[0].tax, Some(21.0));
                assert_eq!(items[1].retention, None);
            }
            other => panic!("Unexpected write {other:?}"),
        }
    }
}
