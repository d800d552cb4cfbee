//! get_document_details: one document header with its line items.

use crate::ledger::{Bind, LedgerDb};
use async_trait::async_trait;
use ledgerclaw_core::error::ToolError;
use ledgerclaw_core::tool::{Tool, ToolResult};
use std::sync::Arc;

/// (header table, items table, items foreign key) per document type.
fn tables_for(doc_type: &str) -> Option<(&'static str, &'static str, &'static str)> {
    match doc_type {
        "invoice" => Some(("invoices", "invoice_items", "invoice_id")),
        "purchase" => Some(("purchase_invoices", "purchase_items", "purchase_id")),
        "estimate" => Some(("estimates", "estimate_items", "estimate_id")),
        _ => None,
    }
}

pub struct GetDocumentDetailsTool {
    ledger: Arc<LedgerDb>,
}

impl GetDocumentDetailsTool {
    pub fn new(ledger: Arc<LedgerDb>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Tool for GetDocumentDetailsTool {
    fn name(&self) -> &str {
        "get_document_details"
    }

    fn description(&self) -> &str {
        "Get full details of a specific invoice, purchase, or estimate including all line items."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "doc_type": {"type": "string", "enum": ["invoice", "purchase", "estimate"]},
                "doc_id": {"type": "string", "description": "The document ID"}
            },
            "required": ["doc_type", "doc_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let doc_type = arguments["doc_type"].as_str().unwrap_or_default();
        let doc_id = arguments["doc_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'doc_id' argument".into()))?;

        let Some((table, items_table, fk)) = tables_for(doc_type) else {
            return Ok(ToolResult::failed(format!("Unknown doc_type: {doc_type}")));
        };

        let header = self
            .ledger
            .rows(&format!("SELECT * FROM {table} WHERE id = ?1"), &[Bind::Text(doc_id)])
            .await?;
        let Some(document) = header.into_iter().next() else {
            return Ok(ToolResult::failed(format!("Document {doc_id} not found")));
        };

        let items = self
            .ledger
            .rows(
                &format!("SELECT * FROM {items_table} WHERE {fk} = ?1"),
                &[Bind::Text(doc_id)],
            )
            .await?;

        Ok(ToolResult::ok(serde_json::json!({
            "document": document,
            "items": items,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::demo_ledger;

    #[tokio::test]
    async fn invoice_with_items() {
        let tool = GetDocumentDetailsTool::new(Arc::new(demo_ledger().await));
        let result = tool
            .execute(serde_json::json!({"doc_type": "invoice", "doc_id": "INV-2"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data["document"]["contact_name"], "Acme Industries");
        assert_eq!(result.data["items"][0]["name"], "Server rack");
    }

    #[tokio::test]
    async fn missing_document() {
        let tool = GetDocumentDetailsTool::new(Arc::new(demo_ledger().await));
        let result = tool
            .execute(serde_json::json!({"doc_type": "estimate", "doc_id": "EST-404"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.data["error"], "Document EST-404 not found");
    }
}
