//! Built-in tools for LedgerClaw.
//!
//! Read-only tools query the local ledger database. Mutating tools build a
//! [`business::BusinessWrite`] and submit it through a
//! [`business::BusinessClient`]; the engine only runs them after the user
//! confirms.

pub mod business;
pub mod contacts;
pub mod documents;
pub mod invoices;
pub mod ledger;
pub mod overdue;
pub mod query_database;
pub mod send_document;
pub mod update_invoice_status;

use business::BusinessClient;
use ledgerclaw_core::tool::ToolRegistry;
use std::sync::Arc;

pub use business::DryRunClient;
pub use ledger::{LedgerDb, LedgerSummary};

/// Create the registry with every built-in tool.
pub fn default_registry(ledger: Arc<LedgerDb>, client: Arc<dyn BusinessClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(query_database::QueryDatabaseTool::new(ledger.clone())));
    registry.register(Box::new(contacts::GetContactDetailsTool::new(ledger.clone())));
    registry.register(Box::new(overdue::GetOverdueInvoicesTool::new(ledger.clone())));
    registry.register(Box::new(documents::GetDocumentDetailsTool::new(ledger)));

    registry.register(Box::new(invoices::CreateDocumentTool::invoice(client.clone())));
    registry.register(Box::new(invoices::CreateDocumentTool::estimate(client.clone())));
    registry.register(Box::new(send_document::SendDocumentTool::new(client.clone())));
    registry.register(Box::new(contacts::CreateContactTool::new(client.clone())));
    registry.register(Box::new(update_invoice_status::UpdateInvoiceStatusTool::new(client)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerclaw_core::tool::ToolClass;

    async fn registry() -> ToolRegistry {
        let ledger = Arc::new(ledger::demo_ledger().await);
        default_registry(ledger, Arc::new(DryRunClient::new()))
    }

    #[tokio::test]
    async fn registers_all_tools() {
        let registry = registry().await;
        assert_eq!(registry.len(), 9);
        let names: Vec<String> = registry.catalog().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "create_contact",
                "create_estimate",
                "create_invoice",
                "get_contact_details",
                "get_document_details",
                "get_overdue_invoices",
                "query_database",
                "send_document",
                "update_invoice_status",
            ]
        );
    }

    #[tokio::test]
    async fn classification() {
        let registry = registry().await;
        for name in [
            "query_database",
            "get_contact_details",
            "get_overdue_invoices",
            "get_document_details",
        ] {
            assert_eq!(registry.classify(name).unwrap(), ToolClass::ReadOnly, "{name}");
        }
        for name in [
            "create_invoice",
            "create_estimate",
            "send_document",
            "create_contact",
            "update_invoice_status",
        ] {
            assert_eq!(registry.classify(name).unwrap(), ToolClass::Mutating, "{name}");
        }
    }

    #[tokio::test]
    async fn every_schema_compiles() {
        let registry = registry().await;
        for spec in registry.catalog() {
            assert!(
                jsonschema::validator_for(&spec.input_schema).is_ok(),
                "{} schema",
                spec.name
            );
        }
    }
}
