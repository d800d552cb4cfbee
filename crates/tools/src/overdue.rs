//! get_overdue_invoices: status 4 documents, largest first.

use crate::ledger::{Bind, LedgerDb};
use async_trait::async_trait;
use ledgerclaw_core::error::ToolError;
use ledgerclaw_core::tool::{Tool, ToolResult};
use std::sync::Arc;

const OVERDUE: i64 = 4;

pub struct GetOverdueInvoicesTool {
    ledger: Arc<LedgerDb>,
}

impl GetOverdueInvoicesTool {
    pub fn new(ledger: Arc<LedgerDb>) -> Self {
        Self { ledger }
    }

    async fn overdue_in(
        &self,
        table: &str,
        source: &str,
        min_amount: f64,
    ) -> Result<Vec<serde_json::Value>, ToolError> {
        let sql = format!(
            "SELECT id, contact_name, amount, date, status FROM {table} \
             WHERE status = {OVERDUE} AND amount >= ?1 ORDER BY amount DESC"
        );
        let mut rows = self.ledger.rows(&sql, &[Bind::Real(min_amount)]).await?;
        for row in &mut rows {
            row["source"] = source.into();
        }
        Ok(rows)
    }
}

#[async_trait]
impl Tool for GetOverdueInvoicesTool {
    fn name(&self) -> &str {
        "get_overdue_invoices"
    }

    fn description(&self) -> &str {
        "Get all overdue invoices (status=4). Returns a list sorted by amount descending."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["receivable", "payable", "both"],
                    "description": "receivable=sales invoices, payable=purchase invoices, both=all. Default: both"
                },
                "min_amount": {"type": "number", "description": "Minimum amount filter"}
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let kind = arguments["type"].as_str().unwrap_or("both");
        let min_amount = arguments["min_amount"].as_f64().unwrap_or(0.0);

        let mut overdue = Vec::new();
        if matches!(kind, "receivable" | "both") {
            overdue.extend(self.overdue_in("invoices", "receivable", min_amount).await?);
        }
        if matches!(kind, "payable" | "both") {
            overdue.extend(self.overdue_in("purchase_invoices", "payable", min_amount).await?);
        }

        let total: f64 = overdue.iter().filter_map(|r| r["amount"].as_f64()).sum();
        Ok(ToolResult::ok(serde_json::json!({
            "count": overdue.len(),
            "total_overdue": (total * 100.0).round() / 100.0,
            "overdue": overdue,
        })))
    }
}
