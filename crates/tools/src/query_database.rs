//! query_database: ad-hoc read-only SQL against the ledger.

use crate::ledger::{row_to_json, LedgerDb};
use async_trait::async_trait;
use futures::TryStreamExt;
use ledgerclaw_core::error::ToolError;
use ledgerclaw_core::tool::{Tool, ToolResult};
use std::sync::Arc;

/// Rows returned per query.
const MAX_ROWS: usize = 100;

const FORBIDDEN: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "ATTACH", "DETACH", "PRAGMA",
    "REPLACE", "VACUUM", "REINDEX",
];

pub struct QueryDatabaseTool {
    ledger: Arc<LedgerDb>,
}

impl QueryDatabaseTool {
    pub fn new(ledger: Arc<LedgerDb>) -> Self {
        Self { ledger }
    }
}

/// Words of `sql` outside single-quoted string literals.
fn words_outside_literals(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_literal = false;
    for c in sql.chars() {
        if c == '\'' {
            in_literal = !in_literal;
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if in_literal {
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            current.push(c.to_ascii_uppercase());
        } else {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            if c == ';' {
                words.push(";".into());
            }
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Accept a single SELECT (or WITH ... SELECT) statement.
pub fn validate_select(sql: &str) -> Result<(), String> {
    let words = words_outside_literals(sql);
    match words.first().map(String::as_str) {
        Some("SELECT") | Some("WITH") => {}
        _ => return Err("Only SELECT queries are allowed.".into()),
    }
    if let Some(pos) = words.iter().position(|w| w == ";") {
        if pos + 1 < words.len() {
            return Err("Only a single statement is allowed.".into());
        }
    }
    if let Some(kw) = words.iter().find(|w| FORBIDDEN.contains(&w.as_str())) {
        return Err(format!("Only SELECT queries are allowed ({kw} is not permitted)."));
    }
    Ok(())
}

#[async_trait]
impl Tool for QueryDatabaseTool {
    fn name(&self) -> &str {
        "query_database"
    }

    fn description(&self) -> &str {
        "Execute a read-only SQL SELECT query against the local financial database. \
         Tables: invoices, purchase_invoices, estimates (id, contact_id, contact_name, desc, \
         date[unix epoch], amount[EUR], status[int]); invoice_items(invoice_id, ...), \
         purchase_items(purchase_id, ...), estimate_items(estimate_id, ...) with \
         (product_id, name, sku, units, price, subtotal, discount, tax, retention, account); \
         contacts(id, name, email, type, code, vat, phone, mobile); products(id, name, desc, price, stock, sku). \
         Status codes: 0=draft, 1=issued, 2=partial, 3=paid, 4=overdue, 5=cancelled. \
         Use strftime('%Y-%m', datetime(date, 'unixepoch')) for month grouping. At most 100 rows are returned."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sql": {"type": "string", "description": "A SELECT query. Only SELECT is allowed."},
                "explanation": {"type": "string", "description": "Brief explanation of what this query does."}
            },
            "required": ["sql", "explanation"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let sql = arguments["sql"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'sql' argument".into()))?;

        if let Err(reason) = validate_select(sql) {
            return Ok(ToolResult::failed(reason));
        }

        let mut stream = sqlx::query(sql).fetch(self.ledger.pool());
        let mut rows = Vec::new();
        while rows.len() < MAX_ROWS {
            match stream.try_next().await {
                Ok(Some(row)) => rows.push(row_to_json(&row)?),
                Ok(None) => break,
                Err(e) => return Ok(ToolResult::failed(e.to_string())),
            }
        }

        Ok(ToolResult::ok(serde_json::json!({
            "rows": rows,
            "count": rows.len(),
            "explanation": arguments["explanation"].as_str().unwrap_or_default(),
        })))
    }
}
