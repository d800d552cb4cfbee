//! Contact lookup (read-only) and contact creation (mutating).

use crate::business::{write_result, BusinessClient, BusinessWrite};
use crate::ledger::{Bind, LedgerDb};
use async_trait::async_trait;
use ledgerclaw_core::error::ToolError;
use ledgerclaw_core::tool::{Tool, ToolClass, ToolResult};
use std::sync::Arc;

pub struct GetContactDetailsTool {
    ledger: Arc<LedgerDb>,
}

impl GetContactDetailsTool {
    pub fn new(ledger: Arc<LedgerDb>) -> Self {
        Self { ledger }
    }

    async fn totals(&self, table: &str, contact_id: &str) -> Result<serde_json::Value, ToolError> {
        let sql = format!(
            "SELECT COUNT(*) AS cnt, CAST(COALESCE(SUM(amount), 0) AS REAL) AS total FROM {table} WHERE contact_id = ?1"
        );
        let mut rows = self.ledger.rows(&sql, &[Bind::Text(contact_id)]).await?;
        Ok(rows.pop().unwrap_or_default())
    }
}

#[async_trait]
impl Tool for GetContactDetailsTool {
    fn name(&self) -> &str {
        "get_contact_details"
    }

    fn description(&self) -> &str {
        "Look up a contact by name (partial match) or exact ID. Returns contact info and optionally \
         their transaction history summary (invoice, purchase and estimate counts and totals)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "search": {"type": "string", "description": "Contact name (partial match) or exact ID"},
                "include_history": {"type": "boolean", "description": "Include transaction summary", "default": false}
            },
            "required": ["search"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let search = arguments["search"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'search' argument".into()))?;
        let include_history = arguments["include_history"].as_bool().unwrap_or(false);

        let pattern = format!("%{search}%");
        let mut contacts = self
            .ledger
            .rows(
                "SELECT * FROM contacts WHERE id = ?1 OR name LIKE ?2 LIMIT 10",
                &[Bind::Text(search), Bind::Text(&pattern)],
            )
            .await?;

        if include_history {
            for contact in &mut contacts {
                let id = contact["id"].as_str().unwrap_or_default().to_string();
                contact["history"] = serde_json::json!({
                    "invoices": self.totals("invoices", &id).await?,
                    "purchases": self.totals("purchase_invoices", &id).await?,
                    "estimates": self.totals("estimates", &id).await?,
                });
            }
        }

        Ok(ToolResult::ok(serde_json::json!({
            "count": contacts.len(),
            "contacts": contacts,
        })))
    }
}

const CONTACT_FIELDS: &[&str] = &["email", "type", "vat", "phone", "code"];

pub struct CreateContactTool {
    client: Arc<dyn BusinessClient>,
}

impl CreateContactTool {
    pub fn new(client: Arc<dyn BusinessClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CreateContactTool {
    fn name(&self) -> &str {
        "create_contact"
    }

    fn description(&self) -> &str {
        "Create a new contact (client or supplier) in the business system. Requires user confirmation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "email": {"type": "string"},
                "type": {"type": "string", "enum": ["client", "supplier", "creditor", "debtor"]},
                "vat": {"type": "string", "description": "Tax ID / NIF / CIF"},
                "phone": {"type": "string"},
                "code": {"type": "string"}
            },
            "required": ["name"]
        })
    }

    fn class(&self) -> ToolClass {
        ToolClass::Mutating
    }

    fn describe_action(&self, arguments: &serde_json::Value) -> String {
        format!(
            "Create contact: {}",
            arguments["name"].as_str().unwrap_or("Unknown")
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let name = arguments["name"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'name' argument".into()))?;

        let mut fields = serde_json::Map::new();
        fields.insert("name".into(), name.into());
        for key in CONTACT_FIELDS {
            if let Some(v) = arguments.get(*key) {
                fields.insert((*key).to_string(), v.clone());
            }
        }

        let receipt = self
            .client
            .submit(BusinessWrite::CreateContact { fields })
            .await?;
        Ok(ToolResult::ok(write_result(
            self.client.as_ref(),
            receipt,
            "Contact created",
        )))
    }
}
