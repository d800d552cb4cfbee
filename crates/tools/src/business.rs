//! The seam to the external business system.
//!
//! Mutating tools never talk to the outside world directly: they build a
//! [`BusinessWrite`] and hand it to a [`BusinessClient`]. The shipped
//! [`DryRunClient`] records writes instead of performing them.

use async_trait::async_trait;
use ledgerclaw_core::error::ToolError;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Estimate,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Estimate => "estimate",
        }
    }
}

/// One priced line on a new document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub units: f64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<f64>,
}

/// A state change requested from the business system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum BusinessWrite {
    CreateDocument {
        kind: DocumentKind,
        contact_id: String,
        desc: String,
        date: Option<String>,
        items: Vec<LineItem>,
    },
    SendDocument {
        doc_type: String,
        doc_id: String,
        emails: Vec<String>,
        subject: Option<String>,
        body: Option<String>,
    },
    CreateContact {
        fields: serde_json::Map<String, serde_json::Value>,
    },
    UpdateStatus {
        doc_type: String,
        doc_id: String,
        status: u8,
    },
}

/// What the business system answered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteReceipt {
    /// ID of the created record, if the write created one
    pub id: Option<String>,
}

#[async_trait]
pub trait BusinessClient: Send + Sync {
    /// True when writes are simulated rather than performed.
    fn is_simulated(&self) -> bool;

    async fn submit(&self, write: BusinessWrite) -> Result<WriteReceipt, ToolError>;
}

/// Accepts every write, performs none, and remembers what it was asked.
#[derive(Default)]
pub struct DryRunClient {
    log: Mutex<Vec<BusinessWrite>>,
}

impl DryRunClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write submitted so far, oldest first.
    pub fn writes(&self) -> Vec<BusinessWrite> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl BusinessClient for DryRunClient {
    fn is_simulated(&self) -> bool {
        true
    }

    async fn submit(&self, write: BusinessWrite) -> Result<WriteReceipt, ToolError> {
        let creates = matches!(
            write,
            BusinessWrite::CreateDocument { .. } | BusinessWrite::CreateContact { .. }
        );
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.push(write);
        let n = log.len();
        drop(log);

        info!(write = n, "Simulated business write");
        Ok(WriteReceipt {
            id: creates.then(|| format!("dry-run-{n}")),
        })
    }
}

/// Standard result payload of a mutating tool.
pub(crate) fn write_result(
    client: &dyn BusinessClient,
    receipt: WriteReceipt,
    done: &str,
) -> serde_json::Value {
    let simulated = client.is_simulated();
    let mut data = serde_json::json!({
        "success": true,
        "safe_mode": simulated,
        "message": if simulated {
            format!("{done} (dry run)")
        } else {
            format!("{done} successfully")
        },
    });
    if let Some(id) = receipt.id {
        data["id"] = serde_json::Value::String(id);
    }
    data
}

/// `1234.5` -> `1,234.50`
pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}
