//! System prompt construction.

use async_trait::async_trait;
use ledgerclaw_tools::business::format_amount;
use ledgerclaw_tools::ledger::{LedgerDb, LedgerSummary};
use std::sync::Arc;
use tracing::warn;

/// Supplies the system prompt for each new turn.
#[async_trait]
pub trait SystemPrompt: Send + Sync {
    async fn render(&self) -> String;
}

/// The same text every turn.
pub struct FixedPrompt(pub String);

#[async_trait]
impl SystemPrompt for FixedPrompt {
    async fn render(&self) -> String {
        self.0.clone()
    }
}

/// Financial assistant prompt built from live ledger figures.
pub struct LedgerPrompt {
    ledger: Arc<LedgerDb>,
    simulated: bool,
}

impl LedgerPrompt {
    pub fn new(ledger: Arc<LedgerDb>, simulated: bool) -> Self {
        Self { ledger, simulated }
    }
}

#[async_trait]
impl SystemPrompt for LedgerPrompt {
    async fn render(&self) -> String {
        let summary = match self.ledger.summary().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Ledger summary unavailable, prompting without figures");
                LedgerSummary::default()
            }
        };
        financial_assistant_prompt(&summary, self.simulated)
    }
}

pub fn financial_assistant_prompt(summary: &LedgerSummary, simulated: bool) -> String {
    let safe_mode = if simulated {
        "ON (dry run - writes are simulated)"
    } else {
        "OFF (writes execute against the business system)"
    };

    format!(
        "You are the financial assistant for this company's accounting system.
You help analyze financial data, check prices, create estimates/invoices and send documents.

DATABASE (SQLite, read via query_database tool):
- invoices (id, contact_id, contact_name, desc, date[epoch], amount[EUR], status 0-5)
- invoice_items (invoice_id, product_id, name, sku, units, price, subtotal, discount, tax, retention, account)
- purchase_invoices (same as invoices), purchase_items (purchase_id, ...)
- estimates (same as invoices), estimate_items (estimate_id, ...)
- contacts (id, name, email, type, code, vat, phone, mobile)
- products (id, name, desc, price, stock, sku)

Status codes - invoices/purchases: 0=draft, 1=issued, 2=partial, 3=paid, 4=overdue, 5=cancelled. Estimates: 0=draft, 1=pending, 2=accepted, 3=rejected, 4=invoiced.
Dates are Unix epoch. Convert with: datetime(date, 'unixepoch'). Group by month: strftime('%Y-%m', datetime(date, 'unixepoch')).

CURRENT DATA: {invoices} invoices, {purchases} purchases, {estimates} estimates, {contacts} contacts, {products} products.
Total income: {income} EUR | Total expenses: {expenses} EUR | Balance: {balance} EUR

SAFE MODE: {safe_mode}

RULES:
- Always query the database to verify data before creating documents.
- For write operations, clearly describe what will be created before executing.
- Match the user's language.
- Be concise but thorough in financial analysis.
- When showing amounts, use EUR format with 2 decimals.
- Use get_overdue_invoices to find overdue/unpaid invoices.",
        invoices = summary.invoices,
        purchases = summary.purchases,
        estimates = summary.estimates,
        contacts = summary.contacts,
        products = summary.products,
        income = format_amount(summary.total_income),
        expenses = format_amount(summary.total_expenses),
        balance = format_amount(summary.balance()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_figures_and_mode() {
        let summary = LedgerSummary {
            invoices: 3,
            purchases: 1,
            estimates: 1,
            contacts: 3,
            products: 2,
            total_income: 4750.0,
            total_expenses: 1600.0,
        };
        let prompt = financial_assistant_prompt(&summary, true);
        assert!(prompt.contains("CURRENT DATA: 3 invoices, 1 purchases, 1 estimates, 3 contacts, 2 products."));
        assert!(prompt.contains("Total income: 4,750.00 EUR | Total expenses: 1,600.00 EUR | Balance: 3,150.00 EUR"));
        assert!(prompt.contains("SAFE MODE: ON (dry run"));

        let live = financial_assistant_prompt(&summary, false);
        assert!(live.contains("SAFE MODE: OFF"));
    }

    #[tokio::test]
    async fn ledger_prompt_reads_summary() {
        let ledger = LedgerDb::open("sqlite::memory:").await.unwrap();
        ledger.seed_demo().await.unwrap();
        let prompt = LedgerPrompt::new(Arc::new(ledger), true).render().await;
        assert!(prompt.contains("3 invoices"));
    }

    #[tokio::test]
    async fn fixed_prompt() {
        assert_eq!(FixedPrompt("Be brief".into()).render().await, "Be brief");
    }
}
