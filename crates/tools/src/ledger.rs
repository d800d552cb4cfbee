//! Read access to the local financial dataset.
//!
//! The ledger is a SQLite file with invoices, purchases, estimates, their
//! line items, contacts and products. Amounts are EUR, dates are Unix epoch
//! seconds, document status codes run 0 (draft) to 5 (cancelled).

use ledgerclaw_core::error::ToolError;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS contacts (
        id TEXT PRIMARY KEY, name TEXT NOT NULL, email TEXT, type TEXT,
        code TEXT, vat TEXT, phone TEXT, mobile TEXT)"#,
    r#"CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY, name TEXT NOT NULL, "desc" TEXT, price REAL, stock REAL, sku TEXT)"#,
    r#"CREATE TABLE IF NOT EXISTS invoices (
        id TEXT PRIMARY KEY, contact_id TEXT, contact_name TEXT, "desc" TEXT,
        date INTEGER, amount REAL, status INTEGER)"#,
    r#"CREATE TABLE IF NOT EXISTS invoice_items (
        invoice_id TEXT NOT NULL, product_id TEXT, name TEXT, sku TEXT, units REAL,
        price REAL, subtotal REAL, discount REAL, tax REAL, retention REAL, account TEXT)"#,
    r#"CREATE TABLE IF NOT EXISTS purchase_invoices (
        id TEXT PRIMARY KEY, contact_id TEXT, contact_name TEXT, "desc" TEXT,
        date INTEGER, amount REAL, status INTEGER)"#,
    r#"CREATE TABLE IF NOT EXISTS purchase_items (
        purchase_id TEXT NOT NULL, product_id TEXT, name TEXT, sku TEXT, units REAL,
        price REAL, subtotal REAL, discount REAL, tax REAL, retention REAL, account TEXT)"#,
    r#"CREATE TABLE IF NOT EXISTS estimates (
        id TEXT PRIMARY KEY, contact_id TEXT, contact_name TEXT, "desc" TEXT,
        date INTEGER, amount REAL, status INTEGER)"#,
    r#"CREATE TABLE IF NOT EXISTS estimate_items (
        estimate_id TEXT NOT NULL, product_id TEXT, name TEXT, sku TEXT, units REAL,
        price REAL, subtotal REAL, discount REAL, tax REAL, retention REAL, account TEXT)"#,
];

/// Headline figures for the system prompt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSummary {
    pub invoices: i64,
    pub purchases: i64,
    pub estimates: i64,
    pub contacts: i64,
    pub products: i64,
    pub total_income: f64,
    pub total_expenses: f64,
}

impl LedgerSummary {
    pub fn balance(&self) -> f64 {
        self.total_income - self.total_expenses
    }
}

/// Handle to the ledger database.
pub struct LedgerDb {
    pool: SqlitePool,
}

impl LedgerDb {
    /// Open (or create) the ledger and make sure its tables exist.
    pub async fn open(path: &str) -> Result<Self, ToolError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| ToolError::Database(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| ToolError::Database(format!("Failed to open ledger: {e}")))?;

        let db = Self { pool };
        db.ensure_schema().await?;
        info!("Ledger opened at {path}");
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<(), ToolError> {
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| ToolError::Database(format!("schema: {e}")))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a parameterized query and return rows as JSON objects.
    pub async fn rows(&self, sql: &str, binds: &[Bind<'_>]) -> Result<Vec<serde_json::Value>, ToolError> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = match bind {
                Bind::Text(s) => query.bind(*s),
                Bind::Real(f) => query.bind(*f),
            };
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ToolError::Database(e.to_string()))?;
        rows.iter().map(row_to_json).collect()
    }

    pub async fn summary(&self) -> Result<LedgerSummary, ToolError> {
        let count = |table: &'static str| async move {
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ToolError::Database(e.to_string()))
        };
        let total = |table: &'static str| async move {
            sqlx::query_scalar::<_, f64>(&format!("SELECT CAST(COALESCE(SUM(amount), 0) AS REAL) FROM {table}"))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ToolError::Database(e.to_string()))
        };

        Ok(LedgerSummary {
            invoices: count("invoices").await?,
            purchases: count("purchase_invoices").await?,
            estimates: count("estimates").await?,
            contacts: count("contacts").await?,
            products: count("products").await?,
            total_income: total("invoices").await?,
            total_expenses: total("purchase_invoices").await?,
        })
    }

    /// Load a small sample company, used by `onboard --demo` and tests.
    /// Re-running it restores the sample rows.
    pub async fn seed_demo(&self) -> Result<(), ToolError> {
        let statements = [
            "DELETE FROM invoice_items WHERE invoice_id IN ('INV-1', 'INV-2', 'INV-3')",
            "DELETE FROM purchase_items WHERE purchase_id = 'PUR-1'",
            "INSERT OR REPLACE INTO contacts (id, name, email, type, vat) VALUES
                ('C-1', 'Acme Industries', 'billing@acme.test', 'client', 'B12345678'),
                ('C-2', 'Globex Supplies', 'ap@globex.test', 'supplier', 'B87654321'),
                ('C-3', 'Initech', NULL, 'client', NULL)",
            "INSERT OR REPLACE INTO products (id, name, \"desc\", price, stock, sku) VALUES
                ('P-1', 'Consulting hour', 'Senior consultant', 90.0, NULL, 'CONS-H'),
                ('P-2', 'Server rack', 'Hardware', 1250.0, 4, 'HW-RACK')",
            "INSERT OR REPLACE INTO invoices (id, contact_id, contact_name, \"desc\", date, amount, status) VALUES
                ('INV-1', 'C-1', 'Acme Industries', 'March consulting', 1709251200, 1800.0, 3),
                ('INV-2', 'C-1', 'Acme Industries', 'Rack install', 1711929600, 2500.0, 4),
                ('INV-3', 'C-3', 'Initech', 'Audit', 1714521600, 450.0, 4)",
            "INSERT INTO invoice_items (invoice_id, product_id, name, units, price, subtotal, tax) VALUES
                ('INV-1', 'P-1', 'Consulting hour', 20, 90.0, 1800.0, 21),
                ('INV-2', 'P-2', 'Server rack', 2, 1250.0, 2500.0, 21),
                ('INV-3', 'P-1', 'Consulting hour', 5, 90.0, 450.0, 21)",
            "INSERT OR REPLACE INTO purchase_invoices (id, contact_id, contact_name, \"desc\", date, amount, status) VALUES
                ('PUR-1', 'C-2', 'Globex Supplies', 'Racks', 1711324800, 1600.0, 4)",
            "INSERT INTO purchase_items (purchase_id, product_id, name, units, price, subtotal, tax) VALUES
                ('PUR-1', 'P-2', 'Server rack', 2, 800.0, 1600.0, 21)",
            "INSERT OR REPLACE INTO estimates (id, contact_id, contact_name, \"desc\", date, amount, status) VALUES
                ('EST-1', 'C-3', 'Initech', 'Q3 retainer', 1717200000, 3600.0, 1)",
        ];
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ToolError::Database(e.to_string()))?;
        for sql in statements {
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| ToolError::Database(format!("seed: {e}")))?;
        }
        tx.commit()
            .await
            .map_err(|e| ToolError::Database(e.to_string()))
    }
}

/// A positional query parameter.
#[derive(Debug, Clone, Copy)]
pub enum Bind<'a> {
    Text(&'a str),
    Real(f64),
}

/// Convert a row to a JSON object keyed by column name, typed by the
/// value's runtime storage class.
pub fn row_to_json(row: &SqliteRow) -> Result<serde_json::Value, ToolError> {
    let mut obj = serde_json::Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(i)
            .map_err(|e| ToolError::Database(e.to_string()))?;
        let value = if raw.is_null() {
            serde_json::Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => row
                    .try_get::<i64, _>(i)
                    .map(serde_json::Value::from)
                    .unwrap_or(serde_json::Value::Null),
                "REAL" => row
                    .try_get::<f64, _>(i)
                    .map(serde_json::Value::from)
                    .unwrap_or(serde_json::Value::Null),
                "BLOB" => serde_json::Value::String("<blob>".into()),
                _ => row
                    .try_get::<String, _>(i)
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null),
            }
        };
        obj.insert(column.name().to_string(), value);
    }
    Ok(serde_json::Value::Object(obj))
}

#[cfg(test)]
pub(crate) async fn demo_ledger() -> LedgerDb {
    let db = LedgerDb::open("sqlite::memory:").await.unwrap();
    db.seed_demo().await.unwrap();
    db
}
