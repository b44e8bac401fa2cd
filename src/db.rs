use std::path::Path;
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bank_accounts (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    bank_name TEXT,
    account_number TEXT,
    account_type TEXT NOT NULL DEFAULT 'checking',
    currency TEXT NOT NULL DEFAULT 'MXN',
    balance REAL NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS bank_transactions (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    bank_account_id INTEGER NOT NULL,
    transaction_date TEXT NOT NULL,
    description TEXT NOT NULL,
    reference TEXT,
    amount REAL NOT NULL CHECK (amount > 0),
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('debit', 'credit')),
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (bank_account_id) REFERENCES bank_accounts(id)
);

CREATE TABLE IF NOT EXISTS bank_reconciliations (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    bank_account_id INTEGER NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    opening_balance REAL NOT NULL,
    statement_balance REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    closed_at TEXT,
    notes TEXT,
    created_by TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (bank_account_id) REFERENCES bank_accounts(id)
);

CREATE TABLE IF NOT EXISTS bank_reconciliation_items (
    id INTEGER PRIMARY KEY,
    reconciliation_id INTEGER NOT NULL,
    bank_transaction_id INTEGER NOT NULL,
    match_type TEXT NOT NULL,
    amount REAL NOT NULL,
    matched_at TEXT DEFAULT (datetime('now')),
    UNIQUE (reconciliation_id, bank_transaction_id),
    FOREIGN KEY (reconciliation_id) REFERENCES bank_reconciliations(id),
    FOREIGN KEY (bank_transaction_id) REFERENCES bank_transactions(id)
);

CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT
);

CREATE TABLE IF NOT EXISTS accounts_receivable (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    customer_id INTEGER NOT NULL,
    invoice_number TEXT,
    amount REAL NOT NULL,
    balance REAL NOT NULL,
    issue_date TEXT NOT NULL,
    due_date TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'current',
    notes TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (customer_id) REFERENCES customers(id)
);

CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    receivable_id INTEGER NOT NULL,
    amount REAL NOT NULL CHECK (amount > 0),
    payment_date TEXT NOT NULL,
    payment_method TEXT NOT NULL,
    reference TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (receivable_id) REFERENCES accounts_receivable(id)
);

CREATE TABLE IF NOT EXISTS restaurant_tables (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    branch_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    capacity INTEGER NOT NULL DEFAULT 4,
    zone TEXT,
    state TEXT NOT NULL DEFAULT 'free',
    position_x REAL,
    position_y REAL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS sales (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    branch_id INTEGER NOT NULL,
    table_session_id INTEGER,
    subtotal REAL NOT NULL DEFAULT 0,
    discount_total REAL NOT NULL DEFAULT 0,
    total REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sale_items (
    id INTEGER PRIMARY KEY,
    sale_id INTEGER NOT NULL,
    product_name TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    unit_price REAL NOT NULL,
    discount REAL NOT NULL DEFAULT 0,
    total REAL NOT NULL,
    FOREIGN KEY (sale_id) REFERENCES sales(id)
);

CREATE TABLE IF NOT EXISTS sale_payments (
    id INTEGER PRIMARY KEY,
    sale_id INTEGER NOT NULL,
    split_name TEXT,
    payment_method TEXT NOT NULL,
    amount REAL NOT NULL CHECK (amount > 0),
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (sale_id) REFERENCES sales(id)
);

CREATE TABLE IF NOT EXISTS table_sessions (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    restaurant_table_id INTEGER NOT NULL,
    sale_id INTEGER,
    customers_count INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL DEFAULT 'active',
    opened_at TEXT NOT NULL DEFAULT (datetime('now')),
    closed_at TEXT,
    opened_by TEXT,
    notes TEXT,
    FOREIGN KEY (restaurant_table_id) REFERENCES restaurant_tables(id),
    FOREIGN KEY (sale_id) REFERENCES sales(id)
);

CREATE TABLE IF NOT EXISTS kitchen_tickets (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    sale_id INTEGER NOT NULL,
    station TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (sale_id) REFERENCES sales(id)
);

CREATE TABLE IF NOT EXISTS kitchen_ticket_items (
    id INTEGER PRIMARY KEY,
    kitchen_ticket_id INTEGER NOT NULL,
    sale_item_id INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    notes TEXT,
    FOREIGN KEY (kitchen_ticket_id) REFERENCES kitchen_tickets(id),
    FOREIGN KEY (sale_item_id) REFERENCES sale_items(id)
);

CREATE TABLE IF NOT EXISTS payment_methods (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organization_payment_methods (
    organization_id INTEGER NOT NULL,
    payment_method_id INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (organization_id, payment_method_id),
    FOREIGN KEY (payment_method_id) REFERENCES payment_methods(id)
);

CREATE TABLE IF NOT EXISTS integration_providers (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    category TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS integration_connectors (
    id INTEGER PRIMARY KEY,
    provider_id INTEGER NOT NULL,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    FOREIGN KEY (provider_id) REFERENCES integration_providers(id)
);

CREATE TABLE IF NOT EXISTS integration_connections (
    id INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL,
    connector_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    environment TEXT NOT NULL DEFAULT 'sandbox',
    status TEXT NOT NULL DEFAULT 'draft',
    last_sync_at TEXT,
    last_error TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (connector_id) REFERENCES integration_connectors(id)
);
";

/// One open (active or bill_requested) session per table.
pub const OPEN_SESSION_INDEX: &str = "idx_table_sessions_one_open";

const DEFAULT_PAYMENT_METHODS: &[(&str, &str)] = &[
    ("cash", "Efectivo"),
    ("card", "Tarjeta"),
    ("transfer", "Transferencia"),
    ("voucher", "Vale"),
];

// (provider code, provider name, category, connectors: (code, name, description))
const DEFAULT_PROVIDERS: &[(&str, &str, &str, &[(&str, &str, &str)])] = &[
    ("mercadopago", "Mercado Pago", "payments", &[
        ("mercadopago_checkout", "Checkout", "Cobros en línea"),
        ("mercadopago_point", "Point", "Terminales físicas"),
    ]),
    ("sat", "SAT", "invoicing", &[
        ("sat_cfdi", "CFDI 4.0", "Timbrado de facturas"),
    ]),
    ("rappi", "Rappi", "delivery", &[
        ("rappi_orders", "Pedidos", "Recepción de pedidos a domicilio"),
    ]),
    ("bbva", "BBVA", "banking", &[
        ("bbva_statements", "Estados de cuenta", "Descarga de movimientos bancarios"),
    ]),
];

const BACKUP_PAGES_PER_STEP: std::os::raw::c_int = 100;

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let closed = close_all_duplicate_sessions(conn)?;
    if closed > 0 {
        warn!(closed, "Closed duplicate open table sessions before indexing");
    }
    conn.execute_batch(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {OPEN_SESSION_INDEX} \
         ON table_sessions(restaurant_table_id) WHERE status IN ('active', 'bill_requested');"
    ))?;

    let count: i64 = conn.query_row("SELECT count(*) FROM payment_methods", [], |row| row.get(0))?;
    if count == 0 {
        for (code, name) in DEFAULT_PAYMENT_METHODS {
            conn.execute(
                "INSERT INTO payment_methods (code, name) VALUES (?1, ?2)",
                rusqlite::params![code, name],
            )?;
        }
    }

    let count: i64 = conn.query_row("SELECT count(*) FROM integration_providers", [], |row| row.get(0))?;
    if count == 0 {
        for (code, name, category, connectors) in DEFAULT_PROVIDERS {
            conn.execute(
                "INSERT INTO integration_providers (code, name, category) VALUES (?1, ?2, ?3)",
                rusqlite::params![code, name, category],
            )?;
            let provider_id = conn.last_insert_rowid();
            for (c_code, c_name, c_desc) in connectors.iter() {
                conn.execute(
                    "INSERT INTO integration_connectors (provider_id, code, name, description) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![provider_id, c_code, c_name, c_desc],
                )?;
            }
        }
    }
    debug!("Schema ready");
    Ok(())
}

/// Enable every catalog payment method for an organization that has none yet.
pub fn enable_default_payment_methods(conn: &Connection, organization_id: i64) -> Result<()> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM organization_payment_methods WHERE organization_id = ?1 LIMIT 1",
            [organization_id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_none() {
        conn.execute(
            "INSERT INTO organization_payment_methods (organization_id, payment_method_id) \
             SELECT ?1, id FROM payment_methods",
            [organization_id],
        )?;
    }
    Ok(())
}

/// Force-close every open session that is not the latest one on its table.
pub fn close_all_duplicate_sessions(conn: &Connection) -> Result<usize> {
    let closed = conn.execute(
        "UPDATE table_sessions SET status = 'completed', closed_at = datetime('now') \
         WHERE status IN ('active', 'bill_requested') AND id NOT IN ( \
             SELECT id FROM ( \
                 SELECT id, ROW_NUMBER() OVER ( \
                     PARTITION BY restaurant_table_id ORDER BY opened_at DESC, id DESC \
                 ) AS rn \
                 FROM table_sessions WHERE status IN ('active', 'bill_requested') \
             ) WHERE rn = 1 \
         )",
        [],
    )?;
    Ok(closed)
}

/// Copy the live store into `dest` with SQLite's online backup and return
/// the size of the written file.
pub fn backup_to(conn: &Connection, dest: &Path) -> Result<u64> {
    let mut dest_conn = Connection::open(dest)?;
    {
        let backup = Backup::new(conn, &mut dest_conn)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::from_millis(10), None)?;
    }
    dest_conn.close().map_err(|(_, e)| e)?;
    let size = std::fs::metadata(dest)?.len();
    debug!(path = %dest.display(), size, "Store copied");
    Ok(size)
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}
