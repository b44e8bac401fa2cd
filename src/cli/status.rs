use std::path::PathBuf;

use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::{format_bytes, money_in};
use crate::settings::{load_settings, DB_FILE};

fn count(conn: &rusqlite::Connection, sql: &str, org: i64) -> Result<i64> {
    Ok(conn.query_row(sql, [org], |r| r.get(0))?)
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join(DB_FILE);
    let show = |v: Option<String>| v.unwrap_or_else(|| "(not set)".to_string());

    println!("Organization: {}", show(settings.organization_id.map(|id| id.to_string())));
    println!("Branch:       {}", show(settings.branch_id.map(|id| id.to_string())));
    println!("User:         {}", show(settings.user_id.clone()));
    println!("Currency:     {}", settings.currency);
    println!("Data dir:     {}", data_dir.display());
    println!("Database:     {}", db_path.display());

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `mostrador init` to set up.");
        return Ok(());
    }

    let size = std::fs::metadata(&db_path)?.len();
    println!("DB size:      {}", format_bytes(size));

    let Some(org) = settings.organization_id else {
        return Ok(());
    };
    let conn = get_connection(&db_path)?;
    let accounts = count(&conn, "SELECT count(*) FROM bank_accounts WHERE organization_id = ?1 AND is_active = 1", org)?;
    let cash: f64 = conn.query_row(
        "SELECT COALESCE(SUM(balance), 0) FROM bank_accounts WHERE organization_id = ?1 AND is_active = 1",
        [org],
        |r| r.get(0),
    )?;
    let pending = count(
        &conn,
        "SELECT count(*) FROM bank_transactions WHERE organization_id = ?1 AND status = 'pending'",
        org,
    )?;
    let receivable: f64 = conn.query_row(
        "SELECT COALESCE(SUM(balance), 0) FROM accounts_receivable WHERE organization_id = ?1",
        [org],
        |r| r.get(0),
    )?;
    let open_sessions = count(
        &conn,
        "SELECT count(*) FROM table_sessions WHERE organization_id = ?1 AND status IN ('active', 'bill_requested')",
        org,
    )?;
    let connections = count(
        &conn,
        "SELECT count(*) FROM integration_connections WHERE organization_id = ?1 AND status = 'connected'",
        org,
    )?;

    println!();
    println!("Bank accounts:        {accounts} ({})", money_in(cash, &settings.currency));
    println!("Pending transactions: {pending}");
    println!("Receivables:          {}", money_in(receivable, &settings.currency));
    println!("Open table sessions:  {open_sessions}");
    println!("Live integrations:    {connections}");
    Ok(())
}
