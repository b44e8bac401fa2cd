use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use crate::bank::transaction_from_row;
use crate::context::TenantContext;
use crate::error::{MostradorError, Result};
use crate::models::{
    BankTransaction, MatchType, Reconciliation, ReconciliationItem, ReconciliationStatus,
};

pub struct NewReconciliation<'a> {
    pub bank_account_id: i64,
    pub period_start: &'a str,
    pub period_end: &'a str,
    pub opening_balance: f64,
    pub statement_balance: f64,
    pub notes: Option<&'a str>,
}

const SELECT_RECONCILIATION: &str = "
    SELECT r.id, r.bank_account_id, r.period_start, r.period_end, r.opening_balance,
           r.statement_balance, r.status, r.closed_at, r.notes,
           COALESCE((SELECT SUM(i.amount) FROM bank_reconciliation_items i WHERE i.reconciliation_id = r.id), 0)
    FROM bank_reconciliations r";

fn reconciliation_from_row(row: &Row) -> rusqlite::Result<Reconciliation> {
    Ok(Reconciliation {
        id: row.get(0)?,
        bank_account_id: row.get(1)?,
        period_start: row.get(2)?,
        period_end: row.get(3)?,
        opening_balance: row.get(4)?,
        statement_balance: row.get(5)?,
        status: row.get(6)?,
        closed_at: row.get(7)?,
        notes: row.get(8)?,
        matched_amount: row.get(9)?,
    })
}

fn parse_day(raw: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| MostradorError::Validation(format!("invalid date (expected YYYY-MM-DD): {raw}")))
}

pub fn create(conn: &Connection, ctx: &TenantContext, new: &NewReconciliation) -> Result<Reconciliation> {
    let org = ctx.require_organization()?;
    let start = parse_day(new.period_start)?;
    let end = parse_day(new.period_end)?;
    if end < start {
        return Err(MostradorError::Validation(format!(
            "period end {end} is before period start {start}"
        )));
    }
    crate::bank::get_account(conn, ctx, new.bank_account_id)?
        .ok_or(MostradorError::not_found("bank account", new.bank_account_id))?;

    conn.execute(
        "INSERT INTO bank_reconciliations \
         (organization_id, bank_account_id, period_start, period_end, opening_balance, statement_balance, notes, created_by) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            org,
            new.bank_account_id,
            new.period_start,
            new.period_end,
            new.opening_balance,
            new.statement_balance,
            new.notes,
            ctx.user()
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(reconciliation_id = id, account_id = new.bank_account_id, "Reconciliation created");
    require(conn, ctx, id)
}

pub fn get(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Option<Reconciliation>> {
    let org = ctx.require_organization()?;
    let sql = format!("{SELECT_RECONCILIATION} WHERE r.id = ?1 AND r.organization_id = ?2");
    Ok(conn.query_row(&sql, [id, org], reconciliation_from_row).optional()?)
}

fn require(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Reconciliation> {
    get(conn, ctx, id)?.ok_or(MostradorError::not_found("reconciliation", id))
}

fn require_editable(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Reconciliation> {
    let rec = require(conn, ctx, id)?;
    if rec.status == ReconciliationStatus::Closed {
        return Err(MostradorError::InvalidState(format!("reconciliation {id} is closed")));
    }
    Ok(rec)
}

pub fn list(conn: &Connection, ctx: &TenantContext, account_id: Option<i64>) -> Result<Vec<Reconciliation>> {
    let org = ctx.require_organization()?;
    let sql = format!(
        "{SELECT_RECONCILIATION} WHERE r.organization_id = ?1 AND (?2 IS NULL OR r.bank_account_id = ?2) \
         ORDER BY r.period_end DESC, r.id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params![org, account_id], reconciliation_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Move a draft reconciliation to `in_progress`.
pub fn start(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Reconciliation> {
    let rec = require_editable(conn, ctx, id)?;
    if rec.status == ReconciliationStatus::Draft {
        conn.execute(
            "UPDATE bank_reconciliations SET status = ?1 WHERE id = ?2",
            rusqlite::params![ReconciliationStatus::InProgress, id],
        )?;
        info!(reconciliation_id = id, "Reconciliation started");
    }
    require(conn, ctx, id)
}

pub fn match_transaction(
    conn: &mut Connection,
    ctx: &TenantContext,
    reconciliation_id: i64,
    transaction_id: i64,
    match_type: MatchType,
) -> Result<ReconciliationItem> {
    let rec = require_editable(conn, ctx, reconciliation_id)?;
    let txn = crate::bank::get_transaction(conn, ctx, transaction_id)?
        .ok_or(MostradorError::not_found("bank transaction", transaction_id))?;

    if txn.bank_account_id != rec.bank_account_id {
        return Err(MostradorError::Validation(format!(
            "transaction {transaction_id} belongs to a different account"
        )));
    }
    if txn.transaction_date.as_str() < rec.period_start.as_str()
        || txn.transaction_date.as_str() > rec.period_end.as_str()
    {
        return Err(MostradorError::Validation(format!(
            "transaction {transaction_id} ({}) is outside {}..{}",
            txn.transaction_date, rec.period_start, rec.period_end
        )));
    }
    if txn.status == crate::models::TransactionStatus::Matched {
        return Err(MostradorError::InvalidState(format!(
            "transaction {transaction_id} is already matched"
        )));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO bank_reconciliation_items (reconciliation_id, bank_transaction_id, match_type, amount) \
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![reconciliation_id, transaction_id, match_type, txn.signed_amount()],
    )?;
    let item_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE bank_transactions SET status = 'matched' WHERE id = ?1",
        [transaction_id],
    )?;
    if rec.status == ReconciliationStatus::Draft {
        tx.execute(
            "UPDATE bank_reconciliations SET status = 'in_progress' WHERE id = ?1",
            [reconciliation_id],
        )?;
    }
    tx.commit()?;

    info!(reconciliation_id, transaction_id, match_type = %match_type, "Transaction matched");
    get_item(conn, item_id)
}

pub fn unmatch_item(conn: &mut Connection, ctx: &TenantContext, item_id: i64) -> Result<()> {
    let item = get_item(conn, item_id)?;
    require_editable(conn, ctx, item.reconciliation_id)?;

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM bank_reconciliation_items WHERE id = ?1", [item_id])?;
    tx.execute(
        "UPDATE bank_transactions SET status = 'pending' WHERE id = ?1",
        [item.bank_transaction_id],
    )?;
    tx.commit()?;
    info!(item_id, reconciliation_id = item.reconciliation_id, "Reconciliation item removed");
    Ok(())
}

fn get_item(conn: &Connection, item_id: i64) -> Result<ReconciliationItem> {
    conn.query_row(
        "SELECT id, reconciliation_id, bank_transaction_id, match_type, amount, matched_at \
         FROM bank_reconciliation_items WHERE id = ?1",
        [item_id],
        |row| {
            Ok(ReconciliationItem {
                id: row.get(0)?,
                reconciliation_id: row.get(1)?,
                bank_transaction_id: row.get(2)?,
                match_type: row.get(3)?,
                amount: row.get(4)?,
                matched_at: row.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or(MostradorError::not_found("reconciliation item", item_id))
}

pub fn list_items(conn: &Connection, ctx: &TenantContext, reconciliation_id: i64) -> Result<Vec<ReconciliationItem>> {
    require(conn, ctx, reconciliation_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, reconciliation_id, bank_transaction_id, match_type, amount, matched_at \
         FROM bank_reconciliation_items WHERE reconciliation_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([reconciliation_id], |row| {
        Ok(ReconciliationItem {
            id: row.get(0)?,
            reconciliation_id: row.get(1)?,
            bank_transaction_id: row.get(2)?,
            match_type: row.get(3)?,
            amount: row.get(4)?,
            matched_at: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Pending transactions of the account that fall inside the period.
pub fn unmatched_transactions(
    conn: &Connection,
    ctx: &TenantContext,
    reconciliation_id: i64,
) -> Result<Vec<BankTransaction>> {
    let rec = require(conn, ctx, reconciliation_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, bank_account_id, transaction_date, description, reference, amount, transaction_type, status \
         FROM bank_transactions \
         WHERE bank_account_id = ?1 AND status = 'pending' AND transaction_date BETWEEN ?2 AND ?3 \
         ORDER BY transaction_date, id",
    )?;
    let rows = stmt.query_map(
        rusqlite::params![rec.bank_account_id, rec.period_start, rec.period_end],
        transaction_from_row,
    )?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Close the reconciliation. Closing is one-way.
pub fn close(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Reconciliation> {
    let rec = require_editable(conn, ctx, id)?;
    conn.execute(
        "UPDATE bank_reconciliations SET status = ?1, closed_at = datetime('now') WHERE id = ?2",
        rusqlite::params![ReconciliationStatus::Closed, id],
    )?;
    info!(reconciliation_id = id, difference = rec.difference(), "Reconciliation closed");
    require(conn, ctx, id)
}
