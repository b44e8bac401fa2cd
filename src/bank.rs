//! Bank accounts and their transactions.
//!
//! Every balance change happens inside the same SQL transaction that
//! writes the transaction row, as a relative `balance = balance + ?`
//! update, so two writers against one account can never lose an update.

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use crate::context::TenantContext;
use crate::error::{MostradorError, Result};
use crate::models::{BankAccount, BankTransaction, TransactionStatus, TransactionType};

pub struct NewAccount<'a> {
    pub name: &'a str,
    pub bank_name: Option<&'a str>,
    pub account_number: Option<&'a str>,
    pub account_type: &'a str,
    pub currency: &'a str,
    pub opening_balance: f64,
}

pub struct NewTransaction<'a> {
    pub bank_account_id: i64,
    pub transaction_date: &'a str,
    pub description: &'a str,
    pub reference: Option<&'a str>,
    pub amount: f64,
    pub transaction_type: TransactionType,
}

const ACCOUNT_COLUMNS: &str =
    "id, organization_id, name, bank_name, account_number, account_type, currency, balance, is_active";

const TRANSACTION_COLUMNS: &str =
    "id, bank_account_id, transaction_date, description, reference, amount, transaction_type, status";

fn account_from_row(row: &Row) -> rusqlite::Result<BankAccount> {
    Ok(BankAccount {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        bank_name: row.get(3)?,
        account_number: row.get(4)?,
        account_type: row.get(5)?,
        currency: row.get(6)?,
        balance: row.get(7)?,
        is_active: row.get::<_, i64>(8)? != 0,
    })
}

pub(crate) fn transaction_from_row(row: &Row) -> rusqlite::Result<BankTransaction> {
    Ok(BankTransaction {
        id: row.get(0)?,
        bank_account_id: row.get(1)?,
        transaction_date: row.get(2)?,
        description: row.get(3)?,
        reference: row.get(4)?,
        amount: row.get(5)?,
        transaction_type: row.get(6)?,
        status: row.get(7)?,
    })
}

pub fn create_account(conn: &Connection, ctx: &TenantContext, new: &NewAccount) -> Result<BankAccount> {
    let org = ctx.require_organization()?;
    if new.name.trim().is_empty() {
        return Err(MostradorError::Validation("account name is required".into()));
    }
    conn.execute(
        "INSERT INTO bank_accounts (organization_id, name, bank_name, account_number, account_type, currency, balance) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            org,
            new.name.trim(),
            new.bank_name,
            new.account_number,
            new.account_type,
            new.currency,
            new.opening_balance
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(account_id = id, organization_id = org, "Bank account created");
    get_account(conn, ctx, id)?.ok_or(MostradorError::not_found("bank account", id))
}

pub fn get_account(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Option<BankAccount>> {
    let org = ctx.require_organization()?;
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE id = ?1 AND organization_id = ?2");
    Ok(conn.query_row(&sql, [id, org], account_from_row).optional()?)
}

pub fn list_accounts(conn: &Connection, ctx: &TenantContext, include_inactive: bool) -> Result<Vec<BankAccount>> {
    let org = ctx.require_organization()?;
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE organization_id = ?1 {} ORDER BY name",
        if include_inactive { "" } else { "AND is_active = 1" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([org], account_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn deactivate_account(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<()> {
    let org = ctx.require_organization()?;
    let changed = conn.execute(
        "UPDATE bank_accounts SET is_active = 0 WHERE id = ?1 AND organization_id = ?2",
        [id, org],
    )?;
    if changed == 0 {
        return Err(MostradorError::not_found("bank account", id));
    }
    info!(account_id = id, "Bank account deactivated");
    Ok(())
}

/// Insert a transaction and apply its signed amount to the account balance.
pub fn create_transaction(
    conn: &mut Connection,
    ctx: &TenantContext,
    new: &NewTransaction,
) -> Result<BankTransaction> {
    let org = ctx.require_organization()?;
    if !(new.amount > 0.0) {
        return Err(MostradorError::Validation(format!(
            "transaction amount must be positive, got {}",
            new.amount
        )));
    }
    if new.description.trim().is_empty() {
        return Err(MostradorError::Validation("description is required".into()));
    }

    let tx = conn.transaction()?;
    let active: Option<i64> = tx
        .query_row(
            "SELECT is_active FROM bank_accounts WHERE id = ?1 AND organization_id = ?2",
            [new.bank_account_id, org],
            |row| row.get(0),
        )
        .optional()?;
    match active {
        None => return Err(MostradorError::not_found("bank account", new.bank_account_id)),
        Some(0) => {
            return Err(MostradorError::InvalidState(format!(
                "bank account {} is inactive",
                new.bank_account_id
            )))
        }
        Some(_) => {}
    }

    tx.execute(
        "INSERT INTO bank_transactions \
         (organization_id, bank_account_id, transaction_date, description, reference, amount, transaction_type) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            org,
            new.bank_account_id,
            new.transaction_date,
            new.description.trim(),
            new.reference,
            new.amount,
            new.transaction_type
        ],
    )?;
    let id = tx.last_insert_rowid();
    let delta = new.transaction_type.signed(new.amount);
    tx.execute(
        "UPDATE bank_accounts SET balance = balance + ?1 WHERE id = ?2 AND organization_id = ?3",
        rusqlite::params![delta, new.bank_account_id, org],
    )?;
    tx.commit()?;

    info!(
        transaction_id = id,
        account_id = new.bank_account_id,
        amount = new.amount,
        kind = %new.transaction_type,
        "Bank transaction recorded"
    );
    get_transaction(conn, ctx, id)?.ok_or(MostradorError::not_found("bank transaction", id))
}

/// Delete a pending transaction and reverse its effect on the balance.
pub fn delete_transaction(conn: &mut Connection, ctx: &TenantContext, id: i64) -> Result<()> {
    let existing = get_transaction(conn, ctx, id)?.ok_or(MostradorError::not_found("bank transaction", id))?;
    if existing.status == TransactionStatus::Matched {
        return Err(MostradorError::InvalidState(format!(
            "transaction {id} is matched in a reconciliation"
        )));
    }
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM bank_transactions WHERE id = ?1", [id])?;
    tx.execute(
        "UPDATE bank_accounts SET balance = balance - ?1 WHERE id = ?2",
        rusqlite::params![existing.signed_amount(), existing.bank_account_id],
    )?;
    tx.commit()?;
    info!(transaction_id = id, "Bank transaction deleted");
    Ok(())
}

pub fn get_transaction(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Option<BankTransaction>> {
    let org = ctx.require_organization()?;
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions WHERE id = ?1 AND organization_id = ?2"
    );
    Ok(conn.query_row(&sql, [id, org], transaction_from_row).optional()?)
}

pub fn list_transactions(
    conn: &Connection,
    ctx: &TenantContext,
    account_id: i64,
    status: Option<TransactionStatus>,
) -> Result<Vec<BankTransaction>> {
    let org = ctx.require_organization()?;
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions \
         WHERE bank_account_id = ?1 AND organization_id = ?2 AND (?3 IS NULL OR status = ?3) \
         ORDER BY transaction_date DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params![account_id, org, status], transaction_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

#[cfg(test)]
pub(crate) fn seed_account(conn: &Connection, ctx: &TenantContext, balance: f64) -> BankAccount {
    create_account(
        conn,
        ctx,
        &NewAccount {
            name: "Operativa",
            bank_name: Some("BBVA"),
            account_number: Some("0123"),
            account_type: "checking",
            currency: "MXN",
            opening_balance: balance,
        },
    )
    .unwrap()
}
