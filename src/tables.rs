//! Restaurant tables and their sessions.
//!
//! A table holds at most one open session (`active` or `bill_requested`).
//! Fresh stores enforce this with a partial unique index; stores opened
//! without it are repaired table by table in [`close_duplicate_sessions`].

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::context::TenantContext;
use crate::error::{MostradorError, Result};
use crate::models::{RestaurantTable, SaleItem, SessionStatus, TableSession, TableState};
use crate::orders;

pub struct NewTable<'a> {
    pub name: &'a str,
    pub capacity: i64,
    pub zone: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct TableUpdate {
    pub name: Option<String>,
    pub capacity: Option<i64>,
    pub zone: Option<String>,
}

#[derive(Debug)]
pub struct TableDetail {
    pub table: RestaurantTable,
    pub session: Option<TableSession>,
    pub items: Vec<SaleItem>,
    pub duplicates_closed: usize,
}

#[derive(Debug, PartialEq)]
pub struct CombineOutcome {
    pub surviving_session: i64,
    pub merged_sessions: Vec<i64>,
    pub freed_tables: Vec<i64>,
}

const TABLE_COLUMNS: &str =
    "id, branch_id, name, capacity, zone, state, position_x, position_y, is_active";

const SESSION_COLUMNS: &str =
    "id, restaurant_table_id, sale_id, customers_count, status, opened_at, closed_at, opened_by";

fn table_from_row(row: &Row) -> rusqlite::Result<RestaurantTable> {
    Ok(RestaurantTable {
        id: row.get(0)?,
        branch_id: row.get(1)?,
        name: row.get(2)?,
        capacity: row.get(3)?,
        zone: row.get(4)?,
        state: row.get(5)?,
        position_x: row.get(6)?,
        position_y: row.get(7)?,
        is_active: row.get::<_, i64>(8)? != 0,
    })
}

fn session_from_row(row: &Row) -> rusqlite::Result<TableSession> {
    Ok(TableSession {
        id: row.get(0)?,
        restaurant_table_id: row.get(1)?,
        sale_id: row.get(2)?,
        customers_count: row.get(3)?,
        status: row.get(4)?,
        opened_at: row.get(5)?,
        closed_at: row.get(6)?,
        opened_by: row.get(7)?,
    })
}

pub fn create_table(conn: &Connection, ctx: &TenantContext, new: &NewTable) -> Result<RestaurantTable> {
    let branch = ctx.require_branch()?;
    if new.name.trim().is_empty() {
        return Err(MostradorError::Validation("table name is required".into()));
    }
    if new.capacity < 1 {
        return Err(MostradorError::Validation("capacity must be at least 1".into()));
    }
    conn.execute(
        "INSERT INTO restaurant_tables (organization_id, branch_id, name, capacity, zone) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![ctx.organization_id, branch, new.name.trim(), new.capacity, new.zone],
    )?;
    let id = conn.last_insert_rowid();
    info!(table_id = id, branch_id = branch, "Table created");
    require_table(conn, ctx, id)
}

pub fn get_table(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Option<RestaurantTable>> {
    let branch = ctx.require_branch()?;
    let sql = format!(
        "SELECT {TABLE_COLUMNS} FROM restaurant_tables WHERE id = ?1 AND organization_id = ?2 AND branch_id = ?3"
    );
    Ok(conn
        .query_row(&sql, [id, ctx.organization_id, branch], table_from_row)
        .optional()?)
}

fn require_table(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<RestaurantTable> {
    get_table(conn, ctx, id)?.ok_or(MostradorError::not_found("table", id))
}

pub fn list_tables(conn: &Connection, ctx: &TenantContext, zone: Option<&str>) -> Result<Vec<RestaurantTable>> {
    let branch = ctx.require_branch()?;
    let sql = format!(
        "SELECT {TABLE_COLUMNS} FROM restaurant_tables \
         WHERE organization_id = ?1 AND branch_id = ?2 AND is_active = 1 AND (?3 IS NULL OR zone = ?3) \
         ORDER BY zone, name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params![ctx.organization_id, branch, zone], table_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn list_zones(conn: &Connection, ctx: &TenantContext) -> Result<Vec<String>> {
    let branch = ctx.require_branch()?;
    let mut stmt = conn.prepare(
        "SELECT DISTINCT zone FROM restaurant_tables \
         WHERE organization_id = ?1 AND branch_id = ?2 AND is_active = 1 AND zone IS NOT NULL ORDER BY zone",
    )?;
    let rows = stmt.query_map([ctx.organization_id, branch], |row| row.get(0))?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn update_table(conn: &Connection, ctx: &TenantContext, id: i64, update: &TableUpdate) -> Result<RestaurantTable> {
    let current = require_table(conn, ctx, id)?;
    let name = update.name.clone().unwrap_or(current.name);
    let capacity = update.capacity.unwrap_or(current.capacity);
    let zone = update.zone.clone().or(current.zone);
    if capacity < 1 {
        return Err(MostradorError::Validation("capacity must be at least 1".into()));
    }
    conn.execute(
        "UPDATE restaurant_tables SET name = ?1, capacity = ?2, zone = ?3 WHERE id = ?4",
        rusqlite::params![name, capacity, zone, id],
    )?;
    require_table(conn, ctx, id)
}

pub fn set_position(conn: &Connection, ctx: &TenantContext, id: i64, x: f64, y: f64) -> Result<()> {
    require_table(conn, ctx, id)?;
    conn.execute(
        "UPDATE restaurant_tables SET position_x = ?1, position_y = ?2 WHERE id = ?3",
        rusqlite::params![x, y, id],
    )?;
    Ok(())
}

pub fn deactivate_table(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<()> {
    let table = require_table(conn, ctx, id)?;
    if table.state == TableState::Occupied {
        return Err(MostradorError::InvalidState(format!("table {} is occupied", table.name)));
    }
    conn.execute("UPDATE restaurant_tables SET is_active = 0 WHERE id = ?1", [id])?;
    info!(table_id = id, "Table deactivated");
    Ok(())
}

fn set_state(conn: &Connection, table_id: i64, state: TableState) -> Result<()> {
    conn.execute(
        "UPDATE restaurant_tables SET state = ?1 WHERE id = ?2",
        rusqlite::params![state, table_id],
    )?;
    Ok(())
}

pub fn reserve_table(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<()> {
    let table = require_table(conn, ctx, id)?;
    if table.state != TableState::Free {
        return Err(MostradorError::InvalidState(format!("table {} is {}", table.name, table.state)));
    }
    set_state(conn, id, TableState::Reserved)?;
    info!(table_id = id, "Table reserved");
    Ok(())
}

pub fn release_table(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<()> {
    let table = require_table(conn, ctx, id)?;
    if table.state != TableState::Reserved {
        return Err(MostradorError::InvalidState(format!("table {} is {}", table.name, table.state)));
    }
    set_state(conn, id, TableState::Free)?;
    Ok(())
}

fn open_sessions(conn: &Connection, ctx: &TenantContext, table_id: i64) -> Result<Vec<TableSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM table_sessions \
         WHERE restaurant_table_id = ?1 AND organization_id = ?2 AND status IN ('active', 'bill_requested') \
         ORDER BY opened_at DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([table_id, ctx.organization_id], session_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Force-close all but the most recently opened session of a table.
/// Returns how many sessions were closed.
pub fn close_duplicate_sessions(conn: &Connection, ctx: &TenantContext, table_id: i64) -> Result<usize> {
    let sessions = open_sessions(conn, ctx, table_id)?;
    let Some((_latest, stale)) = sessions.split_first() else {
        return Ok(0);
    };
    for session in stale {
        conn.execute(
            "UPDATE table_sessions SET status = 'completed', closed_at = datetime('now') WHERE id = ?1",
            [session.id],
        )?;
    }
    if !stale.is_empty() {
        warn!(table_id, closed = stale.len(), "Closed duplicate open sessions");
    }
    Ok(stale.len())
}

pub fn get_session(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Option<TableSession>> {
    ctx.require_organization()?;
    let sql = format!("SELECT {SESSION_COLUMNS} FROM table_sessions WHERE id = ?1 AND organization_id = ?2");
    Ok(conn
        .query_row(&sql, [id, ctx.organization_id], session_from_row)
        .optional()?)
}

fn require_open_session(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<TableSession> {
    let session = get_session(conn, ctx, id)?.ok_or(MostradorError::not_found("table session", id))?;
    if !session.status.is_open() {
        return Err(MostradorError::InvalidState(format!("session {id} is {}", session.status)));
    }
    Ok(session)
}

/// The open session of a table, after repairing duplicates.
pub fn current_session(conn: &Connection, ctx: &TenantContext, table_id: i64) -> Result<Option<TableSession>> {
    close_duplicate_sessions(conn, ctx, table_id)?;
    Ok(open_sessions(conn, ctx, table_id)?.into_iter().next())
}

pub fn get_table_detail(conn: &Connection, ctx: &TenantContext, table_id: i64) -> Result<TableDetail> {
    let table = require_table(conn, ctx, table_id)?;
    let duplicates_closed = close_duplicate_sessions(conn, ctx, table_id)?;
    let session = open_sessions(conn, ctx, table_id)?.into_iter().next();
    let items = match session.as_ref().and_then(|s| s.sale_id) {
        Some(sale_id) => orders::list_items(conn, ctx, sale_id)?,
        None => Vec::new(),
    };
    Ok(TableDetail {
        table,
        session,
        items,
        duplicates_closed,
    })
}

pub fn open_session(
    conn: &mut Connection,
    ctx: &TenantContext,
    table_id: i64,
    customers: i64,
) -> Result<TableSession> {
    let branch = ctx.require_branch()?;
    let table = require_table(conn, ctx, table_id)?;
    if !table.is_active {
        return Err(MostradorError::InvalidState(format!("table {} is inactive", table.name)));
    }
    if table.state == TableState::Occupied {
        return Err(MostradorError::InvalidState(format!("table {} is already occupied", table.name)));
    }
    if customers < 1 {
        return Err(MostradorError::Validation("at least one customer is required".into()));
    }

    let tx = conn.transaction()?;
    let sale_id = orders::insert_sale(&tx, ctx.organization_id, branch)?;
    tx.execute(
        "INSERT INTO table_sessions (organization_id, restaurant_table_id, sale_id, customers_count, opened_by) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![ctx.organization_id, table_id, sale_id, customers, ctx.user()],
    )?;
    let session_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE sales SET table_session_id = ?1 WHERE id = ?2",
        [session_id, sale_id],
    )?;
    set_state(&tx, table_id, TableState::Occupied)?;
    tx.commit()?;

    info!(table_id, session_id, sale_id, customers, "Table session opened");
    get_session(conn, ctx, session_id)?.ok_or(MostradorError::not_found("table session", session_id))
}

/// Mark the session as waiting for the bill (pre-cuenta).
pub fn request_bill(conn: &Connection, ctx: &TenantContext, session_id: i64) -> Result<TableSession> {
    let session = require_open_session(conn, ctx, session_id)?;
    if session.status == SessionStatus::Active {
        conn.execute(
            "UPDATE table_sessions SET status = ?1 WHERE id = ?2",
            rusqlite::params![SessionStatus::BillRequested, session_id],
        )?;
        info!(session_id, "Bill requested");
    }
    get_session(conn, ctx, session_id)?.ok_or(MostradorError::not_found("table session", session_id))
}

/// Complete the session, settle its sale and free the table.
pub fn close_session(conn: &mut Connection, ctx: &TenantContext, session_id: i64) -> Result<()> {
    let session = require_open_session(conn, ctx, session_id)?;
    if let Some(sale_id) = session.sale_id {
        if let Some(sale) = orders::get_sale(conn, ctx, sale_id)? {
            orders::warn_if_underpaid(conn, &sale)?;
        }
    }

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE table_sessions SET status = 'completed', closed_at = datetime('now') WHERE id = ?1",
        [session_id],
    )?;
    if let Some(sale_id) = session.sale_id {
        tx.execute("UPDATE sales SET status = 'paid' WHERE id = ?1 AND status = 'open'", [sale_id])?;
    }
    set_state(&tx, session.restaurant_table_id, TableState::Free)?;
    tx.commit()?;

    info!(session_id, table_id = session.restaurant_table_id, "Table session closed");
    Ok(())
}

/// Fold the open sessions of `others` into the main table.
///
/// If the main table has an open session it survives; otherwise the first
/// session found on the other tables is moved onto the main table and the
/// rest are folded into it. Folded sessions are re-pointed to the main table
/// and completed, and their items and kitchen tickets move to the surviving
/// sale. Each table may appear once. Everything, including the duplicate
/// session cleanup done by the lookups, runs in one transaction.
pub fn combine_tables(
    conn: &mut Connection,
    ctx: &TenantContext,
    main_table_id: i64,
    others: &[i64],
) -> Result<CombineOutcome> {
    if others.is_empty() {
        return Err(MostradorError::Validation("select at least one table to combine".into()));
    }
    if others.contains(&main_table_id) {
        return Err(MostradorError::Validation("the main table cannot be combined into itself".into()));
    }
    let mut seen = BTreeSet::new();
    if let Some(dup) = others.iter().find(|id| !seen.insert(**id)) {
        return Err(MostradorError::Validation(format!("table {dup} is listed more than once")));
    }

    let tx = conn.transaction()?;
    let main = require_table(&tx, ctx, main_table_id)?;
    if !main.is_active {
        return Err(MostradorError::InvalidState(format!("table {} is inactive", main.name)));
    }

    let mut incoming: Vec<TableSession> = Vec::new();
    for id in others {
        require_table(&tx, ctx, *id)?;
        let session = current_session(&tx, ctx, *id)?.ok_or_else(|| {
            MostradorError::InvalidState(format!("table {id} has no open session"))
        })?;
        incoming.push(session);
    }

    let survivor = match current_session(&tx, ctx, main_table_id)? {
        Some(s) => s,
        None => {
            let first = incoming.remove(0);
            tx.execute(
                "UPDATE table_sessions SET restaurant_table_id = ?1 WHERE id = ?2",
                [main_table_id, first.id],
            )?;
            first
        }
    };
    let survivor_sale = survivor
        .sale_id
        .ok_or_else(|| MostradorError::InvalidState(format!("session {} has no sale", survivor.id)))?;

    let mut merged = Vec::new();
    for session in incoming.iter().filter(|s| s.id != survivor.id) {
        tx.execute(
            "UPDATE table_sessions SET status = 'completed', closed_at = datetime('now'), \
             restaurant_table_id = ?1, notes = ?2 WHERE id = ?3",
            rusqlite::params![main_table_id, format!("combined into session {}", survivor.id), session.id],
        )?;
        if let Some(sale_id) = session.sale_id.filter(|id| *id != survivor_sale) {
            tx.execute("UPDATE sale_items SET sale_id = ?1 WHERE sale_id = ?2", [survivor_sale, sale_id])?;
            tx.execute("UPDATE kitchen_tickets SET sale_id = ?1 WHERE sale_id = ?2", [survivor_sale, sale_id])?;
            tx.execute("UPDATE sale_payments SET sale_id = ?1 WHERE sale_id = ?2", [survivor_sale, sale_id])?;
            tx.execute("UPDATE sales SET status = 'cancelled' WHERE id = ?1", [sale_id])?;
            orders::recompute_totals(&tx, sale_id)?;
        }
        tx.execute(
            "UPDATE table_sessions SET customers_count = customers_count + ?1 WHERE id = ?2",
            [session.customers_count, survivor.id],
        )?;
        merged.push(session.id);
    }
    orders::recompute_totals(&tx, survivor_sale)?;

    for id in others {
        set_state(&tx, *id, TableState::Free)?;
    }
    set_state(&tx, main_table_id, TableState::Occupied)?;
    tx.commit()?;

    info!(main_table = %main.name, survivor = survivor.id, merged = merged.len(), "Tables combined");
    Ok(CombineOutcome {
        surviving_session: survivor.id,
        merged_sessions: merged,
        freed_tables: others.to_vec(),
    })
}

/// Move an open session to a free table.
pub fn transfer_session(
    conn: &mut Connection,
    ctx: &TenantContext,
    session_id: i64,
    target_table_id: i64,
) -> Result<TableSession> {
    let session = require_open_session(conn, ctx, session_id)?;
    let target = require_table(conn, ctx, target_table_id)?;
    if target.id == session.restaurant_table_id {
        return Err(MostradorError::Validation("session is already on that table".into()));
    }
    if !target.is_active || target.state != TableState::Free {
        return Err(MostradorError::InvalidState(format!(
            "table {} is not available ({})",
            target.name, target.state
        )));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE table_sessions SET restaurant_table_id = ?1 WHERE id = ?2",
        [target_table_id, session_id],
    )?;
    set_state(&tx, session.restaurant_table_id, TableState::Free)?;
    set_state(&tx, target_table_id, TableState::Occupied)?;
    tx.commit()?;

    info!(session_id, from = session.restaurant_table_id, to = target_table_id, "Session transferred");
    get_session(conn, ctx, session_id)?.ok_or(MostradorError::not_found("table session", session_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_db, OPEN_SESSION_INDEX};
    use crate::orders::{add_item, NewItem};

    fn ctx() -> TenantContext {
        TenantContext::new(1).with_branch(1).with_user("mesero")
    }

    fn table(conn: &Connection, name: &str) -> i64 {
        create_table(conn, &ctx(), &NewTable { name, capacity: 4, zone: Some("Terraza") })
            .unwrap()
            .id
    }

    fn item(conn: &mut Connection, sale: i64, name: &str, qty: i64, price: f64) {
        add_item(conn, &ctx(), sale, &NewItem { product_name: name, quantity: qty, unit_price: price, discount: 0.0 })
            .unwrap();
    }

    #[test]
    fn test_requires_branch() {
        let (_dir, conn) = test_db();
        let err = list_tables(&conn, &TenantContext::new(1), None).unwrap_err();
        assert!(matches!(err, MostradorError::MissingContext("branch")));
    }

    #[test]
    fn test_open_request_bill_close() {
        let (_dir, mut conn) = test_db();
        let t = table(&conn, "Mesa 1");
        let session = open_session(&mut conn, &ctx(), t, 2).unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.opened_by.as_deref(), Some("mesero"));
        assert_eq!(require_table(&conn, &ctx(), t).unwrap().state, TableState::Occupied);
        assert!(matches!(open_session(&mut conn, &ctx(), t, 2), Err(MostradorError::InvalidState(_))));

        let session = request_bill(&conn, &ctx(), session.id).unwrap();
        assert_eq!(session.status, SessionStatus::BillRequested);

        close_session(&mut conn, &ctx(), session.id).unwrap();
        assert_eq!(require_table(&conn, &ctx(), t).unwrap().state, TableState::Free);
        let closed = get_session(&conn, &ctx(), session.id).unwrap().unwrap();
        assert_eq!(closed.status, SessionStatus::Completed);
        assert!(closed.closed_at.is_some());
        assert!(matches!(close_session(&mut conn, &ctx(), session.id), Err(MostradorError::InvalidState(_))));
    }

    #[test]
    fn test_duplicate_sessions_keep_latest() {
        let (_dir, conn) = test_db();
        let t = table(&conn, "Mesa 2");
        conn.execute_batch(&format!("DROP INDEX {OPEN_SESSION_INDEX}")).unwrap();
        conn.execute(
            "INSERT INTO table_sessions (organization_id, restaurant_table_id, customers_count, status, opened_at) \
             VALUES (1, ?1, 2, 'active', '2025-05-01 19:00:00')",
            [t],
        ).unwrap();
        let older = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO table_sessions (organization_id, restaurant_table_id, customers_count, status, opened_at) \
             VALUES (1, ?1, 5, 'active', '2025-05-01 20:30:00')",
            [t],
        ).unwrap();
        let newer = conn.last_insert_rowid();

        let detail = get_table_detail(&conn, &ctx(), t).unwrap();
        assert_eq!(detail.duplicates_closed, 1);
        let survivor = detail.session.unwrap();
        assert_eq!(survivor.id, newer);
        assert_eq!(survivor.customers_count, 5);
        let stale = get_session(&conn, &ctx(), older).unwrap().unwrap();
        assert_eq!(stale.status, SessionStatus::Completed);

        assert_eq!(get_table_detail(&conn, &ctx(), t).unwrap().duplicates_closed, 0);
    }

    #[test]
    fn test_detail_lists_items() {
        let (_dir, mut conn) = test_db();
        let t = table(&conn, "Mesa 3");
        let session = open_session(&mut conn, &ctx(), t, 2).unwrap();
        item(&mut conn, session.sale_id.unwrap(), "Pozole", 2, 120.0);
        let detail = get_table_detail(&conn, &ctx(), t).unwrap();
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].total, 240.0);
    }

    #[test]
    fn test_combine_into_occupied_main() {
        let (_dir, mut conn) = test_db();
        let main = table(&conn, "Mesa 1");
        let other = table(&conn, "Mesa 2");
        let s_main = open_session(&mut conn, &ctx(), main, 2).unwrap();
        let s_other = open_session(&mut conn, &ctx(), other, 3).unwrap();
        item(&mut conn, s_main.sale_id.unwrap(), "Tacos", 3, 30.0);
        item(&mut conn, s_other.sale_id.unwrap(), "Cerveza", 4, 40.0);

        let outcome = combine_tables(&mut conn, &ctx(), main, &[other]).unwrap();
        assert_eq!(outcome.surviving_session, s_main.id);
        assert_eq!(outcome.merged_sessions, vec![s_other.id]);
        assert_eq!(outcome.freed_tables, vec![other]);

        assert_eq!(require_table(&conn, &ctx(), other).unwrap().state, TableState::Free);
        let detail = get_table_detail(&conn, &ctx(), main).unwrap();
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.session.as_ref().unwrap().customers_count, 5);
        let sale = orders::get_sale(&conn, &ctx(), s_main.sale_id.unwrap()).unwrap().unwrap();
        assert_eq!(sale.total, 250.0);

        let folded = get_session(&conn, &ctx(), s_other.id).unwrap().unwrap();
        assert_eq!(folded.status, SessionStatus::Completed);
        assert_eq!(folded.restaurant_table_id, main);
    }

    #[test]
    fn test_combine_into_free_main_moves_first_session() {
        let (_dir, mut conn) = test_db();
        let main = table(&conn, "Mesa 1");
        let a = table(&conn, "Mesa 2");
        let b = table(&conn, "Mesa 3");
        let s_a = open_session(&mut conn, &ctx(), a, 2).unwrap();
        open_session(&mut conn, &ctx(), b, 2).unwrap();

        let outcome = combine_tables(&mut conn, &ctx(), main, &[a, b]).unwrap();
        assert_eq!(outcome.surviving_session, s_a.id);
        assert_eq!(outcome.merged_sessions.len(), 1);
        assert_eq!(require_table(&conn, &ctx(), main).unwrap().state, TableState::Occupied);
        assert_eq!(current_session(&conn, &ctx(), main).unwrap().unwrap().id, s_a.id);
        assert!(current_session(&conn, &ctx(), a).unwrap().is_none());
        assert!(current_session(&conn, &ctx(), b).unwrap().is_none());
    }

    #[test]
    fn test_combine_fails_atomically_without_session() {
        let (_dir, mut conn) = test_db();
        let main = table(&conn, "Mesa 1");
        let busy = table(&conn, "Mesa 2");
        let empty = table(&conn, "Mesa 3");
        open_session(&mut conn, &ctx(), busy, 2).unwrap();

        let err = combine_tables(&mut conn, &ctx(), main, &[busy, empty]).unwrap_err();
        assert!(matches!(err, MostradorError::InvalidState(_)));
        assert_eq!(require_table(&conn, &ctx(), busy).unwrap().state, TableState::Occupied);
        assert_eq!(require_table(&conn, &ctx(), main).unwrap().state, TableState::Free);
    }

    #[test]
    fn test_combine_rejects_duplicate_tables() {
        let (_dir, mut conn) = test_db();
        let main = table(&conn, "Mesa 1");
        let a = table(&conn, "Mesa 2");
        let s_a = open_session(&mut conn, &ctx(), a, 3).unwrap();

        let err = combine_tables(&mut conn, &ctx(), main, &[a, a]).unwrap_err();
        assert!(matches!(err, MostradorError::Validation(_)));
        let untouched = get_session(&conn, &ctx(), s_a.id).unwrap().unwrap();
        assert_eq!(untouched.status, SessionStatus::Active);
        assert_eq!(untouched.restaurant_table_id, a);
        let sale = orders::get_sale(&conn, &ctx(), s_a.sale_id.unwrap()).unwrap().unwrap();
        assert_eq!(sale.status, crate::models::SaleStatus::Open);
        assert_eq!(require_table(&conn, &ctx(), main).unwrap().state, TableState::Free);

        let s_main = open_session(&mut conn, &ctx(), main, 2).unwrap();
        assert!(matches!(
            combine_tables(&mut conn, &ctx(), main, &[a, a]),
            Err(MostradorError::Validation(_))
        ));
        assert!(matches!(
            combine_tables(&mut conn, &ctx(), main, &[main, a]),
            Err(MostradorError::Validation(_))
        ));
        let outcome = combine_tables(&mut conn, &ctx(), main, &[a]).unwrap();
        assert_eq!(outcome.surviving_session, s_main.id);
        assert_eq!(outcome.merged_sessions, vec![s_a.id]);
        assert_eq!(current_session(&conn, &ctx(), main).unwrap().unwrap().customers_count, 5);
    }

    #[test]
    fn test_combine_rejects_inactive_main() {
        let (_dir, mut conn) = test_db();
        let main = table(&conn, "Mesa 1");
        let a = table(&conn, "Mesa 2");
        open_session(&mut conn, &ctx(), a, 2).unwrap();
        deactivate_table(&conn, &ctx(), main).unwrap();

        let err = combine_tables(&mut conn, &ctx(), main, &[a]).unwrap_err();
        assert!(matches!(err, MostradorError::InvalidState(_)));
        assert_eq!(require_table(&conn, &ctx(), a).unwrap().state, TableState::Occupied);
    }

    #[test]
    fn test_failed_combine_keeps_duplicate_sessions() {
        let (_dir, mut conn) = test_db();
        let main = table(&conn, "Mesa 1");
        let busy = table(&conn, "Mesa 2");
        let empty = table(&conn, "Mesa 3");
        conn.execute_batch(&format!("DROP INDEX {OPEN_SESSION_INDEX}")).unwrap();
        for opened in ["2025-05-01 19:00:00", "2025-05-01 20:30:00"] {
            conn.execute(
                "INSERT INTO table_sessions (organization_id, restaurant_table_id, customers_count, status, opened_at) \
                 VALUES (1, ?1, 2, 'active', ?2)",
                rusqlite::params![busy, opened],
            ).unwrap();
        }

        let err = combine_tables(&mut conn, &ctx(), main, &[busy, empty]).unwrap_err();
        assert!(matches!(err, MostradorError::InvalidState(_)));
        assert_eq!(open_sessions(&conn, &ctx(), busy).unwrap().len(), 2);
    }

    #[test]
    fn test_transfer_session() {
        let (_dir, mut conn) = test_db();
        let from = table(&conn, "Mesa 1");
        let to = table(&conn, "Mesa 2");
        let busy = table(&conn, "Mesa 3");
        let s = open_session(&mut conn, &ctx(), from, 2).unwrap();
        open_session(&mut conn, &ctx(), busy, 1).unwrap();

        assert!(matches!(
            transfer_session(&mut conn, &ctx(), s.id, busy),
            Err(MostradorError::InvalidState(_))
        ));
        let moved = transfer_session(&mut conn, &ctx(), s.id, to).unwrap();
        assert_eq!(moved.restaurant_table_id, to);
        assert_eq!(require_table(&conn, &ctx(), from).unwrap().state, TableState::Free);
        assert_eq!(require_table(&conn, &ctx(), to).unwrap().state, TableState::Occupied);
    }

    #[test]
    fn test_reserve_release_and_zones() {
        let (_dir, conn) = test_db();
        let t = table(&conn, "Mesa 1");
        create_table(&conn, &ctx(), &NewTable { name: "Barra 1", capacity: 2, zone: Some("Barra") }).unwrap();
        assert_eq!(list_zones(&conn, &ctx()).unwrap(), vec!["Barra".to_string(), "Terraza".to_string()]);
        assert_eq!(list_tables(&conn, &ctx(), Some("Barra")).unwrap().len(), 1);

        reserve_table(&conn, &ctx(), t).unwrap();
        assert!(matches!(reserve_table(&conn, &ctx(), t), Err(MostradorError::InvalidState(_))));
        release_table(&conn, &ctx(), t).unwrap();
        assert_eq!(require_table(&conn, &ctx(), t).unwrap().state, TableState::Free);

        set_position(&conn, &ctx(), t, 12.5, 40.0).unwrap();
        let updated = update_table(&conn, &ctx(), t, &TableUpdate { capacity: Some(6), ..Default::default() }).unwrap();
        assert_eq!(updated.capacity, 6);
        assert_eq!(updated.position_x, Some(12.5));

        deactivate_table(&conn, &ctx(), t).unwrap();
        assert_eq!(list_tables(&conn, &ctx(), None).unwrap().len(), 1);
    }
}
