//! Sales attached to table sessions: line items, kitchen tickets and the
//! payments collected for each bill split.

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::context::TenantContext;
use crate::error::{MostradorError, Result};
use crate::models::{KitchenTicket, PaymentMethod, Sale, SaleItem, SaleStatus, TicketStatus};
use crate::split::BillSplit;

pub struct NewItem<'a> {
    pub product_name: &'a str,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount: f64,
}

fn sale_from_row(row: &Row) -> rusqlite::Result<Sale> {
    Ok(Sale {
        id: row.get(0)?,
        branch_id: row.get(1)?,
        table_session_id: row.get(2)?,
        subtotal: row.get(3)?,
        discount_total: row.get(4)?,
        total: row.get(5)?,
        status: row.get(6)?,
    })
}

fn item_from_row(row: &Row) -> rusqlite::Result<SaleItem> {
    Ok(SaleItem {
        id: row.get(0)?,
        sale_id: row.get(1)?,
        product_name: row.get(2)?,
        quantity: row.get(3)?,
        unit_price: row.get(4)?,
        discount: row.get(5)?,
        total: row.get(6)?,
    })
}

pub(crate) fn insert_sale(conn: &Connection, organization_id: i64, branch_id: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO sales (organization_id, branch_id) VALUES (?1, ?2)",
        [organization_id, branch_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Recompute the sale header from its items. Returns the new total.
pub(crate) fn recompute_totals(conn: &Connection, sale_id: i64) -> Result<f64> {
    let (subtotal, discount): (f64, f64) = conn.query_row(
        "SELECT COALESCE(SUM(quantity * unit_price), 0), COALESCE(SUM(discount), 0) \
         FROM sale_items WHERE sale_id = ?1",
        [sale_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let total = subtotal - discount;
    conn.execute(
        "UPDATE sales SET subtotal = ?1, discount_total = ?2, total = ?3 WHERE id = ?4",
        rusqlite::params![subtotal, discount, total, sale_id],
    )?;
    debug!(sale_id, total, "Sale totals recomputed");
    Ok(total)
}

pub fn get_sale(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Option<Sale>> {
    let org = ctx.require_organization()?;
    Ok(conn
        .query_row(
            "SELECT id, branch_id, table_session_id, subtotal, discount_total, total, status \
             FROM sales WHERE id = ?1 AND organization_id = ?2",
            [id, org],
            sale_from_row,
        )
        .optional()?)
}

fn require_open_sale(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Sale> {
    let sale = get_sale(conn, ctx, id)?.ok_or(MostradorError::not_found("sale", id))?;
    if sale.status != SaleStatus::Open {
        return Err(MostradorError::InvalidState(format!("sale {id} is {}", sale.status)));
    }
    Ok(sale)
}

pub fn add_item(conn: &mut Connection, ctx: &TenantContext, sale_id: i64, new: &NewItem) -> Result<SaleItem> {
    require_open_sale(conn, ctx, sale_id)?;
    if new.product_name.trim().is_empty() {
        return Err(MostradorError::Validation("product name is required".into()));
    }
    if new.quantity <= 0 {
        return Err(MostradorError::Validation("quantity must be at least 1".into()));
    }
    if new.unit_price < 0.0 {
        return Err(MostradorError::Validation("unit price cannot be negative".into()));
    }
    let gross = new.quantity as f64 * new.unit_price;
    if new.discount < 0.0 || new.discount > gross {
        return Err(MostradorError::Validation(format!(
            "discount must be between 0 and {gross:.2}"
        )));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO sale_items (sale_id, product_name, quantity, unit_price, discount, total) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            sale_id,
            new.product_name.trim(),
            new.quantity,
            new.unit_price,
            new.discount,
            gross - new.discount
        ],
    )?;
    let id = tx.last_insert_rowid();
    recompute_totals(&tx, sale_id)?;
    tx.commit()?;

    info!(sale_id, item_id = id, product = new.product_name, quantity = new.quantity, "Item added");
    Ok(SaleItem {
        id,
        sale_id,
        product_name: new.product_name.trim().to_string(),
        quantity: new.quantity,
        unit_price: new.unit_price,
        discount: new.discount,
        total: gross - new.discount,
    })
}

pub fn remove_item(conn: &mut Connection, ctx: &TenantContext, item_id: i64) -> Result<()> {
    let sale_id: i64 = conn
        .query_row("SELECT sale_id FROM sale_items WHERE id = ?1", [item_id], |row| row.get(0))
        .optional()?
        .ok_or(MostradorError::not_found("sale item", item_id))?;
    require_open_sale(conn, ctx, sale_id)?;

    let ticketed: i64 = conn.query_row(
        "SELECT count(*) FROM kitchen_ticket_items WHERE sale_item_id = ?1",
        [item_id],
        |row| row.get(0),
    )?;
    if ticketed > 0 {
        return Err(MostradorError::InvalidState(format!(
            "item {item_id} was already sent to the kitchen"
        )));
    }

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM sale_items WHERE id = ?1", [item_id])?;
    recompute_totals(&tx, sale_id)?;
    tx.commit()?;
    info!(sale_id, item_id, "Item removed");
    Ok(())
}

/// Total of a sale computed from its current lines, discounts applied.
pub fn sale_total(conn: &Connection, ctx: &TenantContext, sale_id: i64) -> Result<f64> {
    get_sale(conn, ctx, sale_id)?.ok_or(MostradorError::not_found("sale", sale_id))?;
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(quantity * unit_price - discount), 0) FROM sale_items WHERE sale_id = ?1",
        [sale_id],
        |row| row.get(0),
    )?)
}

pub fn list_items(conn: &Connection, ctx: &TenantContext, sale_id: i64) -> Result<Vec<SaleItem>> {
    get_sale(conn, ctx, sale_id)?.ok_or(MostradorError::not_found("sale", sale_id))?;
    let mut stmt = conn.prepare(
        "SELECT id, sale_id, product_name, quantity, unit_price, discount, total \
         FROM sale_items WHERE sale_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([sale_id], item_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Create a ticket with every unit not yet sent to the kitchen.
/// Returns `None` when there is nothing new to prepare.
pub fn send_to_kitchen(
    conn: &mut Connection,
    ctx: &TenantContext,
    sale_id: i64,
    station: &str,
) -> Result<Option<KitchenTicket>> {
    let org = ctx.require_organization()?;
    require_open_sale(conn, ctx, sale_id)?;

    let pending: Vec<(i64, i64)> = {
        let mut stmt = conn.prepare(
            "SELECT si.id, si.quantity - COALESCE((SELECT SUM(kti.quantity) FROM kitchen_ticket_items kti \
                                                   WHERE kti.sale_item_id = si.id), 0) AS pending \
             FROM sale_items si WHERE si.sale_id = ?1",
        )?;
        let rows = stmt.query_map([sale_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<(i64, i64)>, _>>()?
            .into_iter()
            .filter(|(_, qty)| *qty > 0)
            .collect()
    };
    if pending.is_empty() {
        debug!(sale_id, "Nothing new to send to the kitchen");
        return Ok(None);
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO kitchen_tickets (organization_id, sale_id, station) VALUES (?1, ?2, ?3)",
        rusqlite::params![org, sale_id, station],
    )?;
    let ticket_id = tx.last_insert_rowid();
    for (item_id, qty) in &pending {
        tx.execute(
            "INSERT INTO kitchen_ticket_items (kitchen_ticket_id, sale_item_id, quantity) VALUES (?1, ?2, ?3)",
            [ticket_id, *item_id, *qty],
        )?;
    }
    tx.commit()?;

    info!(sale_id, ticket_id, station, items = pending.len(), "Kitchen ticket created");
    get_ticket(conn, ctx, ticket_id)
}

const SELECT_TICKETS: &str = "
    SELECT t.id, t.sale_id, t.station, t.status, t.created_at,
           (SELECT COALESCE(SUM(i.quantity), 0) FROM kitchen_ticket_items i WHERE i.kitchen_ticket_id = t.id)
    FROM kitchen_tickets t";

fn ticket_from_row(row: &Row) -> rusqlite::Result<KitchenTicket> {
    Ok(KitchenTicket {
        id: row.get(0)?,
        sale_id: row.get(1)?,
        station: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        item_count: row.get(5)?,
    })
}

fn get_ticket(conn: &Connection, ctx: &TenantContext, id: i64) -> Result<Option<KitchenTicket>> {
    let org = ctx.require_organization()?;
    Ok(conn
        .query_row(
            &format!("{SELECT_TICKETS} WHERE t.id = ?1 AND t.organization_id = ?2"),
            [id, org],
            ticket_from_row,
        )
        .optional()?)
}

pub fn list_kitchen_tickets(
    conn: &Connection,
    ctx: &TenantContext,
    status: Option<TicketStatus>,
) -> Result<Vec<KitchenTicket>> {
    let org = ctx.require_organization()?;
    let mut stmt = conn.prepare(&format!(
        "{SELECT_TICKETS} WHERE t.organization_id = ?1 AND (?2 IS NULL OR t.status = ?2) ORDER BY t.id"
    ))?;
    let rows = stmt.query_map(rusqlite::params![org, status], ticket_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

impl TicketStatus {
    pub fn next(&self) -> Option<TicketStatus> {
        match self {
            Self::Pending => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::Delivered),
            Self::Delivered => None,
        }
    }
}

/// Step a kitchen ticket to its next status. Delivered tickets stay put.
pub fn advance_ticket(conn: &Connection, ctx: &TenantContext, ticket_id: i64) -> Result<TicketStatus> {
    let ticket = get_ticket(conn, ctx, ticket_id)?.ok_or(MostradorError::not_found("kitchen ticket", ticket_id))?;
    let next = ticket.status.next().ok_or_else(|| {
        MostradorError::InvalidState(format!("ticket {ticket_id} was already delivered"))
    })?;
    conn.execute(
        "UPDATE kitchen_tickets SET status = ?1 WHERE id = ?2",
        rusqlite::params![next, ticket_id],
    )?;
    info!(ticket_id, status = %next, "Kitchen ticket advanced");
    Ok(next)
}

pub fn list_payment_methods(conn: &Connection, ctx: &TenantContext) -> Result<Vec<PaymentMethod>> {
    let org = ctx.require_organization()?;
    let mut stmt = conn.prepare(
        "SELECT pm.id, pm.code, pm.name FROM payment_methods pm \
         JOIN organization_payment_methods opm ON opm.payment_method_id = pm.id \
         WHERE opm.organization_id = ?1 AND opm.is_active = 1 ORDER BY pm.id",
    )?;
    let rows = stmt.query_map([org], |row| {
        Ok(PaymentMethod {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Record one payment row per split. Splits with nothing to pay are rejected.
pub fn record_split_payments(
    conn: &mut Connection,
    ctx: &TenantContext,
    sale_id: i64,
    splits: &[&BillSplit],
    method: &str,
) -> Result<f64> {
    require_open_sale(conn, ctx, sale_id)?;
    if !list_payment_methods(conn, ctx)?.iter().any(|m| m.code == method) {
        return Err(MostradorError::Validation(format!("payment method not enabled: {method}")));
    }
    if let Some(empty) = splits.iter().find(|s| !(s.total > 0.0)) {
        return Err(crate::split::SplitError::NothingToPay(empty.id).into());
    }

    let tx = conn.transaction()?;
    let mut recorded = 0.0;
    for split in splits {
        let amount = (split.total * 100.0).round() / 100.0;
        tx.execute(
            "INSERT INTO sale_payments (sale_id, split_name, payment_method, amount) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![sale_id, split.name, method, amount],
        )?;
        recorded += amount;
    }
    tx.commit()?;
    info!(sale_id, splits = splits.len(), amount = recorded, method, "Split payments recorded");
    Ok(recorded)
}

pub fn paid_total(conn: &Connection, sale_id: i64) -> Result<f64> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM sale_payments WHERE sale_id = ?1",
        [sale_id],
        |row| row.get(0),
    )?)
}

/// Names of the splits that already have a payment on this sale.
pub fn paid_split_names(conn: &Connection, sale_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT split_name FROM sale_payments WHERE sale_id = ?1 AND split_name IS NOT NULL",
    )?;
    let rows = stmt.query_map([sale_id], |row| row.get(0))?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub(crate) fn warn_if_underpaid(conn: &Connection, sale: &Sale) -> Result<()> {
    let paid = paid_total(conn, sale.id)?;
    if paid + 0.005 < sale.total {
        warn!(sale_id = sale.id, total = sale.total, paid, "Closing sale with unpaid balance");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{enable_default_payment_methods, test_db};

    fn ctx() -> TenantContext {
        TenantContext::new(1).with_branch(1)
    }

    fn open_sale(conn: &Connection) -> i64 {
        insert_sale(conn, 1, 1).unwrap()
    }

    fn tacos() -> NewItem<'static> {
        NewItem { product_name: "Tacos", quantity: 3, unit_price: 30.0, discount: 0.0 }
    }

    #[test]
    fn test_add_item_updates_totals() {
        let (_dir, mut conn) = test_db();
        let sale = open_sale(&conn);
        add_item(&mut conn, &ctx(), sale, &tacos()).unwrap();
        let agua = NewItem { product_name: "Agua", quantity: 2, unit_price: 25.0, discount: 10.0 };
        let item = add_item(&mut conn, &ctx(), sale, &agua).unwrap();
        assert_eq!(item.total, 40.0);

        let s = get_sale(&conn, &ctx(), sale).unwrap().unwrap();
        assert_eq!(s.subtotal, 140.0);
        assert_eq!(s.discount_total, 10.0);
        assert_eq!(s.total, 130.0);

        remove_item(&mut conn, &ctx(), item.id).unwrap();
        let s = get_sale(&conn, &ctx(), sale).unwrap().unwrap();
        assert_eq!(s.total, 90.0);
    }

    #[test]
    fn test_sale_total_follows_lines() {
        let (_dir, mut conn) = test_db();
        let sale = open_sale(&conn);
        assert_eq!(sale_total(&conn, &ctx(), sale).unwrap(), 0.0);
        add_item(&mut conn, &ctx(), sale, &tacos()).unwrap();
        let agua = NewItem { product_name: "Agua", quantity: 2, unit_price: 25.0, discount: 10.0 };
        add_item(&mut conn, &ctx(), sale, &agua).unwrap();
        assert_eq!(sale_total(&conn, &ctx(), sale).unwrap(), 130.0);

        let other_org = TenantContext::new(2).with_branch(1);
        assert!(matches!(
            sale_total(&conn, &other_org, sale),
            Err(MostradorError::NotFound { .. })
        ));
    }

    #[test]
    fn test_add_item_validation() {
        let (_dir, mut conn) = test_db();
        let sale = open_sale(&conn);
        let zero = NewItem { quantity: 0, ..tacos() };
        assert!(matches!(add_item(&mut conn, &ctx(), sale, &zero), Err(MostradorError::Validation(_))));
        let too_much_discount = NewItem { discount: 100.0, ..tacos() };
        assert!(matches!(
            add_item(&mut conn, &ctx(), sale, &too_much_discount),
            Err(MostradorError::Validation(_))
        ));
        conn.execute("UPDATE sales SET status = 'paid' WHERE id = ?1", [sale]).unwrap();
        assert!(matches!(add_item(&mut conn, &ctx(), sale, &tacos()), Err(MostradorError::InvalidState(_))));
    }

    #[test]
    fn test_kitchen_only_sends_new_units() {
        let (_dir, mut conn) = test_db();
        let sale = open_sale(&conn);
        let first = add_item(&mut conn, &ctx(), sale, &tacos()).unwrap();
        let ticket = send_to_kitchen(&mut conn, &ctx(), sale, "cocina").unwrap().unwrap();
        assert_eq!(ticket.item_count, 3);
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert!(send_to_kitchen(&mut conn, &ctx(), sale, "cocina").unwrap().is_none());

        assert!(matches!(remove_item(&mut conn, &ctx(), first.id), Err(MostradorError::InvalidState(_))));

        add_item(&mut conn, &ctx(), sale, &NewItem { product_name: "Flan", quantity: 1, unit_price: 45.0, discount: 0.0 }).unwrap();
        let second = send_to_kitchen(&mut conn, &ctx(), sale, "postres").unwrap().unwrap();
        assert_eq!(second.item_count, 1);
        assert_eq!(list_kitchen_tickets(&conn, &ctx(), None).unwrap().len(), 2);
    }

    #[test]
    fn test_advance_ticket_until_delivered() {
        let (_dir, mut conn) = test_db();
        let sale = open_sale(&conn);
        add_item(&mut conn, &ctx(), sale, &tacos()).unwrap();
        let ticket = send_to_kitchen(&mut conn, &ctx(), sale, "cocina").unwrap().unwrap();
        assert_eq!(advance_ticket(&conn, &ctx(), ticket.id).unwrap(), TicketStatus::Preparing);
        assert_eq!(advance_ticket(&conn, &ctx(), ticket.id).unwrap(), TicketStatus::Ready);
        assert_eq!(advance_ticket(&conn, &ctx(), ticket.id).unwrap(), TicketStatus::Delivered);
        assert!(matches!(advance_ticket(&conn, &ctx(), ticket.id), Err(MostradorError::InvalidState(_))));
        let ready = list_kitchen_tickets(&conn, &ctx(), Some(TicketStatus::Ready)).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn test_record_split_payments() {
        let (_dir, mut conn) = test_db();
        enable_default_payment_methods(&conn, 1).unwrap();
        let sale = open_sale(&conn);
        add_item(&mut conn, &ctx(), sale, &tacos()).unwrap();

        let a = BillSplit { id: 0, name: "Ana".into(), items: vec![], total: 45.0 };
        let b = BillSplit { id: 1, name: "Luis".into(), items: vec![], total: 0.0 };
        assert!(matches!(
            record_split_payments(&mut conn, &ctx(), sale, &[&a], "bitcoin"),
            Err(MostradorError::Validation(_))
        ));
        assert!(matches!(
            record_split_payments(&mut conn, &ctx(), sale, &[&b], "cash"),
            Err(MostradorError::Split(_))
        ));
        assert_eq!(record_split_payments(&mut conn, &ctx(), sale, &[&a], "cash").unwrap(), 45.0);
        assert_eq!(paid_total(&conn, sale).unwrap(), 45.0);
        assert_eq!(paid_split_names(&conn, sale).unwrap(), vec!["Ana".to_string()]);
    }

    #[test]
    fn test_payment_methods_scoped_to_organization() {
        let (_dir, conn) = test_db();
        assert!(list_payment_methods(&conn, &ctx()).unwrap().is_empty());
        enable_default_payment_methods(&conn, 1).unwrap();
        assert_eq!(list_payment_methods(&conn, &ctx()).unwrap()[0].code, "cash");
        assert!(list_payment_methods(&conn, &TenantContext::new(2)).unwrap().is_empty());
    }
}
