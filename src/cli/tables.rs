use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::money;
use crate::models::{SessionStatus, TableState};
use crate::orders;
use crate::tables::{self, NewTable, TableUpdate};

use super::open;

fn state_cell(state: TableState) -> String {
    match state {
        TableState::Free => state.as_str().green().to_string(),
        TableState::Occupied => state.as_str().red().to_string(),
        TableState::Reserved => state.as_str().yellow().to_string(),
    }
}

pub fn add(name: &str, capacity: i64, zone: Option<&str>) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let table = tables::create_table(&conn, &ctx, &NewTable { name, capacity, zone })?;
    println!("Added table #{}: {} ({} seats)", table.id, table.name, table.capacity);
    Ok(())
}

pub fn list(zone: Option<&str>) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let rows = tables::list_tables(&conn, &ctx, zone)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Zone", "Seats", "State", "Position"]);
    for t in rows {
        let position = match (t.position_x, t.position_y) {
            (Some(x), Some(y)) => format!("{x:.0},{y:.0}"),
            _ => String::new(),
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.name),
            Cell::new(t.zone.unwrap_or_default()),
            Cell::new(t.capacity),
            Cell::new(state_cell(t.state)),
            Cell::new(position),
        ]);
    }
    println!("Tables\n{table}");
    Ok(())
}

pub fn zones() -> Result<()> {
    let (conn, ctx, _) = open()?;
    for zone in tables::list_zones(&conn, &ctx)? {
        println!("{zone}");
    }
    Ok(())
}

pub fn open_session(table_id: i64, customers: i64) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    let session = tables::open_session(&mut conn, &ctx, table_id, customers)?;
    println!(
        "Opened session #{} on table #{} for {} (sale #{})",
        session.id,
        table_id,
        customers,
        session.sale_id.unwrap_or_default()
    );
    Ok(())
}

pub fn show(table_id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let detail = tables::get_table_detail(&conn, &ctx, table_id)?;
    if detail.duplicates_closed > 0 {
        println!(
            "{}",
            format!("Closed {} duplicate session(s) on this table", detail.duplicates_closed).yellow()
        );
    }
    let t = &detail.table;
    println!(
        "Table #{} {} [{}]  {} seats {}",
        t.id,
        t.name,
        state_cell(t.state),
        t.capacity,
        t.zone.as_deref().unwrap_or("")
    );

    let Some(session) = &detail.session else {
        println!("No open session.");
        return Ok(());
    };
    let status = match session.status {
        SessionStatus::BillRequested => "bill requested".yellow().to_string(),
        other => other.to_string(),
    };
    println!(
        "Session #{} {} since {} ({} customers, opened by {})",
        session.id,
        status,
        session.opened_at,
        session.customers_count,
        session.opened_by.as_deref().unwrap_or("-")
    );

    let mut table = Table::new();
    table.set_header(vec!["Item", "Product", "Qty", "Price", "Discount", "Total"]);
    for i in &detail.items {
        table.add_row(vec![
            Cell::new(i.id),
            Cell::new(&i.product_name),
            Cell::new(i.quantity),
            Cell::new(money(i.unit_price)),
            Cell::new(money(i.discount)),
            Cell::new(money(i.total)),
        ]);
    }
    println!("{table}");

    if let Some(sale_id) = session.sale_id {
        if let Some(sale) = orders::get_sale(&conn, &ctx, sale_id)? {
            let paid = orders::paid_total(&conn, sale_id)?;
            println!("Sale #{}  total {}  paid {}", sale.id, money(sale.total), money(paid));
        }
    }
    Ok(())
}

pub fn bill(session_id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let session = tables::request_bill(&conn, &ctx, session_id)?;
    println!("Session #{} is {}", session.id, session.status);
    Ok(())
}

pub fn close(session_id: i64) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    tables::close_session(&mut conn, &ctx, session_id)?;
    println!("Closed session #{session_id}");
    Ok(())
}

pub fn combine(main: i64, others: &[i64]) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    let outcome = tables::combine_tables(&mut conn, &ctx, main, others)?;
    println!(
        "Combined {} session(s) into session #{} on table #{main}",
        outcome.merged_sessions.len(),
        outcome.surviving_session
    );
    let freed: Vec<String> = outcome.freed_tables.iter().map(|id| format!("#{id}")).collect();
    println!("Freed tables: {}", freed.join(", "));
    Ok(())
}

pub fn transfer(session_id: i64, table_id: i64) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    let session = tables::transfer_session(&mut conn, &ctx, session_id, table_id)?;
    println!("Moved session #{} to table #{}", session.id, session.restaurant_table_id);
    Ok(())
}

pub fn reserve(table_id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    tables::reserve_table(&conn, &ctx, table_id)?;
    println!("Table #{table_id} reserved");
    Ok(())
}

pub fn release(table_id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    tables::release_table(&conn, &ctx, table_id)?;
    println!("Table #{table_id} released");
    Ok(())
}

pub fn edit(table_id: i64, name: Option<String>, capacity: Option<i64>, zone: Option<String>) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let t = tables::update_table(&conn, &ctx, table_id, &TableUpdate { name, capacity, zone })?;
    println!(
        "Table #{} {} ({} seats) {}",
        t.id,
        t.name,
        t.capacity,
        t.zone.as_deref().unwrap_or("")
    );
    Ok(())
}

pub fn move_to(table_id: i64, x: f64, y: f64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    tables::set_position(&conn, &ctx, table_id, x, y)?;
    println!("Table #{table_id} placed at {x:.0},{y:.0}");
    Ok(())
}

pub fn remove(table_id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    tables::deactivate_table(&conn, &ctx, table_id)?;
    println!("Table #{table_id} removed from service");
    Ok(())
}
