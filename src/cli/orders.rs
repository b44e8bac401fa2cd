use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::money;
use crate::models::TicketStatus;
use crate::orders::{self, NewItem};

use super::open;

pub fn add_item(sale: i64, product: &str, quantity: i64, price: f64, discount: f64) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    let item = orders::add_item(
        &mut conn,
        &ctx,
        sale,
        &NewItem {
            product_name: product,
            quantity,
            unit_price: price,
            discount,
        },
    )?;
    println!(
        "Added item #{}: {} x {} = {}",
        item.id,
        item.quantity,
        item.product_name,
        money(item.total)
    );
    Ok(())
}

pub fn remove_item(item: i64) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    orders::remove_item(&mut conn, &ctx, item)?;
    println!("Removed item #{item}");
    Ok(())
}

pub fn items(sale_id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let rows = orders::list_items(&conn, &ctx, sale_id)?;

    let mut table = Table::new();
    table.set_header(vec!["Item", "Product", "Qty", "Price", "Discount", "Total"]);
    for i in rows {
        table.add_row(vec![
            Cell::new(i.id),
            Cell::new(i.product_name),
            Cell::new(i.quantity),
            Cell::new(money(i.unit_price)),
            Cell::new(money(i.discount)),
            Cell::new(money(i.total)),
        ]);
    }
    println!("Sale #{sale_id}\n{table}");
    if let Some(sale) = orders::get_sale(&conn, &ctx, sale_id)? {
        println!("Subtotal: {}", money(sale.subtotal));
        if sale.discount_total > 0.0 {
            println!("Discount: {}", money(-sale.discount_total));
        }
        println!("Total:    {}", money(orders::sale_total(&conn, &ctx, sale_id)?).bold());
    }
    Ok(())
}

pub fn send(sale_id: i64, station: &str) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    match orders::send_to_kitchen(&mut conn, &ctx, sale_id, station)? {
        Some(ticket) => println!(
            "Sent ticket #{} to {} ({} item(s))",
            ticket.id, ticket.station, ticket.item_count
        ),
        None => println!("Nothing new to send."),
    }
    Ok(())
}

pub fn tickets(status: Option<&str>) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let status: Option<TicketStatus> = status.map(str::parse).transpose()?;
    let rows = orders::list_kitchen_tickets(&conn, &ctx, status)?;

    let mut table = Table::new();
    table.set_header(vec!["Ticket", "Sale", "Station", "Items", "Status", "Created"]);
    for t in rows {
        let status = match t.status {
            TicketStatus::Pending => t.status.as_str().red().to_string(),
            TicketStatus::Preparing => t.status.as_str().yellow().to_string(),
            TicketStatus::Ready => t.status.as_str().green().to_string(),
            TicketStatus::Delivered => t.status.as_str().to_string(),
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.sale_id),
            Cell::new(t.station),
            Cell::new(t.item_count),
            Cell::new(status),
            Cell::new(t.created_at),
        ]);
    }
    println!("Kitchen tickets\n{table}");
    Ok(())
}

pub fn advance(ticket: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let status = orders::advance_ticket(&conn, &ctx, ticket)?;
    println!("Ticket #{ticket} is {status}");
    Ok(())
}

pub fn methods() -> Result<()> {
    let (conn, ctx, _) = open()?;
    for m in orders::list_payment_methods(&conn, &ctx)? {
        println!("{:<10} {}", m.code, m.name);
    }
    Ok(())
}
