use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::money;
use crate::models::{MatchType, Reconciliation};
use crate::reconciliation::{self, NewReconciliation};

use super::open;

fn print_summary(rec: &Reconciliation) {
    println!(
        "Reconciliation #{} [{}]  {} to {}",
        rec.id, rec.status, rec.period_start, rec.period_end
    );
    println!("  Opening:    {}", money(rec.opening_balance));
    println!("  Matched:    {}", money(rec.matched_amount));
    println!("  Statement:  {}", money(rec.statement_balance));
    let diff = rec.difference();
    if diff.abs() < 0.005 {
        println!("  Difference: {}", money(0.0).green());
    } else {
        println!("  Difference: {}", money(diff).red());
    }
}

pub fn create(
    account: i64,
    period_start: &str,
    period_end: &str,
    opening: f64,
    statement: f64,
    notes: Option<&str>,
) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let rec = reconciliation::create(
        &conn,
        &ctx,
        &NewReconciliation {
            bank_account_id: account,
            period_start,
            period_end,
            opening_balance: opening,
            statement_balance: statement,
            notes,
        },
    )?;
    print_summary(&rec);
    Ok(())
}

pub fn show(id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let Some(rec) = reconciliation::get(&conn, &ctx, id)? else {
        println!("Reconciliation #{id} not found.");
        return Ok(());
    };
    print_summary(&rec);

    let items = reconciliation::list_items(&conn, &ctx, id)?;
    let mut table = Table::new();
    table.set_header(vec!["Item", "Transaction", "Type", "Amount", "Matched at"]);
    for i in items {
        table.add_row(vec![
            Cell::new(i.id),
            Cell::new(i.bank_transaction_id),
            Cell::new(i.match_type),
            Cell::new(money(i.amount)),
            Cell::new(i.matched_at),
        ]);
    }
    println!("\nMatched\n{table}");

    let pending = reconciliation::unmatched_transactions(&conn, &ctx, id)?;
    let mut table = Table::new();
    table.set_header(vec!["Transaction", "Date", "Description", "Amount"]);
    for t in &pending {
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(&t.transaction_date),
            Cell::new(&t.description),
            Cell::new(money(t.signed_amount())),
        ]);
    }
    println!("\nPending in period\n{table}");
    Ok(())
}

pub fn list(account: Option<i64>) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let rows = reconciliation::list(&conn, &ctx, account)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Account", "Period", "Statement", "Difference", "Status"]);
    for r in rows {
        let diff = r.difference();
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(r.bank_account_id),
            Cell::new(format!("{} to {}", r.period_start, r.period_end)),
            Cell::new(money(r.statement_balance)),
            Cell::new(money(diff)),
            Cell::new(r.status),
        ]);
    }
    println!("Reconciliations\n{table}");
    Ok(())
}

pub fn start(id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let rec = reconciliation::start(&conn, &ctx, id)?;
    println!("Reconciliation #{} is {}", rec.id, rec.status);
    Ok(())
}

pub fn match_transaction(id: i64, transaction: i64, match_type: &str) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    let match_type: MatchType = match_type.parse()?;
    let item = reconciliation::match_transaction(&mut conn, &ctx, id, transaction, match_type)?;
    println!("Matched transaction #{transaction} as item #{} ({})", item.id, money(item.amount));
    if let Some(rec) = reconciliation::get(&conn, &ctx, id)? {
        println!("Difference: {}", money(rec.difference()));
    }
    Ok(())
}

pub fn unmatch(item: i64) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    reconciliation::unmatch_item(&mut conn, &ctx, item)?;
    println!("Removed item #{item}");
    Ok(())
}

pub fn close(id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let rec = reconciliation::close(&conn, &ctx, id)?;
    print_summary(&rec);
    Ok(())
}
