use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::aging::{self, RiskTier};
use crate::context::TenantContext;
use crate::error::Result;
use crate::fmt::{money, money_in};
use crate::models::{Receivable, ReceivableStatus};
use crate::receivables::{self, NewPayment, NewReceivable, ReceivableFilter, DATE_FMT};

use super::{open, today};

fn status_cell(status: ReceivableStatus) -> String {
    match status {
        ReceivableStatus::Paid => status.as_str().green().to_string(),
        ReceivableStatus::Overdue => status.as_str().red().to_string(),
        ReceivableStatus::Partial => status.as_str().yellow().to_string(),
        ReceivableStatus::Current => status.as_str().to_string(),
    }
}

pub fn add_customer(name: &str, email: Option<&str>, phone: Option<&str>) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let customer = receivables::create_customer(&conn, &ctx, name, email, phone)?;
    println!("Added customer #{}: {}", customer.id, customer.name);
    Ok(())
}

pub fn customers() -> Result<()> {
    let (conn, ctx, _) = open()?;
    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Email", "Phone"]);
    for c in receivables::list_customers(&conn, &ctx)? {
        table.add_row(vec![
            Cell::new(c.id),
            Cell::new(c.name),
            Cell::new(c.email.unwrap_or_default()),
            Cell::new(c.phone.unwrap_or_default()),
        ]);
    }
    println!("Customers\n{table}");
    Ok(())
}

pub fn add(
    customer: i64,
    amount: f64,
    due: &str,
    issued: Option<&str>,
    invoice: Option<&str>,
    notes: Option<&str>,
) -> Result<()> {
    let (conn, ctx, settings) = open()?;
    let issue_date = issued
        .map(str::to_string)
        .unwrap_or_else(|| today().format(DATE_FMT).to_string());
    let id = receivables::create(
        &conn,
        &ctx,
        &NewReceivable {
            customer_id: customer,
            invoice_number: invoice,
            amount,
            issue_date: &issue_date,
            due_date: due,
            notes,
        },
    )?;
    println!("Added receivable #{id} for {}", money_in(amount, &settings.currency));
    Ok(())
}

pub fn list(
    status: Option<&str>,
    customer: Option<i64>,
    search: Option<String>,
    page: i64,
    page_size: i64,
) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let filter = ReceivableFilter {
        status: status.map(str::parse).transpose()?,
        customer_id: customer,
        search,
    };
    let result = receivables::list_paginated(&conn, &ctx, &filter, page, page_size, today())?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Customer", "Invoice", "Due", "Amount", "Balance", "Status"]);
    for r in &result.rows {
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(&r.customer_name),
            Cell::new(r.invoice_number.as_deref().unwrap_or("")),
            Cell::new(&r.due_date),
            Cell::new(money(r.amount)),
            Cell::new(money(r.balance)),
            Cell::new(status_cell(r.status)),
        ]);
    }
    println!("Receivables\n{table}");
    println!(
        "Page {} of {} ({} receivables)",
        result.page,
        result.total_pages().max(1),
        result.total
    );
    Ok(())
}

pub fn show(id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let Some(detail) = receivables::detail(&conn, &ctx, id, today())? else {
        println!("Receivable #{id} not found.");
        return Ok(());
    };
    let r = &detail.receivable;
    println!("Receivable #{} {}", r.id, r.invoice_number.as_deref().unwrap_or(""));
    println!("  Customer: {}", r.customer_name);
    println!("  Issued:   {}", r.issue_date);
    println!("  Due:      {} ({} days overdue)", r.due_date, detail.days_overdue);
    println!("  Amount:   {}", money(r.amount));
    println!("  Balance:  {}", money(r.balance));
    println!("  Status:   {}", status_cell(r.status));

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Method", "Reference", "Amount"]);
    for p in &detail.payments {
        table.add_row(vec![
            Cell::new(p.id),
            Cell::new(&p.payment_date),
            Cell::new(&p.payment_method),
            Cell::new(p.reference.as_deref().unwrap_or("")),
            Cell::new(money(p.amount)),
        ]);
    }
    println!("\nPayments\n{table}");
    Ok(())
}

pub fn pay(id: i64, amount: f64, method: &str, date: Option<&str>, reference: Option<&str>) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    let payment_date = date
        .map(str::to_string)
        .unwrap_or_else(|| today().format(DATE_FMT).to_string());
    let payment = receivables::record_payment(
        &mut conn,
        &ctx,
        &NewPayment {
            receivable_id: id,
            amount,
            payment_date: &payment_date,
            payment_method: method,
            reference,
        },
        today(),
    )?;
    println!("Recorded payment #{} of {}", payment.id, money(payment.amount));
    if let Some(detail) = receivables::detail(&conn, &ctx, id, today())? {
        println!(
            "Remaining balance: {} ({})",
            money(detail.receivable.balance),
            status_cell(detail.receivable.status)
        );
    }
    Ok(())
}

pub fn stats() -> Result<()> {
    let (conn, ctx, settings) = open()?;
    let s = receivables::stats(&conn, &ctx, today())?;
    println!("Outstanding: {}", money_in(s.total_outstanding, &settings.currency));
    println!("Overdue:     {}", money_in(s.overdue_amount, &settings.currency).red());
    println!();
    println!("Current:  {}", s.current);
    println!("Partial:  {}", s.partial);
    println!("Overdue:  {}", s.overdue);
    println!("Paid:     {}", s.paid);
    Ok(())
}

fn risk_cell(risk: RiskTier) -> String {
    match risk {
        RiskTier::High => risk.label().red().bold().to_string(),
        RiskTier::Medium => risk.label().yellow().to_string(),
        _ => risk.label().to_string(),
    }
}

fn aging_rows(conn: &Connection, ctx: &TenantContext, customers: &[i64], today: NaiveDate) -> Result<Vec<Receivable>> {
    if customers.is_empty() {
        receivables::with_customers(conn, ctx, today)
    } else {
        receivables::for_customers(conn, ctx, customers, today)
    }
}

pub fn aging(customers: &[i64]) -> Result<()> {
    let (conn, ctx, settings) = open()?;
    let today = today();
    let rows = aging_rows(&conn, &ctx, customers, today)?;
    let buckets = aging::aging_by_customer(&rows, today)?;
    let summary = aging::summarize(&buckets);

    let mut table = Table::new();
    table.set_header(aging::CSV_HEADER.to_vec());
    for b in &buckets {
        table.add_row(vec![
            Cell::new(&b.customer_name),
            Cell::new(money(b.current)),
            Cell::new(money(b.days_31_60)),
            Cell::new(money(b.days_61_90)),
            Cell::new(money(b.over_90)),
            Cell::new(money(b.total)),
            Cell::new(risk_cell(b.risk())),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL".bold()),
        Cell::new(money(summary.current)),
        Cell::new(money(summary.days_31_60)),
        Cell::new(money(summary.days_61_90)),
        Cell::new(money(summary.over_90)),
        Cell::new(money(summary.total)),
        Cell::new(""),
    ]);
    println!("Aging by customer ({})\n{table}", settings.currency);
    println!("{} customers with outstanding balance", summary.customers);
    Ok(())
}

pub fn export(output: Option<String>, customers: &[i64]) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let today = today();
    let rows = aging_rows(&conn, &ctx, customers, today)?;
    let buckets = aging::aging_by_customer(&rows, today)?;

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)?;
            aging::write_csv(&buckets, file)?;
            eprintln!("Exported {} customers to {path}", buckets.len());
        }
        None => aging::write_csv(&buckets, std::io::stdout().lock())?,
    }
    Ok(())
}
