use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::bank::{self, NewAccount, NewTransaction};
use crate::error::Result;
use crate::fmt::{money, money_in};
use crate::models::{TransactionStatus, TransactionType};

use super::{open, today, MovementArgs};

pub fn add(
    name: &str,
    account_type: &str,
    bank_name: Option<&str>,
    number: Option<&str>,
    currency: Option<&str>,
    opening_balance: f64,
) -> Result<()> {
    let (conn, ctx, settings) = open()?;
    let account = bank::create_account(
        &conn,
        &ctx,
        &NewAccount {
            name,
            bank_name,
            account_number: number,
            account_type,
            currency: currency.unwrap_or(settings.currency.as_str()),
            opening_balance,
        },
    )?;
    println!(
        "Added account #{}: {} ({})",
        account.id,
        account.name,
        money_in(account.balance, &account.currency)
    );
    Ok(())
}

pub fn list(include_inactive: bool) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let accounts = bank::list_accounts(&conn, &ctx, include_inactive)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Bank", "Number", "Type", "Balance", ""]);
    for a in accounts {
        let balance = if a.balance < 0.0 {
            money(a.balance).red().to_string()
        } else {
            money(a.balance)
        };
        table.add_row(vec![
            Cell::new(a.id),
            Cell::new(a.name),
            Cell::new(a.bank_name.unwrap_or_default()),
            Cell::new(a.account_number.unwrap_or_default()),
            Cell::new(a.account_type),
            Cell::new(format!("{balance} {}", a.currency)),
            Cell::new(if a.is_active { "" } else { "inactive" }),
        ]);
    }
    println!("Bank accounts\n{table}");
    Ok(())
}

pub fn movement(args: &MovementArgs, transaction_type: TransactionType) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    let date = args
        .date
        .clone()
        .unwrap_or_else(|| today().format("%Y-%m-%d").to_string());
    let txn = bank::create_transaction(
        &mut conn,
        &ctx,
        &NewTransaction {
            bank_account_id: args.account,
            transaction_date: &date,
            description: &args.description,
            reference: args.reference.as_deref(),
            amount: args.amount,
            transaction_type,
        },
    )?;
    let account = bank::get_account(&conn, &ctx, args.account)?;
    println!(
        "Recorded {} #{} for {}",
        txn.transaction_type,
        txn.id,
        money(txn.amount)
    );
    if let Some(a) = account {
        println!("New balance: {}", money_in(a.balance, &a.currency));
    }
    Ok(())
}

pub fn transactions(account_id: i64, status: Option<&str>) -> Result<()> {
    let (conn, ctx, _) = open()?;
    let status: Option<TransactionStatus> = status.map(str::parse).transpose()?;
    let rows = bank::list_transactions(&conn, &ctx, account_id, status)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Reference", "Amount", "Status"]);
    for t in rows {
        let amount = match t.transaction_type {
            TransactionType::Credit => money(t.amount).green().to_string(),
            TransactionType::Debit => money(-t.amount).red().to_string(),
        };
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.transaction_date),
            Cell::new(t.description),
            Cell::new(t.reference.unwrap_or_default()),
            Cell::new(amount),
            Cell::new(t.status),
        ]);
    }
    println!("Transactions\n{table}");
    Ok(())
}

pub fn delete(transaction_id: i64) -> Result<()> {
    let (mut conn, ctx, _) = open()?;
    bank::delete_transaction(&mut conn, &ctx, transaction_id)?;
    println!("Deleted transaction #{transaction_id}");
    Ok(())
}

pub fn deactivate(account_id: i64) -> Result<()> {
    let (conn, ctx, _) = open()?;
    bank::deactivate_account(&conn, &ctx, account_id)?;
    println!("Deactivated account #{account_id}");
    Ok(())
}
