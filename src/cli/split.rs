use std::collections::HashSet;

use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;
use tracing::warn;

use crate::context::TenantContext;
use crate::error::{MostradorError, Result};
use crate::fmt::money;
use crate::models::{Sale, TableSession};
use crate::orders;
use crate::split::{BillSplit, SplitModeKind, SplitPaymentSelector, SplitSession};
use crate::tables;

use super::{open, parse_list, SplitArgs};

struct Loaded {
    conn: Connection,
    ctx: TenantContext,
    session: TableSession,
    sale: Sale,
    split: SplitSession,
}

fn load(args: &SplitArgs) -> Result<Loaded> {
    let (conn, ctx, _) = open()?;
    let session = tables::get_session(&conn, &ctx, args.session)?
        .ok_or(MostradorError::not_found("table session", args.session))?;
    if !session.status.is_open() {
        return Err(MostradorError::InvalidState(format!(
            "session {} is {}",
            session.id, session.status
        )));
    }
    let sale_id = session
        .sale_id
        .ok_or_else(|| MostradorError::InvalidState(format!("session {} has no sale", session.id)))?;
    let sale = orders::get_sale(&conn, &ctx, sale_id)?.ok_or(MostradorError::not_found("sale", sale_id))?;
    let items = orders::list_items(&conn, &ctx, sale_id)?;
    let mut split = SplitSession::new(items, sale.total, args.comensales)?;
    if let Some(raw) = &args.names {
        for (i, name) in raw.split(',').map(str::trim).enumerate() {
            if !name.is_empty() {
                split.rename(i, name)?;
            }
        }
    }
    Ok(Loaded {
        conn,
        ctx,
        session,
        sale,
        split,
    })
}

/// Comensal numbers on the command line start at 1.
fn split_index(n: usize) -> Result<usize> {
    n.checked_sub(1)
        .ok_or_else(|| MostradorError::Validation("comensales are numbered from 1".into()))
}

pub fn equal(args: &SplitArgs) -> Result<()> {
    let mut loaded = load(args)?;
    loaded.split.set_mode(SplitModeKind::Equal);
    settle(loaded, args)
}

pub fn custom(amounts: Option<&str>, args: &SplitArgs) -> Result<()> {
    let mut loaded = load(args)?;
    loaded.split.set_mode(SplitModeKind::Custom);
    match amounts {
        Some(raw) => {
            let amounts: Vec<f64> = parse_list(raw)?;
            if amounts.len() != loaded.split.comensales() {
                return Err(MostradorError::Validation(format!(
                    "expected {} amounts, got {}",
                    loaded.split.comensales(),
                    amounts.len()
                )));
            }
            for (i, amount) in amounts.into_iter().enumerate() {
                loaded.split.set_amount(i, amount)?;
            }
        }
        None => loaded.split.distribute_evenly()?,
    }
    settle(loaded, args)
}

pub fn items(assignments: &[String], args: &SplitArgs) -> Result<()> {
    let mut loaded = load(args)?;
    loaded.split.set_mode(SplitModeKind::Items);
    for raw in assignments {
        let parts: Vec<i64> = raw
            .split(':')
            .map(|p| p.trim().parse::<i64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| MostradorError::Validation(format!("invalid assignment (ITEM:COMENSAL:QTY): {raw}")))?;
        let &[item, comensal, qty] = parts.as_slice() else {
            return Err(MostradorError::Validation(format!(
                "invalid assignment (ITEM:COMENSAL:QTY): {raw}"
            )));
        };
        let index = split_index(usize::try_from(comensal).unwrap_or(0))?;
        let granted = loaded.split.assign(item, index, qty)?;
        if granted < qty {
            println!(
                "{}",
                format!("Item #{item}: only {granted} unit(s) left for comensal {comensal}").yellow()
            );
        }
    }
    settle(loaded, args)
}

fn print_splits(splits: &[BillSplit], selector: &SplitPaymentSelector) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Comensal", "Items", "Total", "Paid"]);
    for s in splits {
        let items: Vec<String> = s
            .items
            .iter()
            .map(|i| format!("{} x {}", i.quantity, i.product_name))
            .collect();
        let paid = if selector.is_paid(s.id) {
            "yes".green().to_string()
        } else if s.total > 0.0 {
            "no".to_string()
        } else {
            "-".to_string()
        };
        table.add_row(vec![
            Cell::new(s.id + 1),
            Cell::new(&s.name),
            Cell::new(items.join(", ")),
            Cell::new(money(s.total)),
            Cell::new(paid),
        ]);
    }
    println!("{table}");
}

fn settle(loaded: Loaded, args: &SplitArgs) -> Result<()> {
    let Loaded {
        mut conn,
        ctx,
        session,
        sale,
        split,
    } = loaded;
    let splits = split.confirm()?;

    let already: HashSet<String> = orders::paid_split_names(&conn, sale.id)?.into_iter().collect();
    let paid = splits
        .iter()
        .filter(|s| already.contains(&s.name))
        .map(|s| s.id)
        .collect();
    let mut selector = SplitPaymentSelector::new(splits.clone(), paid);

    if let Some(raw) = &args.pay {
        let mut paying: Vec<BillSplit> = Vec::new();
        for n in parse_list::<usize>(raw)? {
            let id = split_index(n)?;
            if selector.is_paid(id) {
                return Err(MostradorError::InvalidState(format!("comensal {n} already paid")));
            }
            paying.push(selector.mark_paid(id)?.clone());
        }
        let refs: Vec<&BillSplit> = paying.iter().collect();
        let amount = orders::record_split_payments(&mut conn, &ctx, sale.id, &refs, &args.method)?;
        println!("Collected {} by {}", money(amount), args.method);
    }

    println!("Sale #{}  total {}", sale.id, money(sale.total));
    print_splits(&splits, &selector);
    let outstanding = selector.outstanding();
    println!("Paid: {} of {}", selector.paid_count(), selector.payable().count());
    if outstanding > 0.0 {
        println!("Pending: {} from {} comensal(es)", money(outstanding), selector.pending().len());
    }

    if args.finish {
        if !selector.can_finish() {
            return Err(MostradorError::InvalidState(
                "no comensal has paid yet; collect at least one payment before closing".into(),
            ));
        }
        if !selector.all_paid() {
            warn!(session_id = session.id, outstanding, "Finishing table with unpaid splits");
        }
        tables::close_session(&mut conn, &ctx, session.id)?;
        println!("Closed session #{} and freed the table", session.id);
    }
    Ok(())
}
