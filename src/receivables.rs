//! Accounts receivable: customers, invoices, payments and the paginated
//! listing/statistics queries the collection screens are built on.
//!
//! Status is derived at query time against an explicit `today` so the same
//! row reads `current` one day and `overdue` the next without a batch job.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::context::TenantContext;
use crate::error::{MostradorError, Result};
use crate::models::{Customer, Payment, Receivable, ReceivableStatus};

pub const DATE_FMT: &str = "%Y-%m-%d";

pub struct NewReceivable<'a> {
    pub customer_id: i64,
    pub invoice_number: Option<&'a str>,
    pub amount: f64,
    pub issue_date: &'a str,
    pub due_date: &'a str,
    pub notes: Option<&'a str>,
}

pub struct NewPayment<'a> {
    pub receivable_id: i64,
    pub amount: f64,
    pub payment_date: &'a str,
    pub payment_method: &'a str,
    pub reference: Option<&'a str>,
}

#[derive(Debug, Default, Clone)]
pub struct ReceivableFilter {
    pub status: Option<ReceivableStatus>,
    pub customer_id: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.page_size <= 0 {
            return 0;
        }
        (self.total + self.page_size - 1) / self.page_size
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ReceivableStats {
    pub total_outstanding: f64,
    pub overdue_amount: f64,
    pub current: i64,
    pub overdue: i64,
    pub partial: i64,
    pub paid: i64,
}

#[derive(Debug)]
pub struct ReceivableDetail {
    pub receivable: Receivable,
    pub days_overdue: i64,
    pub payments: Vec<Payment>,
}

// ?1 is always `today` (YYYY-MM-DD), ?2 the organization.
const SELECT_RECEIVABLES: &str = "
    SELECT ar.id, ar.customer_id, c.name, ar.invoice_number, ar.amount, ar.balance,
           ar.issue_date, ar.due_date,
           CASE
               WHEN ar.balance <= 0 THEN 'paid'
               WHEN ar.due_date < ?1 THEN 'overdue'
               WHEN ar.balance < ar.amount THEN 'partial'
               ELSE 'current'
           END AS status
    FROM accounts_receivable ar JOIN customers c ON c.id = ar.customer_id
    WHERE ar.organization_id = ?2";

fn receivable_from_row(row: &Row) -> rusqlite::Result<Receivable> {
    Ok(Receivable {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        customer_name: row.get(2)?,
        invoice_number: row.get(3)?,
        amount: row.get(4)?,
        balance: row.get(5)?,
        issue_date: row.get(6)?,
        due_date: row.get(7)?,
        status: row.get(8)?,
    })
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FMT)
        .map_err(|_| MostradorError::Validation(format!("invalid date (expected YYYY-MM-DD): {raw}")))
}

/// Whole days elapsed since `due_date`; negative when not yet due.
pub fn days_since_due(due_date: &str, today: NaiveDate) -> Result<i64> {
    Ok((today - parse_date(due_date)?).num_days())
}

pub fn derive_status(amount: f64, balance: f64, due_date: &str, today: NaiveDate) -> Result<ReceivableStatus> {
    if balance <= 0.0 {
        return Ok(ReceivableStatus::Paid);
    }
    if days_since_due(due_date, today)? > 0 {
        return Ok(ReceivableStatus::Overdue);
    }
    if balance < amount {
        return Ok(ReceivableStatus::Partial);
    }
    Ok(ReceivableStatus::Current)
}

pub fn create_customer(
    conn: &Connection,
    ctx: &TenantContext,
    name: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<Customer> {
    let org = ctx.require_organization()?;
    let name = name.trim();
    if name.is_empty() {
        return Err(MostradorError::Validation("customer name is required".into()));
    }
    conn.execute(
        "INSERT INTO customers (organization_id, name, email, phone) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![org, name, email, phone],
    )?;
    Ok(Customer {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        email: email.map(str::to_string),
        phone: phone.map(str::to_string),
    })
}

pub fn list_customers(conn: &Connection, ctx: &TenantContext) -> Result<Vec<Customer>> {
    let org = ctx.require_organization()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, email, phone FROM customers WHERE organization_id = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map([org], |row| {
        Ok(Customer {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn create(conn: &Connection, ctx: &TenantContext, new: &NewReceivable) -> Result<i64> {
    let org = ctx.require_organization()?;
    if !(new.amount > 0.0) {
        return Err(MostradorError::Validation("receivable amount must be positive".into()));
    }
    let issue = parse_date(new.issue_date)?;
    let due = parse_date(new.due_date)?;
    if due < issue {
        return Err(MostradorError::Validation(format!(
            "due date {due} is before issue date {issue}"
        )));
    }
    let owner: Option<i64> = conn
        .query_row(
            "SELECT id FROM customers WHERE id = ?1 AND organization_id = ?2",
            [new.customer_id, org],
            |row| row.get(0),
        )
        .optional()?;
    if owner.is_none() {
        return Err(MostradorError::not_found("customer", new.customer_id));
    }

    conn.execute(
        "INSERT INTO accounts_receivable \
         (organization_id, customer_id, invoice_number, amount, balance, issue_date, due_date, notes) \
         VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            org,
            new.customer_id,
            new.invoice_number,
            new.amount,
            issue.format(DATE_FMT).to_string(),
            due.format(DATE_FMT).to_string(),
            new.notes
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(receivable_id = id, customer_id = new.customer_id, amount = new.amount, "Receivable created");
    Ok(id)
}

pub fn list_paginated(
    conn: &Connection,
    ctx: &TenantContext,
    filter: &ReceivableFilter,
    page: i64,
    page_size: i64,
    today: NaiveDate,
) -> Result<Page<Receivable>> {
    let org = ctx.require_organization()?;
    if page < 1 || page_size < 1 {
        return Err(MostradorError::Validation("page and page size start at 1".into()));
    }
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));
    let filtered = format!(
        "SELECT * FROM ({SELECT_RECEIVABLES}) q \
         WHERE (?3 IS NULL OR q.status = ?3) \
           AND (?4 IS NULL OR q.customer_id = ?4) \
           AND (?5 IS NULL OR q.invoice_number LIKE ?5 OR q.name LIKE ?5)"
    );
    let today = today.format(DATE_FMT).to_string();

    let total: i64 = conn.query_row(
        &format!("SELECT count(*) FROM ({filtered})"),
        rusqlite::params![today, org, filter.status, filter.customer_id, search],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!("{filtered} ORDER BY q.due_date, q.id LIMIT ?6 OFFSET ?7"))?;
    let rows = stmt
        .query_map(
            rusqlite::params![
                today,
                org,
                filter.status,
                filter.customer_id,
                search,
                page_size,
                (page - 1) * page_size
            ],
            receivable_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Page { rows, total, page, page_size })
}

pub fn with_customers(conn: &Connection, ctx: &TenantContext, today: NaiveDate) -> Result<Vec<Receivable>> {
    let org = ctx.require_organization()?;
    let mut stmt = conn.prepare(&format!("{SELECT_RECEIVABLES} ORDER BY c.name, ar.due_date"))?;
    let rows = stmt.query_map(
        rusqlite::params![today.format(DATE_FMT).to_string(), org],
        receivable_from_row,
    )?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn for_customers(
    conn: &Connection,
    ctx: &TenantContext,
    customer_ids: &[i64],
    today: NaiveDate,
) -> Result<Vec<Receivable>> {
    let org = ctx.require_organization()?;
    if customer_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (0..customer_ids.len()).map(|i| format!("?{}", i + 3)).collect();
    let sql = format!(
        "{SELECT_RECEIVABLES} AND ar.customer_id IN ({}) ORDER BY ar.customer_id, ar.due_date",
        placeholders.join(", ")
    );
    let mut params: Vec<Value> = vec![
        Value::Text(today.format(DATE_FMT).to_string()),
        Value::Integer(org),
    ];
    params.extend(customer_ids.iter().map(|id| Value::Integer(*id)));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params), receivable_from_row)?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}

pub fn stats(conn: &Connection, ctx: &TenantContext, today: NaiveDate) -> Result<ReceivableStats> {
    let rows = with_customers(conn, ctx, today)?;
    let mut stats = ReceivableStats::default();
    for r in &rows {
        match r.status {
            ReceivableStatus::Current => stats.current += 1,
            ReceivableStatus::Overdue => {
                stats.overdue += 1;
                stats.overdue_amount += r.balance;
            }
            ReceivableStatus::Partial => stats.partial += 1,
            ReceivableStatus::Paid => stats.paid += 1,
        }
        if r.balance > 0.0 {
            stats.total_outstanding += r.balance;
        }
    }
    Ok(stats)
}

/// Receivable plus its payments. `None` when the id is unknown to the tenant.
pub fn detail(conn: &Connection, ctx: &TenantContext, id: i64, today: NaiveDate) -> Result<Option<ReceivableDetail>> {
    let org = ctx.require_organization()?;
    let receivable = conn
        .query_row(
            &format!("{SELECT_RECEIVABLES} AND ar.id = ?3"),
            rusqlite::params![today.format(DATE_FMT).to_string(), org, id],
            receivable_from_row,
        )
        .optional()?;
    let Some(receivable) = receivable else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, receivable_id, amount, payment_date, payment_method, reference \
         FROM payments WHERE receivable_id = ?1 ORDER BY payment_date, id",
    )?;
    let payments = stmt
        .query_map([id], |row| {
            Ok(Payment {
                id: row.get(0)?,
                receivable_id: row.get(1)?,
                amount: row.get(2)?,
                payment_date: row.get(3)?,
                payment_method: row.get(4)?,
                reference: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let days_overdue = days_since_due(&receivable.due_date, today)?.max(0);
    Ok(Some(ReceivableDetail {
        receivable,
        days_overdue,
        payments,
    }))
}

/// Record a payment and lower the receivable balance in one transaction.
pub fn record_payment(
    conn: &mut Connection,
    ctx: &TenantContext,
    new: &NewPayment,
    today: NaiveDate,
) -> Result<Payment> {
    let org = ctx.require_organization()?;
    if !(new.amount > 0.0) {
        return Err(MostradorError::Validation("payment amount must be positive".into()));
    }
    parse_date(new.payment_date)?;

    let tx = conn.transaction()?;
    let row: Option<(f64, f64, String)> = tx
        .query_row(
            "SELECT amount, balance, due_date FROM accounts_receivable WHERE id = ?1 AND organization_id = ?2",
            [new.receivable_id, org],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let Some((amount, balance, due_date)) = row else {
        return Err(MostradorError::not_found("receivable", new.receivable_id));
    };
    if new.amount > balance + 0.005 {
        warn!(receivable_id = new.receivable_id, balance, attempted = new.amount, "Payment exceeds balance");
        return Err(MostradorError::Validation(format!(
            "payment {:.2} exceeds outstanding balance {:.2}",
            new.amount, balance
        )));
    }

    tx.execute(
        "INSERT INTO payments (organization_id, receivable_id, amount, payment_date, payment_method, reference) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![org, new.receivable_id, new.amount, new.payment_date, new.payment_method, new.reference],
    )?;
    let payment_id = tx.last_insert_rowid();
    let remaining = ((balance - new.amount) * 100.0).round() / 100.0;
    let status = derive_status(amount, remaining, &due_date, today)?;
    tx.execute(
        "UPDATE accounts_receivable SET balance = ?1, status = ?2 WHERE id = ?3",
        rusqlite::params![remaining, status, new.receivable_id],
    )?;
    tx.commit()?;

    info!(payment_id, receivable_id = new.receivable_id, amount = new.amount, remaining, "Payment recorded");
    Ok(Payment {
        id: payment_id,
        receivable_id: new.receivable_id,
        amount: new.amount,
        payment_date: new.payment_date.to_string(),
        payment_method: new.payment_method.to_string(),
        reference: new.reference.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FMT).unwrap()
    }

    fn seed(conn: &Connection, ctx: &TenantContext) -> (i64, i64) {
        let acme = create_customer(conn, ctx, "Acme, S.A.", None, None).unwrap();
        let bodega = create_customer(conn, ctx, "Bodega Norte", Some("pagos@bodega.mx"), None).unwrap();
        create(conn, ctx, &NewReceivable {
            customer_id: acme.id,
            invoice_number: Some("F-001"),
            amount: 1000.0,
            issue_date: "2025-01-01",
            due_date: "2025-01-31",
            notes: None,
        }).unwrap();
        create(conn, ctx, &NewReceivable {
            customer_id: bodega.id,
            invoice_number: Some("F-002"),
            amount: 500.0,
            issue_date: "2025-03-01",
            due_date: "2025-03-31",
            notes: None,
        }).unwrap();
        (acme.id, bodega.id)
    }

    #[test]
    fn test_derive_status() {
        let today = day("2025-03-15");
        assert_eq!(derive_status(100.0, 0.0, "2025-03-01", today).unwrap(), ReceivableStatus::Paid);
        assert_eq!(derive_status(100.0, 100.0, "2025-03-14", today).unwrap(), ReceivableStatus::Overdue);
        assert_eq!(derive_status(100.0, 40.0, "2025-03-15", today).unwrap(), ReceivableStatus::Partial);
        assert_eq!(derive_status(100.0, 100.0, "2025-04-01", today).unwrap(), ReceivableStatus::Current);
    }

    #[test]
    fn test_paginated_filters_and_counts() {
        let (_dir, conn) = test_db();
        let ctx = TenantContext::new(1);
        seed(&conn, &ctx);
        let today = day("2025-03-10");

        let all = list_paginated(&conn, &ctx, &ReceivableFilter::default(), 1, 1, today).unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.rows.len(), 1);
        assert_eq!(all.total_pages(), 2);
        assert_eq!(all.rows[0].invoice_number.as_deref(), Some("F-001"));

        let overdue = ReceivableFilter { status: Some(ReceivableStatus::Overdue), ..Default::default() };
        let page = list_paginated(&conn, &ctx, &overdue, 1, 10, today).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].customer_name, "Acme, S.A.");

        let search = ReceivableFilter { search: Some("bodega".into()), ..Default::default() };
        let page = list_paginated(&conn, &ctx, &search, 1, 10, today).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].invoice_number.as_deref(), Some("F-002"));
    }

    #[test]
    fn test_payment_lowers_balance_and_rejects_overpayment() {
        let (_dir, mut conn) = test_db();
        let ctx = TenantContext::new(1);
        seed(&conn, &ctx);
        let today = day("2025-03-10");
        let id = list_paginated(&conn, &ctx, &ReceivableFilter::default(), 1, 10, today).unwrap().rows[1].id;

        let pay = NewPayment {
            receivable_id: id,
            amount: 200.0,
            payment_date: "2025-03-10",
            payment_method: "transfer",
            reference: Some("SPEI-1"),
        };
        record_payment(&mut conn, &ctx, &pay, today).unwrap();
        let d = detail(&conn, &ctx, id, today).unwrap().unwrap();
        assert_eq!(d.receivable.balance, 300.0);
        assert_eq!(d.receivable.status, ReceivableStatus::Partial);
        assert_eq!(d.payments.len(), 1);
        assert_eq!(d.days_overdue, 0);

        let too_much = NewPayment { amount: 300.01, ..pay };
        assert!(matches!(
            record_payment(&mut conn, &ctx, &too_much, today),
            Err(MostradorError::Validation(_))
        ));
        let rest = NewPayment { amount: 300.0, ..too_much };
        record_payment(&mut conn, &ctx, &rest, today).unwrap();
        let d = detail(&conn, &ctx, id, today).unwrap().unwrap();
        assert_eq!(d.receivable.status, ReceivableStatus::Paid);
    }

    #[test]
    fn test_detail_missing_returns_none() {
        let (_dir, conn) = test_db();
        let ctx = TenantContext::new(1);
        assert!(detail(&conn, &ctx, 99, day("2025-01-01")).unwrap().is_none());
    }

    #[test]
    fn test_stats_and_for_customers() {
        let (_dir, conn) = test_db();
        let ctx = TenantContext::new(1);
        let (acme, bodega) = seed(&conn, &ctx);
        let today = day("2025-03-10");

        let s = stats(&conn, &ctx, today).unwrap();
        assert_eq!(s.total_outstanding, 1500.0);
        assert_eq!(s.overdue_amount, 1000.0);
        assert_eq!(s.overdue, 1);
        assert_eq!(s.current, 1);

        assert_eq!(for_customers(&conn, &ctx, &[bodega], today).unwrap().len(), 1);
        assert_eq!(for_customers(&conn, &ctx, &[acme, bodega], today).unwrap().len(), 2);
        assert!(for_customers(&conn, &ctx, &[], today).unwrap().is_empty());
        assert!(with_customers(&conn, &TenantContext::new(2), today).unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_foreign_customer() {
        let (_dir, conn) = test_db();
        let ctx = TenantContext::new(1);
        let c = create_customer(&conn, &ctx, "Cliente", None, None).unwrap();
        let other = TenantContext::new(2);
        let err = create(&conn, &other, &NewReceivable {
            customer_id: c.id,
            invoice_number: None,
            amount: 10.0,
            issue_date: "2025-01-01",
            due_date: "2025-01-02",
            notes: None,
        }).unwrap_err();
        assert!(matches!(err, MostradorError::NotFound { .. }));
    }
}
