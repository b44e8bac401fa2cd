use std::collections::HashMap;
use std::io::Write;

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::Receivable;
use crate::receivables::days_since_due;

/// Outstanding balance of one customer split into the four aging windows.
#[derive(Debug, Clone, PartialEq)]
pub struct AgingBucket {
    pub customer_id: i64,
    pub customer_name: String,
    pub current: f64,
    pub days_31_60: f64,
    pub days_61_90: f64,
    pub over_90: f64,
    pub total: f64,
}

impl AgingBucket {
    fn new(customer_id: i64, customer_name: &str) -> Self {
        Self {
            customer_id,
            customer_name: customer_name.to_string(),
            current: 0.0,
            days_31_60: 0.0,
            days_61_90: 0.0,
            over_90: 0.0,
            total: 0.0,
        }
    }

    fn add(&mut self, window: AgingWindow, balance: f64) {
        match window {
            AgingWindow::Current => self.current += balance,
            AgingWindow::Days31To60 => self.days_31_60 += balance,
            AgingWindow::Days61To90 => self.days_61_90 += balance,
            AgingWindow::Over90 => self.over_90 += balance,
        }
        self.total += balance;
    }

    /// Everything past the first window.
    pub fn overdue(&self) -> f64 {
        self.days_31_60 + self.days_61_90 + self.over_90
    }

    pub fn risk(&self) -> RiskTier {
        RiskTier::classify(self.overdue(), self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgingWindow {
    Current,
    Days31To60,
    Days61To90,
    Over90,
}

impl AgingWindow {
    /// Upper bounds are inclusive: 30 days is still current.
    pub fn classify(days: i64) -> Self {
        if days <= 30 {
            Self::Current
        } else if days <= 60 {
            Self::Days31To60
        } else if days <= 90 {
            Self::Days61To90
        } else {
            Self::Over90
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTier {
    High,
    Medium,
    Low,
    Minimal,
}

impl RiskTier {
    pub fn classify(overdue: f64, total: f64) -> Self {
        let ratio = if total > 0.0 { overdue / total } else { 0.0 };
        if ratio >= 0.75 {
            Self::High
        } else if ratio >= 0.50 {
            Self::Medium
        } else if ratio >= 0.25 {
            Self::Low
        } else {
            Self::Minimal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "Alto Riesgo",
            Self::Medium => "Riesgo Medio",
            Self::Low => "Riesgo Bajo",
            Self::Minimal => "Bajo Riesgo",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AgingSummary {
    pub current: f64,
    pub days_31_60: f64,
    pub days_61_90: f64,
    pub over_90: f64,
    pub total: f64,
    pub customers: usize,
}

/// Roll receivables up into one bucket per customer, largest total first.
/// Rows with no outstanding balance are skipped.
pub fn aging_by_customer(rows: &[Receivable], today: NaiveDate) -> Result<Vec<AgingBucket>> {
    let mut order: Vec<i64> = Vec::new();
    let mut buckets: HashMap<i64, AgingBucket> = HashMap::new();

    for row in rows {
        if row.balance <= 0.0 {
            continue;
        }
        let days = days_since_due(&row.due_date, today)?;
        let bucket = buckets.entry(row.customer_id).or_insert_with(|| {
            order.push(row.customer_id);
            AgingBucket::new(row.customer_id, &row.customer_name)
        });
        bucket.add(AgingWindow::classify(days), row.balance);
    }

    let mut out: Vec<AgingBucket> = order
        .into_iter()
        .filter_map(|id| buckets.remove(&id))
        .collect();
    out.sort_by(|a, b| b.total.total_cmp(&a.total));
    Ok(out)
}

pub fn summarize(buckets: &[AgingBucket]) -> AgingSummary {
    buckets.iter().fold(AgingSummary::default(), |mut acc, b| {
        acc.current += b.current;
        acc.days_31_60 += b.days_31_60;
        acc.days_61_90 += b.days_61_90;
        acc.over_90 += b.over_90;
        acc.total += b.total;
        acc.customers += 1;
        acc
    })
}

pub const CSV_HEADER: [&str; 7] = [
    "Cliente",
    "0-30 días",
    "31-60 días",
    "61-90 días",
    "+90 días",
    "Total",
    "Riesgo",
];

/// Write the aging report as CSV. Fields are quoted by the csv writer
/// whenever they contain separators or quotes.
pub fn write_csv<W: Write>(buckets: &[AgingBucket], out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(CSV_HEADER)?;
    for b in buckets {
        wtr.write_record([
            b.customer_name.clone(),
            format!("{:.2}", b.current),
            format!("{:.2}", b.days_31_60),
            format!("{:.2}", b.days_61_90),
            format!("{:.2}", b.over_90),
            format!("{:.2}", b.total),
            b.risk().label().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReceivableStatus;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    fn row(customer_id: i64, name: &str, balance: f64, days_ago: i64) -> Receivable {
        let due = today() - chrono::Duration::days(days_ago);
        Receivable {
            id: customer_id * 100 + days_ago,
            customer_id,
            customer_name: name.to_string(),
            invoice_number: None,
            amount: balance.max(1.0),
            balance,
            issue_date: "2025-01-01".to_string(),
            due_date: due.format("%Y-%m-%d").to_string(),
            status: ReceivableStatus::Current,
        }
    }

    #[test]
    fn test_boundary_thirty_days_is_current() {
        let buckets = aging_by_customer(&[row(1, "Acme", 100.0, 30)], today()).unwrap();
        assert_eq!(buckets[0].current, 100.0);
        assert_eq!(buckets[0].days_31_60, 0.0);

        let buckets = aging_by_customer(&[row(1, "Acme", 100.0, 31)], today()).unwrap();
        assert_eq!(buckets[0].current, 0.0);
        assert_eq!(buckets[0].days_31_60, 100.0);
    }

    #[test]
    fn test_window_edges() {
        assert_eq!(AgingWindow::classify(-5), AgingWindow::Current);
        assert_eq!(AgingWindow::classify(60), AgingWindow::Days31To60);
        assert_eq!(AgingWindow::classify(61), AgingWindow::Days61To90);
        assert_eq!(AgingWindow::classify(90), AgingWindow::Days61To90);
        assert_eq!(AgingWindow::classify(91), AgingWindow::Over90);
    }

    #[test]
    fn test_zero_balance_is_skipped() {
        let rows = vec![row(1, "Acme", 0.0, 45), row(2, "Bodega", -10.0, 100)];
        let buckets = aging_by_customer(&rows, today()).unwrap();
        assert!(buckets.is_empty());
        assert_eq!(summarize(&buckets).total, 0.0);
    }

    #[test]
    fn test_accumulates_per_customer_sorted_by_total() {
        let rows = vec![
            row(1, "Acme", 100.0, 10),
            row(2, "Bodega", 50.0, 70),
            row(1, "Acme", 200.0, 120),
            row(2, "Bodega", 0.0, 5),
        ];
        let buckets = aging_by_customer(&rows, today()).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].customer_name, "Acme");
        assert_eq!(buckets[0].current, 100.0);
        assert_eq!(buckets[0].over_90, 200.0);
        assert_eq!(buckets[0].total, 300.0);
        assert_eq!(buckets[1].days_61_90, 50.0);

        let summary = summarize(&buckets);
        assert_eq!(summary.total, 350.0);
        assert_eq!(summary.customers, 2);
    }

    #[test]
    fn test_risk_tiers() {
        assert_eq!(RiskTier::classify(75.0, 100.0), RiskTier::High);
        assert_eq!(RiskTier::classify(50.0, 100.0), RiskTier::Medium);
        assert_eq!(RiskTier::classify(25.0, 100.0), RiskTier::Low);
        assert_eq!(RiskTier::classify(24.9, 100.0), RiskTier::Minimal);
        assert_eq!(RiskTier::classify(0.0, 0.0), RiskTier::Minimal);
        assert_eq!(RiskTier::High.label(), "Alto Riesgo");
    }

    #[test]
    fn test_csv_escapes_names() {
        let buckets = aging_by_customer(&[row(1, "Acme, \"Sur\"", 80.0, 95)], today()).unwrap();
        let mut buf = Vec::new();
        write_csv(&buckets, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "Cliente,0-30 días,31-60 días,61-90 días,+90 días,Total,Riesgo");
        assert_eq!(
            lines.next().unwrap(),
            "\"Acme, \"\"Sur\"\"\",0.00,0.00,0.00,80.00,80.00,Alto Riesgo"
        );
    }
}
