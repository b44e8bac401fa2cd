use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::error::MostradorError;

/// Declares an enum persisted as a lowercase TEXT column.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = MostradorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(MostradorError::Validation(format!(
                        "unknown {}: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse().map_err(|e: MostradorError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(TransactionType {
    Debit => "debit",
    Credit => "credit",
});

text_enum!(TransactionStatus {
    Pending => "pending",
    Matched => "matched",
});

text_enum!(
    /// Lifecycle of a bank reconciliation. `Closed` is terminal.
    ReconciliationStatus {
        Draft => "draft",
        InProgress => "in_progress",
        Closed => "closed",
    }
);

text_enum!(MatchType {
    Payment => "payment",
    Journal => "journal",
    Manual => "manual",
    Unmatched => "unmatched",
});

text_enum!(ReceivableStatus {
    Current => "current",
    Overdue => "overdue",
    Partial => "partial",
    Paid => "paid",
});

text_enum!(TableState {
    Free => "free",
    Occupied => "occupied",
    Reserved => "reserved",
});

text_enum!(SessionStatus {
    Active => "active",
    BillRequested => "bill_requested",
    Completed => "completed",
});

text_enum!(SaleStatus {
    Open => "open",
    Paid => "paid",
    Cancelled => "cancelled",
});

text_enum!(TicketStatus {
    Pending => "pending",
    Preparing => "preparing",
    Ready => "ready",
    Delivered => "delivered",
});

text_enum!(
    /// Integration connection status. `Revoked` is terminal.
    ConnectionStatus {
        Draft => "draft",
        Connected => "connected",
        Paused => "paused",
        Error => "error",
        Revoked => "revoked",
    }
);

text_enum!(Environment {
    Sandbox => "sandbox",
    Production => "production",
});

impl TransactionType {
    /// Signed effect of an amount of this type on the account balance.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            Self::Credit => amount,
            Self::Debit => -amount,
        }
    }
}

impl SessionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::BillRequested)
    }
}

#[derive(Debug, Clone)]
pub struct BankAccount {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_type: String,
    pub currency: String,
    pub balance: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct BankTransaction {
    pub id: i64,
    pub bank_account_id: i64,
    pub transaction_date: String,
    pub description: String,
    pub reference: Option<String>,
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
}

impl BankTransaction {
    pub fn signed_amount(&self) -> f64 {
        self.transaction_type.signed(self.amount)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub id: i64,
    pub bank_account_id: i64,
    pub period_start: String,
    pub period_end: String,
    pub opening_balance: f64,
    pub statement_balance: f64,
    pub status: ReconciliationStatus,
    pub closed_at: Option<String>,
    pub notes: Option<String>,
    pub matched_amount: f64,
}

impl Reconciliation {
    pub fn difference(&self) -> f64 {
        self.statement_balance - (self.opening_balance + self.matched_amount)
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationItem {
    pub id: i64,
    pub reconciliation_id: i64,
    pub bank_transaction_id: i64,
    pub match_type: MatchType,
    pub amount: f64,
    pub matched_at: String,
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Receivable {
    pub id: i64,
    pub customer_id: i64,
    pub customer_name: String,
    pub invoice_number: Option<String>,
    pub amount: f64,
    pub balance: f64,
    pub issue_date: String,
    pub due_date: String,
    pub status: ReceivableStatus,
}

#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    pub receivable_id: i64,
    pub amount: f64,
    pub payment_date: String,
    pub payment_method: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestaurantTable {
    pub id: i64,
    pub branch_id: i64,
    pub name: String,
    pub capacity: i64,
    pub zone: Option<String>,
    pub state: TableState,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct TableSession {
    pub id: i64,
    pub restaurant_table_id: i64,
    pub sale_id: Option<i64>,
    pub customers_count: i64,
    pub status: SessionStatus,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub opened_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Sale {
    pub id: i64,
    pub branch_id: i64,
    pub table_session_id: Option<i64>,
    pub subtotal: f64,
    pub discount_total: f64,
    pub total: f64,
    pub status: SaleStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub discount: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct KitchenTicket {
    pub id: i64,
    pub sale_id: i64,
    pub station: String,
    pub status: TicketStatus,
    pub created_at: String,
    pub item_count: i64,
}

#[derive(Debug, Clone)]
pub struct PaymentMethod {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct IntegrationProvider {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct IntegrationConnector {
    pub id: i64,
    pub provider_id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntegrationConnection {
    pub id: i64,
    pub connector_id: i64,
    pub connector_name: String,
    pub provider_name: String,
    pub name: String,
    pub environment: Environment,
    pub status: ConnectionStatus,
    pub last_sync_at: Option<String>,
    pub last_error: Option<String>,
}
